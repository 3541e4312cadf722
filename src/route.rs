//! Stop-order optimization for a single car.
//!
//! Everything in here is a pure function over a start floor and a snapshot of
//! pending stops, so the elevator can try a reorder without touching its queue.

use crate::direction::{Floor, distance};

/// An ordered visiting sequence and the number of floor moves it takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePlan {
    pub order: Vec<Floor>,
    pub cost: u32,
}

/// Floor moves needed to visit `stops` in the given order starting at `start`.
pub fn route_cost(start: Floor, stops: &[Floor]) -> u32 {
    let mut position = start;
    let mut cost = 0;
    for &stop in stops {
        cost += distance(position, stop);
        position = stop;
    }
    cost
}

/// Find the cheapest order to visit every stop starting at `start`.
///
/// Exhaustive for more than two stops (`O(n!)`), which is fine for the handful
/// of stops a car holds at once. Ties always keep the earlier candidate, so
/// equal-cost orders resolve to the input order where possible.
pub fn plan_route(start: Floor, stops: &[Floor]) -> RoutePlan {
    match stops {
        [] => RoutePlan {
            order: Vec::new(),
            cost: 0,
        },
        [only] => RoutePlan {
            order: vec![*only],
            cost: distance(start, *only),
        },
        [first, second] => {
            let as_is = distance(start, *first) + distance(*first, *second);
            let flipped = distance(start, *second) + distance(*second, *first);
            if flipped < as_is {
                RoutePlan {
                    order: vec![*second, *first],
                    cost: flipped,
                }
            } else {
                RoutePlan {
                    order: vec![*first, *second],
                    cost: as_is,
                }
            }
        }
        _ => {
            let mut best: Option<RoutePlan> = None;
            for (index, &next) in stops.iter().enumerate() {
                let remaining: Vec<Floor> = stops
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, floor)| *floor)
                    .collect();

                let tail = plan_route(next, &remaining);
                let cost = tail.cost + distance(start, next);
                if best.as_ref().is_some_and(|b| b.cost <= cost) {
                    continue;
                }

                let mut order = Vec::with_capacity(stops.len());
                order.push(next);
                order.extend(tail.order);
                best = Some(RoutePlan { order, cost });
            }
            // Non-empty match arm, at least one candidate was evaluated.
            best.unwrap_or_else(|| RoutePlan {
                order: stops.to_vec(),
                cost: route_cost(start, stops),
            })
        }
    }
}

/// Drop stops that do not change the direction of travel.
///
/// A stop equal to the point before it is dropped outright; an interior stop
/// lying on a straight run between its neighbours is dropped since the car
/// passes it anyway. The last stop is always kept.
pub fn compress_stops(start: Floor, stops: &[Floor]) -> Vec<Floor> {
    let mut kept: Vec<Floor> = Vec::with_capacity(stops.len());
    for &stop in stops {
        let last = kept.last().copied().unwrap_or(start);
        if stop == last {
            continue;
        }
        if !kept.is_empty() {
            let before = if kept.len() >= 2 {
                kept[kept.len() - 2]
            } else {
                start
            };
            if before.cmp(&last) == last.cmp(&stop) {
                kept.pop();
            }
        }
        kept.push(stop);
    }
    kept
}

/// Whether a car at `start` following `stops` passes `floor` on the way.
pub fn path_covers(start: Floor, stops: &[Floor], floor: Floor) -> bool {
    if floor == start {
        return true;
    }
    let (mut low, mut high) = (start, start);
    for &stop in stops {
        low = low.min(stop);
        high = high.max(stop);
        if (low..=high).contains(&floor) {
            return true;
        }
    }
    false
}
