//! A single elevator car: its serviceable range, stop queue and riders.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use crate::direction::{Direction, Floor, distance};
use crate::passenger::PassengerId;
use crate::route::{compress_stops, path_covers, plan_route};

static NEXT_ELEVATOR_ID: AtomicU32 = AtomicU32::new(0);

/// Unique identifier of a car, assigned once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElevatorId(pub u32);

impl ElevatorId {
    fn next() -> Self {
        Self(NEXT_ELEVATOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ElevatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// Capability of a car.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevatorKind {
    /// Takes destination requests and optimizes its stop order.
    #[default]
    Common,
    /// Endlessly shuttles between its two end floors, never takes requests.
    Paternoster,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElevatorError {
    #[error("invalid floor range {min_floor}..={max_floor}: floors start at 1 and a car serves at least two")]
    InvalidRange { min_floor: Floor, max_floor: Floor },

    #[error("start floor {floor} outside of range {min_floor}..={max_floor}")]
    StartOutOfRange {
        floor: Floor,
        min_floor: Floor,
        max_floor: Floor,
    },

    #[error("elevator {elevator} cannot serve floor {floor} (range {min_floor}..={max_floor})")]
    FloorOutOfRange {
        elevator: ElevatorId,
        floor: Floor,
        min_floor: Floor,
        max_floor: Floor,
    },

    #[error("elevator {elevator} does not accept destination requests")]
    RequestsNotAccepted { elevator: ElevatorId },

    #[error("elevator {elevator} is already at its next target {floor}")]
    AlreadyAtTarget { elevator: ElevatorId, floor: Floor },

    #[error("turns to visit requested for an empty floor list")]
    EmptyFloorList,
}

#[derive(Debug, Clone)]
pub struct Elevator {
    id: ElevatorId,
    kind: ElevatorKind,
    min_floor: Floor,
    max_floor: Floor,
    current_floor: Floor,
    targets: VecDeque<Floor>,
    /// Speculative stops keyed by the passenger whose hall call suggested them.
    potential_targets: BTreeMap<PassengerId, Floor>,
    passengers: BTreeSet<PassengerId>,
}

impl Elevator {
    /// Creates an ordinary car serving `min_floor..=max_floor`, parked at `current_floor`.
    pub fn new(min_floor: Floor, max_floor: Floor, current_floor: Floor) -> Result<Self, ElevatorError> {
        Self::build(ElevatorKind::Common, min_floor, max_floor, current_floor)
    }

    /// Creates a paternoster car cycling between its end floors.
    ///
    /// The starting direction is overridden when the car sits at an end of its
    /// path and cannot move that way.
    pub fn paternoster(
        min_floor: Floor,
        max_floor: Floor,
        current_floor: Floor,
        direction: Direction,
    ) -> Result<Self, ElevatorError> {
        let mut elevator = Self::build(ElevatorKind::Paternoster, min_floor, max_floor, current_floor)?;
        let heads_up = current_floor == min_floor || (current_floor != max_floor && direction == Direction::Up);
        elevator.targets = if heads_up {
            VecDeque::from([max_floor, min_floor])
        } else {
            VecDeque::from([min_floor, max_floor])
        };
        Ok(elevator)
    }

    fn build(
        kind: ElevatorKind,
        min_floor: Floor,
        max_floor: Floor,
        current_floor: Floor,
    ) -> Result<Self, ElevatorError> {
        if min_floor < 1 || max_floor <= min_floor {
            return Err(ElevatorError::InvalidRange { min_floor, max_floor });
        }
        if !(min_floor..=max_floor).contains(&current_floor) {
            return Err(ElevatorError::StartOutOfRange {
                floor: current_floor,
                min_floor,
                max_floor,
            });
        }

        Ok(Self {
            id: ElevatorId::next(),
            kind,
            min_floor,
            max_floor,
            current_floor,
            targets: VecDeque::new(),
            potential_targets: BTreeMap::new(),
            passengers: BTreeSet::new(),
        })
    }

    pub fn id(&self) -> ElevatorId {
        self.id
    }

    pub fn kind(&self) -> ElevatorKind {
        self.kind
    }

    pub fn min_floor(&self) -> Floor {
        self.min_floor
    }

    pub fn max_floor(&self) -> Floor {
        self.max_floor
    }

    pub fn current_floor(&self) -> Floor {
        self.current_floor
    }

    /// Pending stops in visiting order.
    pub fn targets(&self) -> impl Iterator<Item = Floor> + '_ {
        self.targets.iter().copied()
    }

    pub fn potential_targets(&self) -> impl Iterator<Item = (PassengerId, Floor)> + '_ {
        self.potential_targets.iter().map(|(passenger, floor)| (*passenger, *floor))
    }

    pub fn passengers(&self) -> &BTreeSet<PassengerId> {
        &self.passengers
    }

    pub fn accepts_requests(&self) -> bool {
        self.kind == ElevatorKind::Common
    }

    pub fn can_serve(&self, floor: Floor) -> bool {
        (self.min_floor..=self.max_floor).contains(&floor)
    }

    pub fn is_idle(&self) -> bool {
        self.targets.is_empty()
    }

    /// Whether the car stands on `floor` now or passes it before its queue runs dry.
    pub fn will_visit_floor(&self, floor: Floor) -> bool {
        if !self.can_serve(floor) {
            return false;
        }
        match self.kind {
            ElevatorKind::Paternoster => true,
            ElevatorKind::Common => {
                let stops: Vec<Floor> = self.targets.iter().copied().collect();
                path_covers(self.current_floor, &stops, floor)
            }
        }
    }

    /// Ask the car to eventually stop at `floor`.
    ///
    /// A request from a passenger replaces that passenger's speculative stop.
    /// Floors already on the path are not queued again.
    pub fn request_destination_floor(
        &mut self,
        floor: Floor,
        requester: Option<PassengerId>,
    ) -> Result<(), ElevatorError> {
        if !self.accepts_requests() {
            return Err(ElevatorError::RequestsNotAccepted { elevator: self.id });
        }
        self.range_check(floor)?;

        if let Some(passenger) = requester {
            self.potential_targets.remove(&passenger);
        }

        if !self.will_visit_floor(floor) {
            self.add_target_floor(floor);
        }
        Ok(())
    }

    fn add_target_floor(&mut self, floor: Floor) {
        let mut naive: Vec<Floor> = self.targets.iter().copied().collect();
        naive.push(floor);

        let plan = plan_route(self.current_floor, &naive);
        let optimal = compress_stops(self.current_floor, &plan.order);

        if optimal != naive {
            debug!(
                elevator = %self.id,
                current_floor = self.current_floor,
                floor,
                ?naive,
                ?optimal,
                turns = plan.cost,
                "rearranged targets"
            );
            self.targets = optimal.into();
        } else {
            debug!(
                elevator = %self.id,
                current_floor = self.current_floor,
                floor,
                targets = ?self.targets,
                turns = plan.cost,
                "queued target"
            );
            self.targets.push_back(floor);
        }
    }

    /// Remember a speculative stop for `requester`, clamped into range.
    ///
    /// Paternoster cars ignore hints, their path is fixed.
    pub fn add_potential_target(&mut self, requester: PassengerId, floor: Floor) {
        if !self.accepts_requests() {
            return;
        }
        let floor = floor.clamp(self.min_floor, self.max_floor);
        self.potential_targets.insert(requester, floor);
    }

    /// Drop the speculative stop of `requester`, if this car holds one.
    pub fn forget_potential_target(&mut self, requester: PassengerId) -> bool {
        self.potential_targets.remove(&requester).is_some()
    }

    /// Estimated floor moves until every floor in `floors` has been visited in order.
    ///
    /// Floors lying between two consecutive waypoints (queued stops followed by
    /// speculative ones) ride along for free; the rest are appended after the
    /// last waypoint. `None` if any floor is out of range.
    pub fn turns_to_visit(&self, floors: &[Floor]) -> Result<Option<u32>, ElevatorError> {
        if floors.is_empty() {
            return Err(ElevatorError::EmptyFloorList);
        }
        if floors.iter().any(|floor| !self.can_serve(*floor)) {
            return Ok(None);
        }

        let mut pending = floors.iter().copied().peekable();
        let mut position = self.current_floor;
        let mut turns = 0;

        let waypoints = self.targets.iter().chain(self.potential_targets.values()).copied();
        for waypoint in waypoints {
            while let Some(&floor) = pending.peek() {
                if floor < position.min(waypoint) || floor > position.max(waypoint) {
                    break;
                }
                turns += distance(position, floor);
                position = floor;
                pending.next();
            }
            if pending.peek().is_none() {
                return Ok(Some(turns));
            }
            turns += distance(position, waypoint);
            position = waypoint;
        }

        for floor in pending {
            turns += distance(position, floor);
            position = floor;
        }
        Ok(Some(turns))
    }

    /// Advance at most one floor towards the head of the queue.
    ///
    /// Returns the floor the car ends up on.
    pub fn move_one_floor(&mut self) -> Result<Floor, ElevatorError> {
        let Some(&next) = self.targets.front() else {
            return Ok(self.current_floor);
        };

        let direction = Direction::between(self.current_floor, next).ok_or(ElevatorError::AlreadyAtTarget {
            elevator: self.id,
            floor: next,
        })?;

        let from = self.current_floor;
        self.current_floor = match direction {
            Direction::Up => from + 1,
            Direction::Down => from - 1,
        };
        trace!(elevator = %self.id, ?direction, from, to = self.current_floor, target = next, "moved");

        if self.current_floor == next {
            self.on_arrival();
        }
        Ok(self.current_floor)
    }

    fn on_arrival(&mut self) {
        match self.kind {
            ElevatorKind::Common => {
                self.targets.pop_front();
            }
            ElevatorKind::Paternoster => self.targets.rotate_left(1),
        }

        if self.targets.is_empty() {
            debug!(elevator = %self.id, floor = self.current_floor, "idle");
            self.potential_targets.clear();
        }
    }

    /// Queue `floor` as-is, skipping the planner.
    #[cfg(test)]
    pub(crate) fn push_target_unchecked(&mut self, floor: Floor) {
        self.targets.push_back(floor);
    }

    pub(crate) fn board(&mut self, passenger: PassengerId) -> bool {
        self.passengers.insert(passenger)
    }

    pub(crate) fn alight(&mut self, passenger: PassengerId) -> bool {
        self.passengers.remove(&passenger)
    }

    fn range_check(&self, floor: Floor) -> Result<(), ElevatorError> {
        if self.can_serve(floor) {
            Ok(())
        } else {
            Err(ElevatorError::FloorOutOfRange {
                elevator: self.id,
                floor,
                min_floor: self.min_floor,
                max_floor: self.max_floor,
            })
        }
    }
}
