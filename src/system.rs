//! Fleet dispatcher.
//!
//! Owns every car, every passenger and the floor index. Hall calls are
//! resolved to the car with the fewest estimated turns; stepping moves every
//! car by at most one floor and then fires floor events in a fixed order.

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::direction::{Direction, Floor, distance};
use crate::elevator::{Elevator, ElevatorError, ElevatorId};
use crate::floor_index::FloorIndex;
use crate::passenger::{Passenger, PassengerError, PassengerId, PassengerState};
use crate::traits::{ElevatorPanel, FloorPanel};

#[derive(Debug, Clone)]
pub struct SystemOptions {
    /// Fleet size from which per-car movement is computed on the rayon pool.
    pub parallel_move_threshold: usize,
    /// Check the floor index against true positions after every step.
    pub verify_index: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self {
            parallel_move_threshold: 32,
            verify_index: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no elevators registered")]
    NoElevators,

    #[error("floor {floor} is outside the building range {min_floor}..={max_floor}")]
    FloorOutOfRange {
        floor: Floor,
        min_floor: Floor,
        max_floor: Floor,
    },

    #[error("cannot travel {direction:?} from floor {floor}")]
    InfeasibleDirection { floor: Floor, direction: Direction },

    #[error("no elevator can pick up at floor {floor} going {direction:?}")]
    NoCandidate { floor: Floor, direction: Direction },

    #[error("unknown elevator {0}")]
    UnknownElevator(ElevatorId),

    #[error("unknown passenger {0}")]
    UnknownPassenger(PassengerId),

    #[error("floor index disagrees with true positions on floor {floor}")]
    InconsistentIndex { floor: Floor },

    #[error(transparent)]
    Elevator(#[from] ElevatorError),

    #[error(transparent)]
    Passenger(#[from] PassengerError),
}

#[derive(Debug, Default)]
pub struct ElevatorSystem {
    options: SystemOptions,
    elevators: BTreeMap<ElevatorId, Elevator>,
    passengers: BTreeMap<PassengerId, Passenger>,
    floors: FloorIndex,
}

impl ElevatorSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: SystemOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn register_elevator(&mut self, elevator: Elevator) -> ElevatorId {
        let id = elevator.id();
        debug!(elevator = %id, floor = elevator.current_floor(), "registered elevator");
        self.floors.place_elevator(id, elevator.current_floor());
        self.elevators.insert(id, elevator);
        id
    }

    pub fn register_passenger(&mut self, passenger: Passenger) -> PassengerId {
        let id = passenger.id();
        if passenger.state() != PassengerState::Arrived && passenger.current_elevator().is_none() {
            self.floors.add_waiting(id, passenger.current_floor());
        }
        self.passengers.insert(id, passenger);
        id
    }

    pub fn elevator(&self, id: ElevatorId) -> Option<&Elevator> {
        self.elevators.get(&id)
    }

    pub fn elevators(&self) -> impl Iterator<Item = &Elevator> {
        self.elevators.values()
    }

    pub fn passenger(&self, id: PassengerId) -> Option<&Passenger> {
        self.passengers.get(&id)
    }

    pub fn passengers(&self) -> impl Iterator<Item = &Passenger> {
        self.passengers.values()
    }

    pub fn floor_index(&self) -> &FloorIndex {
        &self.floors
    }

    /// Passengers still waiting in a corridor or riding a car.
    pub fn active_passenger_count(&self) -> usize {
        let riding: usize = self.elevators.values().map(|elevator| elevator.passengers().len()).sum();
        self.floors.waiting_count() + riding
    }

    pub fn has_active_passengers(&self) -> bool {
        self.active_passenger_count() > 0
    }

    /// Notify every passenger that requests are now accepted.
    pub fn ready(&mut self) -> Result<(), DispatchError> {
        info!(
            elevators = self.elevators.len(),
            passengers = self.passengers.len(),
            "elevator system ready"
        );
        let ids: Vec<PassengerId> = self.passengers.keys().copied().collect();
        for id in ids {
            self.notify_ready(id)?;
        }
        Ok(())
    }

    /// Assign the hall call at `at_floor` to the best car; see [`FloorPanel`].
    pub fn request_elevator(
        &mut self,
        at_floor: Floor,
        direction: Direction,
        requester: PassengerId,
    ) -> Result<ElevatorId, DispatchError> {
        dispatch(&mut self.elevators, at_floor, direction, requester)
    }

    /// Advance every car by at most one floor, then fire floor events.
    pub fn move_one_floor(&mut self) -> Result<(), DispatchError> {
        let step = |(id, elevator): (&ElevatorId, &mut Elevator)| {
            let from = elevator.current_floor();
            (*id, from, elevator.move_one_floor())
        };
        let moves: Vec<(ElevatorId, Floor, Result<Floor, ElevatorError>)> =
            if self.elevators.len() >= self.options.parallel_move_threshold {
                self.elevators.par_iter_mut().map(step).collect()
            } else {
                self.elevators.iter_mut().map(step).collect()
            };

        // Every car that did move is re-indexed before the first failure surfaces.
        let mut failure = None;
        for (id, from, moved) in moves {
            match moved {
                Ok(to) => self.floors.move_elevator(id, from, to),
                Err(err) => {
                    failure.get_or_insert(err);
                }
            }
        }
        if let Some(err) = failure {
            return Err(err.into());
        }
        if self.options.verify_index {
            self.verify_index()?;
        }

        self.fire_floor_events()
    }

    /// Compare the floor index with a fresh rebuild from true positions.
    pub fn verify_index(&self) -> Result<(), DispatchError> {
        let rebuilt = FloorIndex::rebuild(
            self.elevators.values().map(|elevator| (elevator.id(), elevator.current_floor())),
            self.passengers
                .values()
                .filter(|passenger| {
                    matches!(
                        passenger.state(),
                        PassengerState::Idle | PassengerState::WaitingForElevator
                    )
                })
                .map(|passenger| (passenger.id(), passenger.current_floor())),
        );
        match self.floors.first_mismatch(&rebuilt) {
            Some(floor) => Err(DispatchError::InconsistentIndex { floor }),
            None => Ok(()),
        }
    }

    /// Riders first, then boarding, then fresh hall calls, floor by floor.
    fn fire_floor_events(&mut self) -> Result<(), DispatchError> {
        let floors: Vec<Floor> = self.floors.floors().collect();
        for floor in floors {
            for elevator in self.floors.elevators_at(floor) {
                let riders: Vec<PassengerId> = self
                    .elevators
                    .get(&elevator)
                    .ok_or(DispatchError::UnknownElevator(elevator))?
                    .passengers()
                    .iter()
                    .copied()
                    .collect();
                for passenger in riders {
                    self.notify_arrival(passenger, elevator)?;
                }
            }

            let cars = self.floors.elevators_at(floor);
            for passenger in self.floors.waiting_at(floor) {
                for elevator in &cars {
                    self.notify_arrival(passenger, *elevator)?;
                }
            }

            for passenger in self.floors.waiting_at(floor) {
                self.notify_ready(passenger)?;
            }
        }
        Ok(())
    }

    fn notify_ready(&mut self, id: PassengerId) -> Result<(), DispatchError> {
        let Self {
            elevators,
            passengers,
            floors,
            ..
        } = self;
        let passenger = passengers.get_mut(&id).ok_or(DispatchError::UnknownPassenger(id))?;

        passenger.on_system_ready(&mut Corridor { elevators })?;
        if passenger.state() == PassengerState::Arrived {
            floors.remove_waiting(id, passenger.current_floor());
        }
        Ok(())
    }

    fn notify_arrival(&mut self, id: PassengerId, elevator: ElevatorId) -> Result<(), DispatchError> {
        let Self {
            elevators,
            passengers,
            floors,
            ..
        } = self;
        let passenger = passengers.get_mut(&id).ok_or(DispatchError::UnknownPassenger(id))?;
        let mut panel = CarPanel::new(elevators, floors, elevator)?;
        passenger.on_elevator_arrived(&mut panel)
    }
}

impl FloorPanel for ElevatorSystem {
    fn request_elevator(
        &mut self,
        at_floor: Floor,
        direction: Direction,
        requester: PassengerId,
    ) -> Result<ElevatorId, DispatchError> {
        dispatch(&mut self.elevators, at_floor, direction, requester)
    }

    fn will_visit(&self, elevator: ElevatorId, floor: Floor) -> bool {
        will_visit(&self.elevators, elevator, floor)
    }
}

/// Ranking of a candidate car: any car that can reach the target floor beats
/// every car that cannot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Reachable { turns: u32 },
    Unreachable { boundary_gap: u32 },
}

fn dispatch(
    elevators: &mut BTreeMap<ElevatorId, Elevator>,
    at_floor: Floor,
    direction: Direction,
    requester: PassengerId,
) -> Result<ElevatorId, DispatchError> {
    let min_floor = elevators.values().map(Elevator::min_floor).min();
    let max_floor = elevators.values().map(Elevator::max_floor).max();
    let (Some(min_floor), Some(max_floor)) = (min_floor, max_floor) else {
        return Err(DispatchError::NoElevators);
    };
    if !(min_floor..=max_floor).contains(&at_floor) {
        return Err(DispatchError::FloorOutOfRange {
            floor: at_floor,
            min_floor,
            max_floor,
        });
    }

    let farthest = match direction {
        Direction::Up => max_floor,
        Direction::Down => min_floor,
    };
    let infeasible = DispatchError::InfeasibleDirection {
        floor: at_floor,
        direction,
    };
    if farthest == at_floor {
        return Err(infeasible);
    }
    let next_floor = direction.next_floor(at_floor).ok_or(infeasible)?;

    // Halfway to the far end, rounding towards it; only used to estimate cost.
    let half = distance(at_floor, farthest).div_ceil(2);
    let target = match direction {
        Direction::Up => at_floor + half,
        Direction::Down => at_floor - half,
    };

    let mut best: Option<(Rank, ElevatorId)> = None;
    for elevator in elevators.values() {
        if !elevator.can_serve(at_floor) || !elevator.can_serve(next_floor) {
            continue;
        }
        let rank = match elevator.turns_to_visit(&[at_floor, target])? {
            Some(turns) => Rank::Reachable { turns },
            None => Rank::Unreachable {
                boundary_gap: boundary_gap(elevator, target),
            },
        };
        if best.is_none_or(|(best_rank, _)| rank < best_rank) {
            best = Some((rank, elevator.id()));
        }
    }

    let Some((rank, id)) = best else {
        return Err(DispatchError::NoCandidate {
            floor: at_floor,
            direction,
        });
    };
    // A re-issued call moves the requester's hint to the new car.
    for (other, elevator) in elevators.iter_mut() {
        if *other != id {
            elevator.forget_potential_target(requester);
        }
    }
    let winner = elevators.get_mut(&id).ok_or(DispatchError::UnknownElevator(id))?;
    if winner.accepts_requests() {
        winner.request_destination_floor(at_floor, None)?;
    }
    winner.add_potential_target(requester, target);

    debug!(
        elevator = %id,
        passenger = %requester,
        floor = at_floor,
        ?direction,
        target,
        ?rank,
        "assigned hall call"
    );
    Ok(id)
}

fn boundary_gap(elevator: &Elevator, floor: Floor) -> u32 {
    if floor > elevator.max_floor() {
        floor - elevator.max_floor()
    } else if floor < elevator.min_floor() {
        elevator.min_floor() - floor
    } else {
        0
    }
}

fn will_visit(elevators: &BTreeMap<ElevatorId, Elevator>, elevator: ElevatorId, floor: Floor) -> bool {
    elevators
        .get(&elevator)
        .is_some_and(|elevator| elevator.will_visit_floor(floor))
}

/// Corridor buttons handed to a passenger during the ready event.
struct Corridor<'a> {
    elevators: &'a mut BTreeMap<ElevatorId, Elevator>,
}

impl FloorPanel for Corridor<'_> {
    fn request_elevator(
        &mut self,
        at_floor: Floor,
        direction: Direction,
        requester: PassengerId,
    ) -> Result<ElevatorId, DispatchError> {
        dispatch(self.elevators, at_floor, direction, requester)
    }

    fn will_visit(&self, elevator: ElevatorId, floor: Floor) -> bool {
        will_visit(self.elevators, elevator, floor)
    }
}

/// Panel of one car standing at a floor. Boarding and alighting keep the
/// floor index in step with the car's rider set.
struct CarPanel<'a> {
    elevators: &'a mut BTreeMap<ElevatorId, Elevator>,
    floors: &'a mut FloorIndex,
    id: ElevatorId,
    current_floor: Floor,
    min_floor: Floor,
    max_floor: Floor,
    accepts_requests: bool,
}

impl<'a> CarPanel<'a> {
    fn new(
        elevators: &'a mut BTreeMap<ElevatorId, Elevator>,
        floors: &'a mut FloorIndex,
        id: ElevatorId,
    ) -> Result<Self, DispatchError> {
        let car = elevators.get(&id).ok_or(DispatchError::UnknownElevator(id))?;
        let (current_floor, min_floor, max_floor, accepts_requests) =
            (car.current_floor(), car.min_floor(), car.max_floor(), car.accepts_requests());
        Ok(Self {
            elevators,
            floors,
            id,
            current_floor,
            min_floor,
            max_floor,
            accepts_requests,
        })
    }
}

impl FloorPanel for CarPanel<'_> {
    fn request_elevator(
        &mut self,
        at_floor: Floor,
        direction: Direction,
        requester: PassengerId,
    ) -> Result<ElevatorId, DispatchError> {
        dispatch(self.elevators, at_floor, direction, requester)
    }

    fn will_visit(&self, elevator: ElevatorId, floor: Floor) -> bool {
        will_visit(self.elevators, elevator, floor)
    }
}

impl ElevatorPanel for CarPanel<'_> {
    fn id(&self) -> ElevatorId {
        self.id
    }

    fn current_floor(&self) -> Floor {
        self.current_floor
    }

    fn min_floor(&self) -> Floor {
        self.min_floor
    }

    fn max_floor(&self) -> Floor {
        self.max_floor
    }

    fn accepts_requests(&self) -> bool {
        self.accepts_requests
    }

    fn request_destination_floor(&mut self, floor: Floor, requester: PassengerId) -> Result<(), DispatchError> {
        self.elevators
            .get_mut(&self.id)
            .ok_or(DispatchError::UnknownElevator(self.id))?
            .request_destination_floor(floor, Some(requester))?;
        Ok(())
    }

    fn board_passenger(&mut self, passenger: PassengerId) {
        self.floors.remove_waiting(passenger, self.current_floor);
        if let Some(car) = self.elevators.get_mut(&self.id) {
            car.board(passenger);
        }
    }

    fn remove_passenger(&mut self, passenger: PassengerId, arrived: bool) {
        if let Some(car) = self.elevators.get_mut(&self.id) {
            car.alight(passenger);
        }
        if !arrived {
            self.floors.add_waiting(passenger, self.current_floor);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_move_keeps_the_index_in_step() {
        let mut system = ElevatorSystem::new();
        let mover = system.register_elevator(Elevator::new(1, 10, 1).unwrap());
        let stuck = system.register_elevator(Elevator::new(1, 10, 4).unwrap());
        system
            .elevators
            .get_mut(&mover)
            .unwrap()
            .request_destination_floor(5, None)
            .unwrap();
        system.elevators.get_mut(&stuck).unwrap().push_target_unchecked(4);

        let err = system.move_one_floor().unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Elevator(ElevatorError::AlreadyAtTarget { floor: 4, .. })
        ));

        assert_eq!(system.elevator(mover).unwrap().current_floor(), 2);
        assert_eq!(system.floor_index().elevators_at(2), vec![mover]);
        assert!(system.floor_index().elevators_at(1).is_empty());
        assert_eq!(system.verify_index(), Ok(()));
    }

    #[test]
    fn failed_move_is_reported_on_the_parallel_path_too() {
        let mut system = ElevatorSystem::with_options(SystemOptions {
            parallel_move_threshold: 1,
            verify_index: true,
        });
        let mover = system.register_elevator(Elevator::new(1, 10, 9).unwrap());
        let stuck = system.register_elevator(Elevator::new(1, 10, 3).unwrap());
        system
            .elevators
            .get_mut(&mover)
            .unwrap()
            .request_destination_floor(6, None)
            .unwrap();
        system.elevators.get_mut(&stuck).unwrap().push_target_unchecked(3);

        assert!(system.move_one_floor().is_err());
        assert_eq!(system.floor_index().elevators_at(8), vec![mover]);
        assert_eq!(system.verify_index(), Ok(()));
    }
}
