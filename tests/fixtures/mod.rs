//! Test fixtures for elevator-planner.
//!
//! Provides fleet builders and the between-step sanity checks shared by the
//! integration tests.

#![allow(dead_code)]

use std::collections::HashMap;

use elevator_planner::direction::Floor;
use elevator_planner::elevator::{Elevator, ElevatorId};
use elevator_planner::passenger::{PassengerId, PassengerState};
use elevator_planner::simulation::SimulationSnapshot;
use elevator_planner::system::ElevatorSystem;

/// Register one common car per `(min_floor, max_floor, start_floor)`.
pub fn fleet(cars: &[(Floor, Floor, Floor)]) -> (ElevatorSystem, Vec<ElevatorId>) {
    let mut system = ElevatorSystem::new();
    let ids = cars
        .iter()
        .map(|&(min_floor, max_floor, start_floor)| {
            let elevator = Elevator::new(min_floor, max_floor, start_floor).expect("valid test elevator");
            system.register_elevator(elevator)
        })
        .collect();
    (system, ids)
}

/// Tracks which car each passenger boarded, across steps.
#[derive(Debug, Default)]
pub struct SanityChecker {
    boarded_with: HashMap<PassengerId, ElevatorId>,
}

impl SanityChecker {
    /// Assert every invariant that must hold between two consecutive snapshots.
    pub fn check(&mut self, previous: &SimulationSnapshot, current: &SimulationSnapshot) {
        for (id, elevator) in &current.elevators {
            let before = &previous.elevators[id];
            assert!(
                before.current_floor.abs_diff(elevator.current_floor) <= 1,
                "{id} moved from {} to {}",
                before.current_floor,
                elevator.current_floor
            );
            assert!(
                (elevator.min_floor..=elevator.max_floor).contains(&elevator.current_floor),
                "{id} left its range at {}",
                elevator.current_floor
            );
        }

        for (id, passenger) in &current.passengers {
            let before = &previous.passengers[id];

            assert!(
                !(before.state != PassengerState::Idle && passenger.state == PassengerState::Idle),
                "{id} went back to idle"
            );
            assert!(
                !(before.state == PassengerState::Arrived && passenger.state != PassengerState::Arrived),
                "{id} left the arrived state"
            );

            let traveling = passenger.state == PassengerState::TravelingWithElevator;
            assert_eq!(traveling, passenger.current_elevator.is_some(), "{id} elevator id outside travel");

            // A rider may leave one car and board the next within the same step.
            let car_before = before.current_elevator;
            let car_now = passenger.current_elevator;
            if car_before == car_now {
                continue;
            }
            if let Some(car) = car_before {
                assert_eq!(self.boarded_with.get(id), Some(&car), "{id} left a car it did not board");
                assert_eq!(
                    current.elevators[&car].current_floor, passenger.current_floor,
                    "{id} left {car} away from the car"
                );
            }
            if let Some(car) = car_now {
                assert_eq!(
                    current.elevators[&car].current_floor, passenger.current_floor,
                    "{id} boarded {car} away from its floor"
                );
                self.boarded_with.insert(*id, car);
            }
        }
    }
}
