//! Passenger lifecycle driven by system events.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::direction::{Direction, Floor};
use crate::elevator::ElevatorId;
use crate::system::DispatchError;
use crate::traits::{ElevatorPanel, FloorPanel};

static NEXT_PASSENGER_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PassengerId(pub u32);

impl PassengerId {
    fn next() -> Self {
        Self(NEXT_PASSENGER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PassengerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassengerState {
    Idle,
    WaitingForElevator,
    TravelingWithElevator,
    Arrived,
}

impl PassengerState {
    pub const ALL: [PassengerState; 4] = [
        PassengerState::Idle,
        PassengerState::WaitingForElevator,
        PassengerState::TravelingWithElevator,
        PassengerState::Arrived,
    ];
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PassengerError {
    #[error("passenger floors must be at least 1, got start {start_floor} and destination {destination_floor}")]
    InvalidFloor {
        start_floor: Floor,
        destination_floor: Floor,
    },
}

#[derive(Debug, Clone)]
pub struct Passenger {
    id: PassengerId,
    start_floor: Floor,
    destination_floor: Floor,
    current_floor: Floor,
    state: PassengerState,
    /// Where the current leg ends; the destination clamped to the car's range.
    next_destination: Floor,
    expected_elevator: Option<ElevatorId>,
    current_elevator: Option<ElevatorId>,
}

impl Passenger {
    pub fn new(start_floor: Floor, destination_floor: Floor) -> Result<Self, PassengerError> {
        if start_floor < 1 || destination_floor < 1 {
            return Err(PassengerError::InvalidFloor {
                start_floor,
                destination_floor,
            });
        }

        Ok(Self {
            id: PassengerId::next(),
            start_floor,
            destination_floor,
            current_floor: start_floor,
            state: PassengerState::Idle,
            next_destination: destination_floor,
            expected_elevator: None,
            current_elevator: None,
        })
    }

    pub fn id(&self) -> PassengerId {
        self.id
    }

    pub fn start_floor(&self) -> Floor {
        self.start_floor
    }

    pub fn destination_floor(&self) -> Floor {
        self.destination_floor
    }

    pub fn current_floor(&self) -> Floor {
        self.current_floor
    }

    pub fn state(&self) -> PassengerState {
        self.state
    }

    /// The car carrying this passenger, only set while traveling.
    pub fn current_elevator(&self) -> Option<ElevatorId> {
        self.current_elevator
    }

    /// The car assigned to this passenger's pending hall call.
    pub fn expected_elevator(&self) -> Option<ElevatorId> {
        self.expected_elevator
    }

    /// The system accepts requests; leave IDLE by calling a car.
    ///
    /// A waiting passenger whose assigned car will no longer come by calls again.
    pub fn on_system_ready(&mut self, panel: &mut dyn FloorPanel) -> Result<(), DispatchError> {
        match self.state {
            PassengerState::Idle => match Direction::between(self.current_floor, self.destination_floor) {
                None => {
                    debug!(passenger = %self.id, floor = self.current_floor, "already at destination");
                    self.state = PassengerState::Arrived;
                    Ok(())
                }
                Some(direction) => {
                    self.call_elevator(panel, direction)?;
                    self.state = PassengerState::WaitingForElevator;
                    Ok(())
                }
            },
            PassengerState::WaitingForElevator => {
                let stranded = self
                    .expected_elevator
                    .is_none_or(|elevator| !panel.will_visit(elevator, self.current_floor));
                let Some(direction) = Direction::between(self.current_floor, self.destination_floor) else {
                    return Ok(());
                };
                if stranded {
                    warn!(
                        passenger = %self.id,
                        floor = self.current_floor,
                        elevator = ?self.expected_elevator,
                        "assigned car will not come by, calling again"
                    );
                    self.call_elevator(panel, direction)?;
                }
                Ok(())
            }
            PassengerState::TravelingWithElevator | PassengerState::Arrived => Ok(()),
        }
    }

    /// A car stands at a floor; board it if it is ours, or leave it at the end of the leg.
    pub fn on_elevator_arrived(&mut self, panel: &mut dyn ElevatorPanel) -> Result<(), DispatchError> {
        match self.state {
            PassengerState::WaitingForElevator
                if self.expected_elevator == Some(panel.id()) && panel.current_floor() == self.current_floor =>
            {
                self.board(panel)
            }
            PassengerState::TravelingWithElevator if self.current_elevator == Some(panel.id()) => self.ride(panel),
            _ => Ok(()),
        }
    }

    fn board(&mut self, panel: &mut dyn ElevatorPanel) -> Result<(), DispatchError> {
        let Some(direction) = Direction::between(self.current_floor, self.destination_floor) else {
            return Ok(());
        };

        let next_destination = match direction {
            Direction::Up if panel.max_floor() > self.current_floor => panel.max_floor().min(self.destination_floor),
            Direction::Down if panel.min_floor() < self.current_floor => panel.min_floor().max(self.destination_floor),
            // The car cannot take us any further this way, find another one.
            _ => return self.call_elevator(panel, direction),
        };

        panel.board_passenger(self.id);
        self.next_destination = next_destination;
        self.current_elevator = Some(panel.id());
        self.expected_elevator = None;
        self.state = PassengerState::TravelingWithElevator;
        debug!(
            passenger = %self.id,
            elevator = %panel.id(),
            floor = self.current_floor,
            leg_end = next_destination,
            "boarded"
        );

        if panel.accepts_requests() {
            panel.request_destination_floor(next_destination, self.id)?;
        }
        Ok(())
    }

    fn ride(&mut self, panel: &mut dyn ElevatorPanel) -> Result<(), DispatchError> {
        self.current_floor = panel.current_floor();
        if self.current_floor != self.next_destination {
            return Ok(());
        }

        let arrived = self.next_destination == self.destination_floor;
        panel.remove_passenger(self.id, arrived);
        self.current_elevator = None;
        debug!(passenger = %self.id, elevator = %panel.id(), floor = self.current_floor, arrived, "left car");

        match Direction::between(self.current_floor, self.destination_floor) {
            None => self.state = PassengerState::Arrived,
            Some(direction) => {
                self.state = PassengerState::WaitingForElevator;
                self.call_elevator(panel, direction)?;
            }
        }
        Ok(())
    }

    fn call_elevator<P: FloorPanel + ?Sized>(&mut self, panel: &mut P, direction: Direction) -> Result<(), DispatchError> {
        let elevator = panel.request_elevator(self.current_floor, direction, self.id)?;
        self.expected_elevator = Some(elevator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A car standing at `current_floor` that records everything asked of it.
    struct MockPanel {
        id: ElevatorId,
        current_floor: Floor,
        min_floor: Floor,
        max_floor: Floor,
        accepts_requests: bool,
        assigns: ElevatorId,
        visits: bool,
        calls: Vec<(Floor, Direction)>,
        requests: Vec<Floor>,
        boarded: Vec<PassengerId>,
        removed: Vec<(PassengerId, bool)>,
    }

    impl MockPanel {
        fn new(id: u32, current_floor: Floor) -> Self {
            Self {
                id: ElevatorId(id),
                current_floor,
                min_floor: 1,
                max_floor: 10,
                accepts_requests: true,
                assigns: ElevatorId(id),
                visits: true,
                calls: Vec::new(),
                requests: Vec::new(),
                boarded: Vec::new(),
                removed: Vec::new(),
            }
        }
    }

    impl FloorPanel for MockPanel {
        fn request_elevator(
            &mut self,
            at_floor: Floor,
            direction: Direction,
            _requester: PassengerId,
        ) -> Result<ElevatorId, DispatchError> {
            self.calls.push((at_floor, direction));
            Ok(self.assigns)
        }

        fn will_visit(&self, _elevator: ElevatorId, _floor: Floor) -> bool {
            self.visits
        }
    }

    impl ElevatorPanel for MockPanel {
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

        fn request_destination_floor(&mut self, floor: Floor, _requester: PassengerId) -> Result<(), DispatchError> {
            self.requests.push(floor);
            Ok(())
        }

        fn board_passenger(&mut self, passenger: PassengerId) {
            self.boarded.push(passenger);
        }

        fn remove_passenger(&mut self, passenger: PassengerId, arrived: bool) {
            self.removed.push((passenger, arrived));
        }
    }

    #[test]
    fn rejects_floor_zero() {
        assert!(Passenger::new(0, 3).is_err());
        assert!(Passenger::new(3, 0).is_err());
    }

    #[test]
    fn same_floor_arrives_on_ready_without_calling() {
        let mut passenger = Passenger::new(4, 4).unwrap();
        let mut panel = MockPanel::new(1, 1);
        passenger.on_system_ready(&mut panel).unwrap();
        assert_eq!(passenger.state(), PassengerState::Arrived);
        assert!(panel.calls.is_empty());
    }

    #[test]
    fn ready_calls_an_elevator() {
        let mut passenger = Passenger::new(2, 7).unwrap();
        let mut panel = MockPanel::new(3, 5);
        passenger.on_system_ready(&mut panel).unwrap();
        assert_eq!(passenger.state(), PassengerState::WaitingForElevator);
        assert_eq!(passenger.expected_elevator(), Some(ElevatorId(3)));
        assert_eq!(panel.calls, vec![(2, Direction::Up)]);
    }

    #[test]
    fn ignores_other_cars_and_other_floors() {
        let mut passenger = Passenger::new(2, 7).unwrap();
        let mut panel = MockPanel::new(3, 2);
        passenger.on_system_ready(&mut panel).unwrap();

        let mut other_car = MockPanel::new(4, 2);
        passenger.on_elevator_arrived(&mut other_car).unwrap();
        let mut wrong_floor = MockPanel::new(3, 3);
        passenger.on_elevator_arrived(&mut wrong_floor).unwrap();

        assert_eq!(passenger.state(), PassengerState::WaitingForElevator);
        assert!(other_car.boarded.is_empty() && wrong_floor.boarded.is_empty());
    }

    #[test]
    fn boards_and_arrives_with_the_same_car() {
        let mut passenger = Passenger::new(2, 7).unwrap();
        let mut car = MockPanel::new(3, 2);
        passenger.on_system_ready(&mut car).unwrap();
        passenger.on_elevator_arrived(&mut car).unwrap();

        assert_eq!(passenger.state(), PassengerState::TravelingWithElevator);
        assert_eq!(passenger.current_elevator(), Some(ElevatorId(3)));
        assert_eq!(car.requests, vec![7]);

        car.current_floor = 5;
        passenger.on_elevator_arrived(&mut car).unwrap();
        assert_eq!(passenger.state(), PassengerState::TravelingWithElevator);

        car.current_floor = 7;
        passenger.on_elevator_arrived(&mut car).unwrap();
        assert_eq!(passenger.state(), PassengerState::Arrived);
        assert_eq!(passenger.current_elevator(), None);
        assert_eq!(car.removed, vec![(passenger.id(), true)]);
    }

    #[test]
    fn destination_out_of_car_range_splits_the_trip() {
        let mut passenger = Passenger::new(1, 9).unwrap();
        let mut car = MockPanel::new(5, 1);
        car.max_floor = 6;
        passenger.on_system_ready(&mut car).unwrap();
        passenger.on_elevator_arrived(&mut car).unwrap();
        assert_eq!(car.requests, vec![6]);

        car.current_floor = 6;
        car.assigns = ElevatorId(8);
        passenger.on_elevator_arrived(&mut car).unwrap();
        assert_eq!(passenger.state(), PassengerState::WaitingForElevator);
        assert_eq!(passenger.current_floor(), 6);
        assert_eq!(passenger.expected_elevator(), Some(ElevatorId(8)));
        assert_eq!(car.removed, vec![(passenger.id(), false)]);
        assert_eq!(car.calls.last(), Some(&(6, Direction::Up)));
    }

    #[test]
    fn paternoster_ride_requests_nothing() {
        let mut passenger = Passenger::new(3, 1).unwrap();
        let mut car = MockPanel::new(2, 3);
        car.accepts_requests = false;
        passenger.on_system_ready(&mut car).unwrap();
        passenger.on_elevator_arrived(&mut car).unwrap();
        assert_eq!(passenger.state(), PassengerState::TravelingWithElevator);
        assert!(car.requests.is_empty());
    }

    #[test]
    fn stranded_waiter_calls_again() {
        let mut passenger = Passenger::new(4, 1).unwrap();
        let mut panel = MockPanel::new(1, 9);
        passenger.on_system_ready(&mut panel).unwrap();
        passenger.on_system_ready(&mut panel).unwrap();
        assert_eq!(panel.calls.len(), 1);

        panel.visits = false;
        panel.assigns = ElevatorId(2);
        passenger.on_system_ready(&mut panel).unwrap();
        assert_eq!(panel.calls.len(), 2);
        assert_eq!(passenger.expected_elevator(), Some(ElevatorId(2)));
    }
}
