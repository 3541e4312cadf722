//! Panels a passenger uses to talk to the building.
//!
//! Passengers never hold references to cars or to the dispatcher. Each event
//! hands them a short-lived panel instead, and every mutation goes through it.

use crate::direction::{Direction, Floor};
use crate::elevator::ElevatorId;
use crate::passenger::PassengerId;
use crate::system::DispatchError;

/// The call buttons in a floor corridor.
pub trait FloorPanel {
    /// Request a car to pick `requester` up at `at_floor` for travel in `direction`.
    ///
    /// Returns the car that was assigned.
    fn request_elevator(
        &mut self,
        at_floor: Floor,
        direction: Direction,
        requester: PassengerId,
    ) -> Result<ElevatorId, DispatchError>;

    /// Whether `elevator` is at `floor` or still has it on its path.
    fn will_visit(&self, elevator: ElevatorId, floor: Floor) -> bool;
}

/// The panel inside a car standing at a floor.
///
/// The corridor buttons stay reachable so a rider leaving mid-journey can
/// call the next car.
pub trait ElevatorPanel: FloorPanel {
    fn id(&self) -> ElevatorId;

    fn current_floor(&self) -> Floor;

    fn min_floor(&self) -> Floor;

    fn max_floor(&self) -> Floor;

    fn accepts_requests(&self) -> bool;

    fn request_destination_floor(&mut self, floor: Floor, requester: PassengerId) -> Result<(), DispatchError>;

    /// Move `passenger` from the corridor into the car.
    fn board_passenger(&mut self, passenger: PassengerId);

    /// Move `passenger` out of the car. Riders that have not `arrived` go back
    /// to waiting in the corridor.
    fn remove_passenger(&mut self, passenger: PassengerId, arrived: bool);
}
