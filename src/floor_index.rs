//! Per-floor view of parked cars and waiting passengers.
//!
//! The index is derived state: cars and passengers know where they are, the
//! index only caches it so event firing can walk floors instead of scanning the
//! whole fleet. The dispatcher updates it in the same call that moves a car or
//! a passenger, removing from the old floor before adding to the new one.

use std::collections::{BTreeMap, BTreeSet};

use crate::direction::Floor;
use crate::elevator::ElevatorId;
use crate::passenger::PassengerId;

/// Occupancy of a single floor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloorEntry {
    elevators: BTreeSet<ElevatorId>,
    /// Passengers waiting in the corridor; riders are tracked by their car.
    passengers: BTreeSet<PassengerId>,
}

impl FloorEntry {
    pub fn elevators(&self) -> &BTreeSet<ElevatorId> {
        &self.elevators
    }

    pub fn passengers(&self) -> &BTreeSet<PassengerId> {
        &self.passengers
    }

    pub fn is_empty(&self) -> bool {
        self.elevators.is_empty() && self.passengers.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct FloorIndex {
    floors: BTreeMap<Floor, FloorEntry>,
}

impl FloorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from scratch out of known positions.
    pub fn rebuild(
        elevators: impl IntoIterator<Item = (ElevatorId, Floor)>,
        waiting: impl IntoIterator<Item = (PassengerId, Floor)>,
    ) -> Self {
        let mut index = Self::new();
        for (elevator, floor) in elevators {
            index.place_elevator(elevator, floor);
        }
        for (passenger, floor) in waiting {
            index.add_waiting(passenger, floor);
        }
        index
    }

    pub fn entry(&self, floor: Floor) -> Option<&FloorEntry> {
        self.floors.get(&floor)
    }

    /// Occupied floors in ascending order.
    pub fn floors(&self) -> impl Iterator<Item = Floor> + '_ {
        self.floors.keys().copied()
    }

    pub fn elevators_at(&self, floor: Floor) -> Vec<ElevatorId> {
        self.entry(floor)
            .map(|entry| entry.elevators.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn waiting_at(&self, floor: Floor) -> Vec<PassengerId> {
        self.entry(floor)
            .map(|entry| entry.passengers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn waiting_count(&self) -> usize {
        self.floors.values().map(|entry| entry.passengers.len()).sum()
    }

    pub fn place_elevator(&mut self, elevator: ElevatorId, floor: Floor) {
        self.floors.entry(floor).or_default().elevators.insert(elevator);
    }

    pub fn move_elevator(&mut self, elevator: ElevatorId, from: Floor, to: Floor) {
        if from == to {
            return;
        }
        if let Some(entry) = self.floors.get_mut(&from) {
            entry.elevators.remove(&elevator);
        }
        self.prune(from);
        self.place_elevator(elevator, to);
    }

    pub fn add_waiting(&mut self, passenger: PassengerId, floor: Floor) {
        self.floors.entry(floor).or_default().passengers.insert(passenger);
    }

    pub fn remove_waiting(&mut self, passenger: PassengerId, floor: Floor) -> bool {
        let removed = self
            .floors
            .get_mut(&floor)
            .is_some_and(|entry| entry.passengers.remove(&passenger));
        self.prune(floor);
        removed
    }

    fn prune(&mut self, floor: Floor) {
        if self.floors.get(&floor).is_some_and(FloorEntry::is_empty) {
            self.floors.remove(&floor);
        }
    }

    /// First floor on which the two indexes disagree, ignoring empty entries.
    pub fn first_mismatch(&self, other: &FloorIndex) -> Option<Floor> {
        let empty = FloorEntry::default();
        let floors: BTreeSet<Floor> = self.floors().chain(other.floors()).collect();
        floors.into_iter().find(|floor| {
            let ours = self.entry(*floor).unwrap_or(&empty);
            let theirs = other.entry(*floor).unwrap_or(&empty);
            ours != theirs
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_are_created_lazily() {
        let mut index = FloorIndex::new();
        assert!(index.entry(3).is_none());
        index.place_elevator(ElevatorId(1), 3);
        assert!(!index.entry(3).is_some_and(FloorEntry::is_empty));
        assert_eq!(index.elevators_at(3), vec![ElevatorId(1)]);
        assert_eq!(index.floors().collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn moving_an_elevator_leaves_the_old_floor() {
        let mut index = FloorIndex::new();
        index.place_elevator(ElevatorId(1), 3);
        index.move_elevator(ElevatorId(1), 3, 4);
        assert!(index.elevators_at(3).is_empty());
        assert_eq!(index.elevators_at(4), vec![ElevatorId(1)]);

        index.move_elevator(ElevatorId(1), 4, 4);
        assert_eq!(index.elevators_at(4), vec![ElevatorId(1)]);
    }

    #[test]
    fn emptied_floors_are_dropped() {
        let mut index = FloorIndex::new();
        index.place_elevator(ElevatorId(1), 3);
        index.add_waiting(PassengerId(1), 3);
        index.move_elevator(ElevatorId(1), 3, 4);
        assert_eq!(index.floors().collect::<Vec<_>>(), vec![3, 4]);

        index.remove_waiting(PassengerId(1), 3);
        assert_eq!(index.floors().collect::<Vec<_>>(), vec![4]);
        assert!(index.entry(3).is_none());
    }

    #[test]
    fn waiting_passengers_are_counted() {
        let mut index = FloorIndex::new();
        index.add_waiting(PassengerId(1), 2);
        index.add_waiting(PassengerId(2), 5);
        assert_eq!(index.waiting_count(), 2);
        assert!(index.remove_waiting(PassengerId(1), 2));
        assert!(!index.remove_waiting(PassengerId(1), 2));
        assert_eq!(index.waiting_count(), 1);
    }

    #[test]
    fn mismatch_ignores_empty_entries() {
        let mut index = FloorIndex::new();
        index.place_elevator(ElevatorId(1), 3);
        index.move_elevator(ElevatorId(1), 3, 4);

        let rebuilt = FloorIndex::rebuild([(ElevatorId(1), 4)], Vec::<(PassengerId, Floor)>::new());
        assert_eq!(index.first_mismatch(&rebuilt), None);

        let wrong = FloorIndex::rebuild([(ElevatorId(1), 5)], Vec::<(PassengerId, Floor)>::new());
        assert_eq!(index.first_mismatch(&wrong), Some(4));
    }
}
