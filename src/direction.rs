//! Travel direction between floors.

use serde::{Deserialize, Serialize};

/// A floor number. Floors start at 1.
pub type Floor = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction needed to get from `from` to `to`, `None` when they are equal.
    pub fn between(from: Floor, to: Floor) -> Option<Self> {
        match from.cmp(&to) {
            std::cmp::Ordering::Less => Some(Direction::Up),
            std::cmp::Ordering::Greater => Some(Direction::Down),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// The floor one step away in this direction, `None` below floor 1 or on overflow.
    pub fn next_floor(self, floor: Floor) -> Option<Floor> {
        match self {
            Direction::Up => floor.checked_add(1),
            Direction::Down => floor.checked_sub(1).filter(|f| *f >= 1),
        }
    }
}

/// Number of single-floor moves between two floors.
pub fn distance(a: Floor, b: Floor) -> u32 {
    a.abs_diff(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn between_floors() {
        assert_eq!(Direction::between(1, 5), Some(Direction::Up));
        assert_eq!(Direction::between(5, 1), Some(Direction::Down));
        assert_eq!(Direction::between(3, 3), None);
    }

    #[test]
    fn next_floor_stops_at_ground() {
        assert_eq!(Direction::Down.next_floor(1), None);
        assert_eq!(Direction::Down.next_floor(2), Some(1));
        assert_eq!(Direction::Up.next_floor(2), Some(3));
    }
}
