//! Grid coordinates identifying a cell of the world.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// An (eastings, northings) pair. Places are keyed by it; Characters and
/// Items lying in the world are located by it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Coords {
    /// Eastings
    pub x: i64,
    /// Northings
    pub y: i64,
}

/// Offsets of the eight surrounding cells, clockwise from north.
const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

impl Coords {
    pub const ORIGIN: Coords = Coords { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Chebyshev distance: the number of single steps between two cells.
    pub fn distance(&self, other: &Coords) -> u64 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        dx.max(dy)
    }

    pub fn is_adjacent(&self, other: &Coords) -> bool {
        self.distance(other) == 1
    }

    /// The surrounding cells, in a fixed order. Cells past the edge of the
    /// `i64` grid are left out.
    pub fn neighbours(&self) -> Vec<Coords> {
        NEIGHBOUR_OFFSETS
            .iter()
            .filter_map(|&(dx, dy)| {
                Some(Coords::new(self.x.checked_add(dx)?, self.y.checked_add(dy)?))
            })
            .collect()
    }

    /// Compass label of an adjacent cell, `None` if `other` is not adjacent.
    pub fn direction_to(&self, other: &Coords) -> Option<&'static str> {
        if !self.is_adjacent(other) {
            return None;
        }
        let label = match ((other.x - self.x).signum(), (other.y - self.y).signum()) {
            (0, 1) => "north",
            (1, 1) => "north-east",
            (1, 0) => "east",
            (1, -1) => "south-east",
            (0, -1) => "south",
            (-1, -1) => "south-west",
            (-1, 0) => "west",
            _ => "north-west",
        };
        Some(label)
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl FromStr for Coords {
    type Err = DomainError;

    /// Parses `x,y`, tolerating whitespace and surrounding parentheses.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s
            .trim()
            .trim_start_matches('(')
            .trim_end_matches(')');
        let (x, y) = inner
            .split_once(',')
            .ok_or_else(|| DomainError::parse(format!("Expected 'x,y' coordinates, got '{s}'")))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| DomainError::parse(format!("Invalid eastings in '{s}'")))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| DomainError::parse(format!("Invalid northings in '{s}'")))?;
        Ok(Self { x, y })
    }
}

impl From<(i64, i64)> for Coords {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}
