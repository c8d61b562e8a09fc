use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade or signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1.0 for long, -1.0 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// True if `a` is at least as favorable as `b` for this direction.
    pub fn at_least_as_favorable(self, a: f64, b: f64) -> bool {
        match self {
            Direction::Long => a >= b,
            Direction::Short => a <= b,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

/// Prevailing market structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Ranging,
}

impl Trend {
    pub fn direction(self) -> Option<Direction> {
        match self {
            Trend::Up => Some(Direction::Long),
            Trend::Down => Some(Direction::Short),
            Trend::Ranging => None,
        }
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => Trend::Up,
            Direction::Short => Trend::Down,
        }
    }
}
