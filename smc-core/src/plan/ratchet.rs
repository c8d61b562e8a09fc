//! Stop ratchet: stops may tighten, never loosen.
//!
//! Long: the stop can only rise. Short: the stop can only fall.

use serde::{Deserialize, Serialize};

use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatchetState {
    level: f64,
    direction: Direction,
}

impl RatchetState {
    pub fn new(direction: Direction, initial_level: f64) -> Self {
        Self {
            level: initial_level,
            direction,
        }
    }

    /// Returns the ratcheted level: the tighter of current and proposed.
    pub fn apply(&mut self, proposed: f64) -> f64 {
        if self.tightens(proposed) {
            self.level = proposed;
        }
        self.level
    }

    /// True if `proposed` is strictly tighter than the current level.
    pub fn tightens(&self, proposed: f64) -> bool {
        if !proposed.is_finite() {
            return false;
        }
        match self.direction {
            Direction::Long => proposed > self.level,
            Direction::Short => proposed < self.level,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }
}
