use serde::{Deserialize, Serialize};
use std::fmt;

/// Fair value gap identifier, unique per gap detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FvgId(pub u64);

impl fmt::Display for FvgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fvg-{}", self.0)
    }
}

/// Trade plan identifier, unique per plan manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(pub u64);

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan-{}", self.0)
    }
}

/// Monotonic id allocator. Ids restart at 1 for every new owner so replays
/// produce identical ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdSequence {
    next: u64,
}

impl IdSequence {
    pub fn next_id(&mut self) -> u64 {
        self.next += 1;
        self.next
    }
}
