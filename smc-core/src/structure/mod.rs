//! Market structure: swing points, trend state, BOS and CHoCH events.

pub mod swing;
pub mod tracker;

pub use swing::{PivotWindow, SwingKind, SwingLabel, SwingPoint};
pub use tracker::{ChochRecord, StructureEvent, StructureState, StructureTracker};
