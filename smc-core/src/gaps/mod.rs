//! Fair value gap detection and lifecycle tracking.

pub mod detector;
pub mod fvg;

pub use detector::{GapDetector, GapEvent};
pub use fvg::{FillMode, Fvg, FvgDirection};
