//! Indicator-driven detectors.
//!
//! Each wraps one or more streaming indicators and maps their output to a
//! directional `Signal`. Structure and gap signals come from the pipeline's
//! own trackers (see `signals::adapters`), not from here.

pub mod macd;
pub mod momentum;
pub mod rsi;

pub use macd::MacdDetector;
pub use momentum::MomentumDetector;
pub use rsi::RsiDetector;

use super::{AggregatorConfig, Detector, SourceType};
use crate::config::IndicatorSettings;

/// Instantiate a detector for every indicator source that carries a weight.
///
/// Order is fixed (momentum, RSI, MACD) so signal order is deterministic.
pub fn build_detectors(
    settings: &IndicatorSettings,
    aggregator: &AggregatorConfig,
) -> Vec<Box<dyn Detector>> {
    let mut detectors: Vec<Box<dyn Detector>> = Vec::new();
    if aggregator.weights.contains_key(&SourceType::Momentum) {
        detectors.push(Box::new(MomentumDetector::new(&settings.momentum)));
    }
    if aggregator.weights.contains_key(&SourceType::Rsi) {
        detectors.push(Box::new(RsiDetector::new(&settings.rsi)));
    }
    if aggregator.weights.contains_key(&SourceType::Macd) {
        detectors.push(Box::new(MacdDetector::new(&settings.macd)));
    }
    detectors
}
