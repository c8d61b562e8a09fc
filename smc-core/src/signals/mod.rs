//! Signals: per-candle directional opinions and their weighted aggregation.
//!
//! Detectors see candles only, never trade plans or positions. A `Signal` is
//! transient: produced and consumed within the same pipeline step.

pub mod adapters;
pub mod aggregator;
pub mod detectors;

pub use adapters::{
    gap_signals, structure_signals, GapSignalDetector, StructureSignalDetector,
    TREND_BIAS_STRENGTH,
};
pub use aggregator::{AggregatorConfig, Decision, DecisionDirection, SignalAggregator};
pub use detectors::{MacdDetector, MomentumDetector, RsiDetector};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::{Candle, Direction};
use crate::error::ConfigError;

/// Which kind of detector produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Structure,
    Gap,
    Momentum,
    Rsi,
    Macd,
    VolumeProfile,
}

impl SourceType {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceType::Structure => "structure",
            SourceType::Gap => "gap",
            SourceType::Momentum => "momentum",
            SourceType::Rsi => "rsi",
            SourceType::Macd => "macd",
            SourceType::VolumeProfile => "volume_profile",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structure" => Ok(SourceType::Structure),
            "gap" | "fvg" => Ok(SourceType::Gap),
            "momentum" => Ok(SourceType::Momentum),
            "rsi" => Ok(SourceType::Rsi),
            "macd" => Ok(SourceType::Macd),
            "volume_profile" => Ok(SourceType::VolumeProfile),
            _ => Err(ConfigError::UnknownSource(s.to_string())),
        }
    }
}

/// One detector's directional opinion for one candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source: SourceType,
    pub direction: Direction,
    /// Conviction in [0, 1].
    pub strength: f64,
    pub candle_index: u64,
}

impl Signal {
    /// Strength is clamped into [0, 1]; NaN becomes 0.
    pub fn new(source: SourceType, direction: Direction, strength: f64, candle_index: u64) -> Self {
        let strength = if strength.is_nan() {
            0.0
        } else {
            strength.clamp(0.0, 1.0)
        };
        Self {
            source,
            direction,
            strength,
            candle_index,
        }
    }
}

/// Capability shared by every candle-driven signal source.
///
/// Implementations must be deterministic: the same candle sequence yields
/// the same signals. They receive no portfolio or plan state.
pub trait Detector: Send + Sync {
    fn source(&self) -> SourceType;

    /// Human-readable name (e.g., "momentum_roc_10").
    fn name(&self) -> &str;

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_round_trips_names() {
        for source in [
            SourceType::Structure,
            SourceType::Gap,
            SourceType::Momentum,
            SourceType::Rsi,
            SourceType::Macd,
            SourceType::VolumeProfile,
        ] {
            assert_eq!(source.as_str().parse::<SourceType>().unwrap(), source);
        }
        assert_eq!("FVG".parse::<SourceType>().unwrap(), SourceType::Gap);
        assert!("sentiment".parse::<SourceType>().is_err());
    }

    #[test]
    fn signal_strength_clamped() {
        assert_eq!(Signal::new(SourceType::Rsi, Direction::Long, 1.7, 0).strength, 1.0);
        assert_eq!(Signal::new(SourceType::Rsi, Direction::Long, f64::NAN, 0).strength, 0.0);
    }
}
