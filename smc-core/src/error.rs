//! Error taxonomy for the decision engine.
//!
//! - `InputError`: rejected at the feed boundary, pipeline state unchanged.
//! - `ConfigError`: rejected at construction, before any candle is processed.
//! - `PlanError`: the triggering decision is skipped and counted, never fatal.
//!
//! Every variant carries a stable reason code via `code()`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a candle failed the OHLCV sanity check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedReason {
    NonFinite,
    LowAboveHigh,
    OpenOutsideRange,
    CloseOutsideRange,
    NegativeVolume,
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NonFinite => "non-finite OHLCV value",
            Self::LowAboveHigh => "low above high",
            Self::OpenOutsideRange => "open outside [low, high]",
            Self::CloseOutsideRange => "close outside [low, high]",
            Self::NegativeVolume => "negative volume",
        };
        f.write_str(s)
    }
}

/// Rejected feed input.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum InputError {
    #[error("candle {got} arrived after candle {last}")]
    OutOfOrder { last: u64, got: u64 },
    #[error("candle {index} was already processed")]
    Duplicate { index: u64 },
    #[error("candle {index} is malformed: {reason}")]
    Malformed { index: u64, reason: MalformedReason },
}

impl InputError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::OutOfOrder { .. } => "out_of_order",
            Self::Duplicate { .. } => "duplicate_candle",
            Self::Malformed { .. } => "malformed_candle",
        }
    }
}

/// Invalid strategy configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown signal source type: {0}")]
    UnknownSource(String),
    #[error("decision threshold {0} outside [0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("minimum signal strength {0} outside [0, 1]")]
    MinStrengthOutOfRange(f64),
    #[error("weight for {name} must be non-negative and finite, got {weight}")]
    NegativeWeight { name: String, weight: f64 },
    #[error("risk multiple must be positive, got {0}")]
    NegativeRiskMultiple(f64),
    #[error("swing lookback must be >= 1, got {0}")]
    InvalidSwingLookback(usize),
    #[error("risk fraction must be in (0, 1), got {0}")]
    InvalidRiskFraction(f64),
    #[error("advisory bounds must satisfy 0 < min <= 1 <= max, got [{min}, {max}]")]
    InvalidAdvisoryBounds { min: f64, max: f64 },
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },
}

/// A decision that could not be turned into a trade plan.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PlanError {
    #[error("stop {stop} gives no risk distance from entry {entry}")]
    DegenerateStop { entry: f64, stop: f64 },
    #[error("no open fair value gap correlates with the CHoCH at candle {choch_index}")]
    NoCorrelatedGap { choch_index: u64 },
    #[error("no CHoCH in the decision direction to anchor the entry")]
    NoChoch,
    #[error("no swing point available to place a structural stop")]
    NoStructuralStop,
}

impl PlanError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DegenerateStop { .. } => "degenerate_stop",
            Self::NoCorrelatedGap { .. } => "no_correlated_gap",
            Self::NoChoch => "no_choch",
            Self::NoStructuralStop => "no_structural_stop",
        }
    }
}
