//! SMC Core: market structure, fair value gaps, signal aggregation and
//! trade plan management.
//!
//! This crate is the deterministic heart of the decision engine:
//! - Candle model and ordering guard
//! - Swing/BOS/CHoCH structure tracker
//! - Fair value gap detector with invalidation, fill and aging
//! - Weighted multi-source signal aggregator
//! - Trade plan lifecycle (pending, open, break-even, trailing)
//! - Per-instrument pipeline and synchronous backtest driver
//!
//! No I/O, no async runtime, no wall-clock reads.

pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod gaps;
pub mod indicators;
pub mod plan;
pub mod signals;
pub mod structure;

pub use config::{StrategyConfig, StrategyPreset};
pub use domain::{Candle, Direction, Trend};
pub use engine::{run_backtest, BacktestResult, Engine, Pipeline, StepOutput};
pub use error::{ConfigError, InputError, PlanError};
