//! SMC Runner: adapters around `smc-core`.
//!
//! This crate provides:
//! - TOML strategy loading with named preset fallback
//! - CSV candle loading with dataset hashing
//! - Parallel multi-instrument backtests and replay checks
//! - A tick→candle assembler and the async live driver
//! - Cross-instrument metrics and JSON/CSV export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod live;
pub mod metrics;
pub mod runner;

pub use config::{load_config, parse_config, resolve_config, ConfigLoadError};
pub use data_loader::{load_candles, parse_candles, LoadError, LoadedCandles};
pub use export::{export_json, export_plans_csv, save_artifacts};
pub use live::{
    CandleAssembler, ChannelExecutor, FeedMessage, LiveDriver, LiveReport, LiveStats, StopCause,
    StopHandle, DEFAULT_REORDER_WINDOW,
};
pub use metrics::{AggregateMetrics, InstrumentRow};
pub use runner::{replay_check, run_backtests, BacktestJob, ReplayReport, RunError};
