//! Pipeline orchestration: per-instrument steps, multi-instrument routing,
//! and the synchronous backtest driver.
//!
//! Per candle, in order:
//! 1. Input validation (ordering, OHLC sanity)
//! 2. Structure tracker and gap detector
//! 3. Detector signals and aggregation
//! 4. Plan maintenance (exits first), then new entries

pub mod backtest;
pub mod executor;
pub mod multi;
pub mod pipeline;

pub use backtest::{
    event_log_digest, run_backtest, run_pipeline, BacktestResult, BacktestSummary, EventRecord,
    LoggedEvent, RejectedInput,
};
pub use executor::{NullExecutor, PlanExecutor, RecordingExecutor};
pub use multi::Engine;
pub use pipeline::{Pipeline, StepOutput};
