//! Backtest runner: fans instruments out across a rayon pool.
//!
//! Each instrument gets its own pipeline; pipelines share nothing but the
//! immutable config, so running them in parallel cannot change any result.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use smc_core::{run_backtest, BacktestResult, Candle, ConfigError, StrategyConfig};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("no instruments to run")]
    NoInstruments,
}

/// One instrument's input.
#[derive(Debug, Clone)]
pub struct BacktestJob {
    pub instrument: String,
    pub candles: Vec<Candle>,
}

impl BacktestJob {
    pub fn new(instrument: impl Into<String>, candles: Vec<Candle>) -> Self {
        Self {
            instrument: instrument.into(),
            candles,
        }
    }
}

/// Run every job in parallel. Results come back in job order.
pub fn run_backtests(
    jobs: &[BacktestJob],
    config: &StrategyConfig,
) -> Result<Vec<BacktestResult>, RunError> {
    if jobs.is_empty() {
        return Err(RunError::NoInstruments);
    }
    config.validate()?;

    let results = jobs
        .par_iter()
        .map(|job| run_backtest(&job.instrument, &job.candles, config))
        .collect::<Result<Vec<_>, _>>()?;

    for r in &results {
        info!(
            instrument = %r.instrument,
            candles = r.candles_processed,
            trades = r.summary.trades,
            total_r = r.summary.total_r,
            digest = %r.digest,
            "backtest complete"
        );
    }
    Ok(results)
}

/// Outcome of running the same input twice.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub instrument: String,
    pub first_digest: String,
    pub second_digest: String,
    pub events: usize,
}

impl ReplayReport {
    pub fn is_deterministic(&self) -> bool {
        self.first_digest == self.second_digest
    }
}

/// Replay one instrument twice from fresh pipelines and compare event logs.
pub fn replay_check(job: &BacktestJob, config: &StrategyConfig) -> Result<ReplayReport, RunError> {
    let first = run_backtest(&job.instrument, &job.candles, config)?;
    let second = run_backtest(&job.instrument, &job.candles, config)?;
    Ok(ReplayReport {
        instrument: job.instrument.clone(),
        first_digest: first.digest,
        second_digest: second.digest,
        events: first.events.len(),
    })
}
