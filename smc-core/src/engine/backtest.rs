//! Synchronous backtest driver.
//!
//! Pulls candles in order, pushes each through the pipeline, and only
//! advances once the step is complete. End of input is a normal terminal
//! condition: open plans stay open and are reported as such.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use super::executor::{NullExecutor, PlanExecutor};
use super::pipeline::{Pipeline, StepOutput};
use crate::config::StrategyConfig;
use crate::domain::{Candle, Instrument};
use crate::error::{ConfigError, InputError};
use crate::gaps::GapEvent;
use crate::plan::{TradePlan, TradePlanEvent};
use crate::signals::Decision;
use crate::structure::StructureEvent;

/// One entry of the ordered event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "event", rename_all = "snake_case")]
pub enum LoggedEvent {
    Structure(StructureEvent),
    Gap(GapEvent),
    /// Only non-Wait decisions are logged.
    Decision(Decision),
    Plan(TradePlanEvent),
    Skipped { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub candle_index: u64,
    pub event: LoggedEvent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedInput {
    pub candle_index: u64,
    pub code: String,
    pub error: InputError,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    /// Plans that filled and closed.
    pub trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Closed exactly at entry (break-even stop).
    pub scratches: usize,
    /// Pending plans cancelled or expired without a fill.
    pub unfilled: usize,
    pub win_rate: f64,
    pub total_r: f64,
    pub average_r: f64,
}

impl BacktestSummary {
    pub fn from_plans(plans: &[TradePlan]) -> Self {
        let mut summary = BacktestSummary::default();
        for plan in plans {
            match plan.r_multiple() {
                Some(r) => {
                    summary.trades += 1;
                    summary.total_r += r;
                    if r > 0.0 {
                        summary.wins += 1;
                    } else if r < 0.0 {
                        summary.losses += 1;
                    } else {
                        summary.scratches += 1;
                    }
                }
                None => summary.unfilled += 1,
            }
        }
        if summary.trades > 0 {
            summary.win_rate = summary.wins as f64 / summary.trades as f64;
            summary.average_r = summary.total_r / summary.trades as f64;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub instrument: Instrument,
    pub strategy: String,
    pub config_fingerprint: String,
    pub candles_processed: u64,
    pub events: Vec<EventRecord>,
    pub rejected: Vec<RejectedInput>,
    pub closed_plans: Vec<TradePlan>,
    pub open_plan: Option<TradePlan>,
    pub skip_counts: BTreeMap<String, u64>,
    pub summary: BacktestSummary,
    /// BLAKE3 of the serialized event log; equal digests mean identical runs.
    pub digest: String,
}

pub fn run_backtest(
    instrument: &str,
    candles: &[Candle],
    config: &StrategyConfig,
) -> Result<BacktestResult, ConfigError> {
    let pipeline = Pipeline::new(instrument, Arc::new(config.clone()))?;
    Ok(run_pipeline(pipeline, candles, &mut NullExecutor))
}

/// Drive a prepared pipeline over `candles`, forwarding plan events.
pub fn run_pipeline(
    mut pipeline: Pipeline,
    candles: &[Candle],
    executor: &mut dyn PlanExecutor,
) -> BacktestResult {
    let mut events = Vec::new();
    let mut rejected = Vec::new();

    for candle in candles {
        match pipeline.push_candle(candle) {
            Ok(step) => {
                for event in &step.plan_events {
                    executor.on_event(pipeline.instrument(), event);
                }
                record_step(&mut events, step);
            }
            Err(error) => rejected.push(RejectedInput {
                candle_index: candle.index,
                code: error.code().to_string(),
                error,
            }),
        }
    }

    let closed_plans = pipeline.closed_plans().to_vec();
    let summary = BacktestSummary::from_plans(&closed_plans);
    let digest = event_log_digest(&events);
    info!(
        instrument = pipeline.instrument(),
        candles = pipeline.candles_processed(),
        rejected = rejected.len(),
        trades = summary.trades,
        total_r = summary.total_r,
        digest = %digest,
        "backtest finished"
    );

    BacktestResult {
        instrument: pipeline.instrument().to_string(),
        strategy: pipeline.config().name.clone(),
        config_fingerprint: pipeline.config().fingerprint(),
        candles_processed: pipeline.candles_processed(),
        events,
        rejected,
        open_plan: pipeline.active_plan().cloned(),
        closed_plans,
        skip_counts: pipeline.skip_counts().clone(),
        summary,
        digest,
    }
}

fn record_step(log: &mut Vec<EventRecord>, step: StepOutput) {
    let index = step.candle_index;
    let mut push = |event| {
        log.push(EventRecord {
            candle_index: index,
            event,
        })
    };
    for e in step.structure_events {
        push(LoggedEvent::Structure(e));
    }
    for e in step.gap_events {
        push(LoggedEvent::Gap(e));
    }
    if !step.decision.is_wait() {
        push(LoggedEvent::Decision(step.decision));
    }
    if let Some(reason) = step.skipped {
        push(LoggedEvent::Skipped {
            code: reason.code().to_string(),
        });
    }
    for e in step.plan_events {
        push(LoggedEvent::Plan(e));
    }
}

pub fn event_log_digest(events: &[EventRecord]) -> String {
    let json = serde_json::to_vec(events).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
