//! Executor boundary.
//!
//! The core pushes `TradePlanEvent`s out; nothing flows back into the
//! decision path, which keeps backtest and live runs identical.

use crate::domain::Instrument;
use crate::plan::TradePlanEvent;

pub trait PlanExecutor {
    fn on_event(&mut self, instrument: &str, event: &TradePlanEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExecutor;

impl PlanExecutor for NullExecutor {
    fn on_event(&mut self, _instrument: &str, _event: &TradePlanEvent) {}
}

/// Keeps every event in arrival order.
#[derive(Debug, Default, Clone)]
pub struct RecordingExecutor {
    pub events: Vec<(Instrument, TradePlanEvent)>,
}

impl PlanExecutor for RecordingExecutor {
    fn on_event(&mut self, instrument: &str, event: &TradePlanEvent) {
        self.events.push((instrument.to_string(), event.clone()));
    }
}
