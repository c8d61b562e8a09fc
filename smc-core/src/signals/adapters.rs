//! Turn structure and gap events into aggregator signals.
//!
//! Structure:
//! - CHoCH: strength 1.0 in the new trend direction
//! - BOS: 0.5 + 0.25 per consecutive BOS, capped at 1.0
//! - otherwise, while trending: a standing bias of `TREND_BIAS_STRENGTH`
//!
//! Gaps signal once, on confirmation, with strength equal to the gap height
//! relative to the displacement candle's range.
//!
//! `StructureSignalDetector` and `GapSignalDetector` own their component and
//! plug into the detector set like any indicator. Each keeps the events of
//! its latest step for the plan manager.

use tracing::warn;

use super::{Detector, Signal, SourceType};
use crate::config::GapSettings;
use crate::domain::Candle;
use crate::gaps::{GapDetector, GapEvent};
use crate::structure::{StructureEvent, StructureState, StructureTracker};

/// Strength of the standing trend-bias signal on candles without a break.
pub const TREND_BIAS_STRENGTH: f64 = 0.4;

pub fn structure_signals(
    events: &[StructureEvent],
    state: &StructureState,
    candle_index: u64,
) -> Vec<Signal> {
    let mut signals: Vec<Signal> = events
        .iter()
        .filter_map(|event| match *event {
            StructureEvent::Choch { direction, .. } => Some(Signal::new(
                SourceType::Structure,
                direction,
                1.0,
                candle_index,
            )),
            StructureEvent::Bos {
                direction,
                bos_count,
                ..
            } => Some(Signal::new(
                SourceType::Structure,
                direction,
                (0.5 + 0.25 * bos_count as f64).min(1.0),
                candle_index,
            )),
            StructureEvent::SwingConfirmed(_) => None,
        })
        .collect();

    if signals.is_empty() {
        if let Some(direction) = state.trend.direction() {
            signals.push(Signal::new(
                SourceType::Structure,
                direction,
                TREND_BIAS_STRENGTH,
                candle_index,
            ));
        }
    }
    signals
}

pub fn gap_signals(events: &[GapEvent], candle_index: u64) -> Vec<Signal> {
    events
        .iter()
        .filter_map(|event| match event {
            GapEvent::Confirmed(gap) => Some(Signal::new(
                SourceType::Gap,
                gap.direction.trade_direction(),
                gap.strength(),
                candle_index,
            )),
            _ => None,
        })
        .collect()
}

/// Structure tracker as a signal source.
#[derive(Debug, Clone)]
pub struct StructureSignalDetector {
    tracker: StructureTracker,
    events: Vec<StructureEvent>,
}

impl StructureSignalDetector {
    pub fn new(swing_lookback: usize) -> Self {
        Self {
            tracker: StructureTracker::new(swing_lookback),
            events: Vec::new(),
        }
    }

    pub fn tracker(&self) -> &StructureTracker {
        &self.tracker
    }

    /// Events of the latest step.
    pub fn events(&self) -> &[StructureEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<StructureEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Detector for StructureSignalDetector {
    fn source(&self) -> SourceType {
        SourceType::Structure
    }

    fn name(&self) -> &str {
        "structure"
    }

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal> {
        self.events = match self.tracker.on_candle(candle) {
            Ok(events) => events,
            Err(e) => {
                warn!(index = candle.index, error = %e, "structure tracker rejected candle");
                Vec::new()
            }
        };
        structure_signals(&self.events, self.tracker.state(), candle.index)
    }
}

/// Gap registry as a signal source.
#[derive(Debug, Clone)]
pub struct GapSignalDetector {
    registry: GapDetector,
    events: Vec<GapEvent>,
}

impl GapSignalDetector {
    pub fn new(settings: GapSettings) -> Self {
        Self {
            registry: GapDetector::new(settings),
            events: Vec::new(),
        }
    }

    pub fn registry(&self) -> &GapDetector {
        &self.registry
    }

    /// Events of the latest step.
    pub fn events(&self) -> &[GapEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<GapEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Detector for GapSignalDetector {
    fn source(&self) -> SourceType {
        SourceType::Gap
    }

    fn name(&self) -> &str {
        "fair_value_gap"
    }

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal> {
        self.events = match self.registry.on_candle(candle) {
            Ok(events) => events,
            Err(e) => {
                warn!(index = candle.index, error = %e, "gap detector rejected candle");
                Vec::new()
            }
        };
        gap_signals(&self.events, candle.index)
    }
}
