//! Per-instrument pipeline: structure → gaps → signals → decision → plans.
//!
//! One candle in, one `StepOutput` out. Input is validated before any
//! component state changes, so a rejected candle leaves the pipeline
//! exactly as it was.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::StrategyConfig;
use crate::domain::{Candle, Instrument, SequenceGuard};
use crate::error::{ConfigError, InputError};
use crate::gaps::{GapDetector, GapEvent};
use crate::plan::{PlanContext, SizeAdvisor, SkipReason, TradePlan, TradePlanEvent, TradePlanManager};
use crate::signals::detectors::build_detectors;
use crate::signals::{
    AggregatorConfig, Decision, Detector, GapSignalDetector, Signal, SignalAggregator,
    StructureSignalDetector,
};
use crate::structure::{StructureEvent, StructureState, StructureTracker, SwingKind};

/// Everything one candle produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutput {
    pub candle_index: u64,
    pub structure_events: Vec<StructureEvent>,
    pub gap_events: Vec<GapEvent>,
    pub signals: Vec<Signal>,
    pub decision: Decision,
    pub plan_events: Vec<TradePlanEvent>,
    /// Set when a non-Wait decision did not produce a plan.
    pub skipped: Option<SkipReason>,
}

pub struct Pipeline {
    instrument: Instrument,
    config: Arc<StrategyConfig>,
    guard: SequenceGuard,
    structure: StructureSignalDetector,
    gaps: GapSignalDetector,
    /// Indicator and external detectors, stepped after structure and gaps.
    detectors: Vec<Box<dyn Detector>>,
    aggregator: SignalAggregator,
    plans: TradePlanManager,
    skip_counts: BTreeMap<String, u64>,
    candles_processed: u64,
}

impl Pipeline {
    /// Validates the configuration before building any component.
    pub fn new(instrument: impl Into<Instrument>, config: Arc<StrategyConfig>) -> Result<Self, ConfigError> {
        config.validate()?;
        let aggregator = config.aggregator_config()?;
        Ok(Self::with_aggregator(instrument.into(), config, aggregator))
    }

    /// Build from an already validated configuration.
    pub(crate) fn with_aggregator(
        instrument: Instrument,
        config: Arc<StrategyConfig>,
        aggregator: AggregatorConfig,
    ) -> Self {
        let detectors = build_detectors(&config.indicators, &aggregator);
        Self {
            instrument,
            guard: SequenceGuard::new(),
            structure: StructureSignalDetector::new(config.structure.swing_lookback),
            gaps: GapSignalDetector::new(config.gaps.clone()),
            detectors,
            aggregator: SignalAggregator::new(aggregator),
            plans: TradePlanManager::new(config.plan.clone()),
            skip_counts: BTreeMap::new(),
            candles_processed: 0,
            config,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SizeAdvisor>) -> Self {
        self.plans = self.plans.with_advisor(advisor);
        self
    }

    /// Register an extra detector (e.g. an external volume-profile source).
    pub fn with_detector(mut self, detector: Box<dyn Detector>) -> Self {
        self.detectors.push(detector);
        self
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn structure(&self) -> &StructureState {
        self.structure.tracker().state()
    }

    pub fn tracker(&self) -> &StructureTracker {
        self.structure.tracker()
    }

    pub fn gaps(&self) -> &GapDetector {
        self.gaps.registry()
    }

    pub fn active_plan(&self) -> Option<&TradePlan> {
        self.plans.active()
    }

    pub fn closed_plans(&self) -> &[TradePlan] {
        self.plans.closed()
    }

    /// Skipped decisions by reason code.
    pub fn skip_counts(&self) -> &BTreeMap<String, u64> {
        &self.skip_counts
    }

    pub fn candles_processed(&self) -> u64 {
        self.candles_processed
    }

    pub fn last_index(&self) -> Option<u64> {
        self.guard.last()
    }

    pub fn push_candle(&mut self, candle: &Candle) -> Result<StepOutput, InputError> {
        if let Err(e) = self.guard.check(candle) {
            warn!(
                instrument = %self.instrument,
                index = candle.index,
                code = e.code(),
                error = %e,
                "candle rejected"
            );
            return Err(e);
        }

        let index = candle.index;
        let mut signals = self.structure.on_candle(candle);
        signals.extend(self.gaps.on_candle(candle));
        for detector in &mut self.detectors {
            signals.extend(detector.on_candle(candle));
        }
        let structure_events = self.structure.take_events();
        let gap_events = self.gaps.take_events();
        let tracker = self.structure.tracker();
        let decision = self.aggregator.evaluate(&signals);

        let ctx = PlanContext {
            candle,
            structure_events: &structure_events,
            gap_events: &gap_events,
            last_choch: tracker.last_choch().copied(),
            last_swing_high: tracker.last_swing(SwingKind::High).map(|s| s.price),
            last_swing_low: tracker.last_swing(SwingKind::Low).map(|s| s.price),
            open_gaps: self.gaps.registry().open_gaps(),
        };

        let mut plan_events = self.plans.manage(&ctx);
        let skipped = match self.plans.on_decision(&decision, &ctx) {
            Ok(events) => {
                plan_events.extend(events);
                None
            }
            Err(reason) => {
                warn!(
                    instrument = %self.instrument,
                    index,
                    code = reason.code(),
                    direction = ?decision.direction,
                    score = decision.score,
                    "decision skipped"
                );
                *self.skip_counts.entry(reason.code().to_string()).or_default() += 1;
                Some(reason)
            }
        };

        if !decision.is_wait() {
            debug!(
                instrument = %self.instrument,
                index,
                direction = ?decision.direction,
                long = decision.long_score,
                short = decision.short_score,
                "decision"
            );
        }

        self.guard.commit(index);
        self.candles_processed += 1;

        Ok(StepOutput {
            candle_index: index,
            structure_events,
            gap_events,
            signals,
            decision,
            plan_events,
            skipped,
        })
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("instrument", &self.instrument)
            .field("last_index", &self.guard.last())
            .field("structure", self.structure.tracker().state())
            .field("active_plan", &self.plans.active())
            .field("detectors", &self.detectors.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_candle;

    fn pipeline() -> Pipeline {
        Pipeline::new("TEST", Arc::new(StrategyConfig::default())).unwrap()
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let mut config = StrategyConfig::default();
        config.plan.reward_multiple = -1.0;
        let err = Pipeline::new("TEST", Arc::new(config)).unwrap_err();
        assert_eq!(err, ConfigError::NegativeRiskMultiple(-1.0));
    }

    #[test]
    fn rejected_candle_leaves_state_unchanged() {
        let mut p = pipeline();
        p.push_candle(&test_candle(1, 100.0, 101.0, 99.0, 100.5)).unwrap();
        p.push_candle(&test_candle(2, 100.5, 102.0, 100.0, 101.5)).unwrap();

        let dup = p.push_candle(&test_candle(2, 100.5, 102.0, 100.0, 101.5)).unwrap_err();
        assert_eq!(dup.code(), "duplicate_candle");
        let old = p.push_candle(&test_candle(1, 100.5, 102.0, 100.0, 101.5)).unwrap_err();
        assert_eq!(old.code(), "out_of_order");
        let bad = p.push_candle(&test_candle(3, 100.0, 99.0, 101.0, 100.0)).unwrap_err();
        assert_eq!(bad.code(), "malformed_candle");

        assert_eq!(p.last_index(), Some(2));
        assert_eq!(p.candles_processed(), 2);
        // The rejected index 3 is still accepted afterwards.
        assert!(p.push_candle(&test_candle(3, 101.5, 103.0, 101.0, 102.5)).is_ok());
    }

    #[test]
    fn ranging_market_waits() {
        let mut p = pipeline();
        let out = p.push_candle(&test_candle(0, 100.0, 101.0, 99.0, 100.0)).unwrap();
        assert!(out.decision.is_wait());
        assert!(out.signals.is_empty());
        assert!(out.skipped.is_none());
    }
}
