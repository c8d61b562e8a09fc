//! Trade plan manager: one plan lifecycle per instrument.
//!
//! Each step runs `manage` (exits, pending fills, break-even, trailing)
//! before `on_decision` (entries). A plan closed during a step blocks new
//! entries until the next candle.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::advisory::{resolve_multiplier, AdvisoryContext, SizeAdvisor};
use super::ratchet::RatchetState;
use super::trade_plan::{Adjustment, ExitReason, PlanState, TradePlan, TradePlanEvent};
use crate::config::{EntryMode, PlanSettings};
use crate::domain::{Candle, Direction, FvgId, IdSequence, PlanId};
use crate::error::PlanError;
use crate::gaps::{Fvg, FvgDirection, GapEvent};
use crate::signals::Decision;
use crate::structure::{ChochRecord, StructureEvent, SwingKind};

/// Read-only view of one pipeline step, handed to the manager.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub candle: &'a Candle,
    pub structure_events: &'a [StructureEvent],
    pub gap_events: &'a [GapEvent],
    pub last_choch: Option<ChochRecord>,
    /// Price of the most recent confirmed swing high.
    pub last_swing_high: Option<f64>,
    /// Price of the most recent confirmed swing low.
    pub last_swing_low: Option<f64>,
    pub open_gaps: &'a [Fvg],
}

impl PlanContext<'_> {
    fn choch_against(&self, direction: Direction) -> bool {
        self.structure_events.iter().any(
            |e| matches!(e, StructureEvent::Choch { direction: d, .. } if *d == direction.opposite()),
        )
    }

    fn bos_with(&self, direction: Direction) -> bool {
        self.structure_events
            .iter()
            .any(|e| matches!(e, StructureEvent::Bos { direction: d, .. } if *d == direction))
    }
}

/// Why a non-Wait decision did not produce a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PositionActive { plan: PlanId },
    ClosedThisStep,
    Plan(PlanError),
}

impl SkipReason {
    pub fn code(&self) -> &'static str {
        match self {
            SkipReason::PositionActive { .. } => "position_active",
            SkipReason::ClosedThisStep => "closed_this_step",
            SkipReason::Plan(e) => e.code(),
        }
    }
}

impl From<PlanError> for SkipReason {
    fn from(e: PlanError) -> Self {
        SkipReason::Plan(e)
    }
}

#[derive(Debug, Clone)]
struct ActivePlan {
    plan: TradePlan,
    ratchet: RatchetState,
}

struct Draft {
    entry: f64,
    stop: f64,
    source_gap: Option<FvgId>,
}

pub struct TradePlanManager {
    settings: PlanSettings,
    ids: IdSequence,
    active: Option<ActivePlan>,
    closed: Vec<TradePlan>,
    closed_this_step: bool,
    last_used_gap: Option<FvgId>,
    advisor: Option<Arc<dyn SizeAdvisor>>,
}

impl TradePlanManager {
    pub fn new(settings: PlanSettings) -> Self {
        Self {
            settings,
            ids: IdSequence::default(),
            active: None,
            closed: Vec::new(),
            closed_this_step: false,
            last_used_gap: None,
            advisor: None,
        }
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SizeAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// The plan currently Pending, Open or BreakEven.
    pub fn active(&self) -> Option<&TradePlan> {
        self.active.as_ref().map(|a| &a.plan)
    }

    pub fn closed(&self) -> &[TradePlan] {
        &self.closed
    }

    /// Exit and maintenance checks for the live plan.
    pub fn manage(&mut self, ctx: &PlanContext<'_>) -> Vec<TradePlanEvent> {
        self.closed_this_step = false;
        let Some(mut active) = self.active.take() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        match active.plan.state {
            PlanState::Pending => self.manage_pending(&mut active, ctx, &mut events),
            PlanState::Open | PlanState::BreakEven => {
                self.manage_live(&mut active, ctx, &mut events)
            }
            PlanState::Closed => {}
        }

        if active.plan.is_active() {
            self.active = Some(active);
        } else {
            info!(
                plan = %active.plan.id,
                index = ctx.candle.index,
                reason = ?active.plan.exit_reason,
                r = ?active.plan.r_multiple(),
                "trade plan closed"
            );
            self.closed_this_step = true;
            self.closed.push(active.plan);
        }
        events
    }

    /// Turn a non-Wait decision into a new plan.
    pub fn on_decision(
        &mut self,
        decision: &Decision,
        ctx: &PlanContext<'_>,
    ) -> Result<Vec<TradePlanEvent>, SkipReason> {
        let Some(direction) = decision.direction.direction() else {
            return Ok(Vec::new());
        };
        if self.closed_this_step {
            return Err(SkipReason::ClosedThisStep);
        }
        if let Some(active) = &self.active {
            return Err(SkipReason::PositionActive {
                plan: active.plan.id,
            });
        }

        let candle = ctx.candle;
        let draft = match self.settings.entry_mode {
            EntryMode::StructureGap => self.draft_structure_gap(direction, ctx)?,
            EntryMode::Close => self.draft_at_close(direction, ctx)?,
        };

        let risk = (draft.entry - draft.stop) * direction.sign();
        if !(risk > 0.0 && risk.is_finite()) {
            return Err(PlanError::DegenerateStop {
                entry: draft.entry,
                stop: draft.stop,
            }
            .into());
        }
        let take_profit = draft.entry + direction.sign() * self.settings.reward_multiple * risk;
        let base_size = self.settings.equity * self.settings.risk_fraction / risk;
        let advisory = AdvisoryContext {
            direction,
            entry_price: draft.entry,
            stop_loss: draft.stop,
            take_profit,
            base_size,
            candle_index: candle.index,
        };
        let multiplier = resolve_multiplier(
            self.advisor.as_deref(),
            &advisory,
            self.settings.advisory_min,
            self.settings.advisory_max,
        );

        let (state, filled_at) = match self.settings.entry_mode {
            EntryMode::StructureGap => (PlanState::Pending, None),
            EntryMode::Close => (PlanState::Open, Some(candle.index)),
        };
        let plan = TradePlan {
            id: PlanId(self.ids.next_id()),
            direction,
            entry_price: draft.entry,
            stop_loss: draft.stop,
            initial_stop: draft.stop,
            take_profit,
            size: base_size * multiplier,
            state,
            opened_at_candle_index: candle.index,
            filled_at_candle_index: filled_at,
            closed_at_candle_index: None,
            exit_reason: None,
            exit_price: None,
            source_gap: draft.source_gap,
        };
        if draft.source_gap.is_some() {
            self.last_used_gap = draft.source_gap;
        }

        info!(
            plan = %plan.id,
            index = candle.index,
            direction = ?direction,
            entry = plan.entry_price,
            stop = plan.stop_loss,
            take_profit = plan.take_profit,
            size = plan.size,
            "trade plan opened"
        );
        self.active = Some(ActivePlan {
            ratchet: RatchetState::new(direction, plan.stop_loss),
            plan: plan.clone(),
        });
        Ok(vec![TradePlanEvent::Opened { plan }])
    }

    fn buffer(&self, level: f64) -> f64 {
        level.abs() * self.settings.stop_buffer_bps / 10_000.0
    }

    /// Limit entry at the midpoint of the newest tradable gap whose
    /// displacement candle sits within `correlation_window` of the CHoCH.
    fn draft_structure_gap(
        &self,
        direction: Direction,
        ctx: &PlanContext<'_>,
    ) -> Result<Draft, PlanError> {
        let choch = ctx
            .last_choch
            .filter(|c| c.direction == direction)
            .ok_or(PlanError::NoChoch)?;

        let wanted = FvgDirection::from_trade_direction(direction);
        let window = self.settings.correlation_window;
        let gap = ctx
            .open_gaps
            .iter()
            .rev()
            .filter(|g| g.direction == wanted && g.is_tradable())
            .filter(|g| Some(g.id) != self.last_used_gap)
            .find(|g| g.displacement_candle_index.abs_diff(choch.candle_index) <= window)
            .ok_or(PlanError::NoCorrelatedGap {
                choch_index: choch.candle_index,
            })?;

        let stop = match direction {
            Direction::Long => gap.displacement_low - self.buffer(gap.displacement_low),
            Direction::Short => gap.displacement_high + self.buffer(gap.displacement_high),
        };
        Ok(Draft {
            entry: gap.midpoint,
            stop,
            source_gap: Some(gap.id),
        })
    }

    /// Market entry at the close, stop beyond the last opposite swing.
    fn draft_at_close(&self, direction: Direction, ctx: &PlanContext<'_>) -> Result<Draft, PlanError> {
        let stop = match direction {
            Direction::Long => {
                let low = ctx.last_swing_low.ok_or(PlanError::NoStructuralStop)?;
                low - self.buffer(low)
            }
            Direction::Short => {
                let high = ctx.last_swing_high.ok_or(PlanError::NoStructuralStop)?;
                high + self.buffer(high)
            }
        };
        Ok(Draft {
            entry: ctx.candle.close,
            stop,
            source_gap: None,
        })
    }

    fn manage_pending(
        &self,
        active: &mut ActivePlan,
        ctx: &PlanContext<'_>,
        events: &mut Vec<TradePlanEvent>,
    ) {
        let candle = ctx.candle;
        let plan = &mut active.plan;

        if self.settings.exit_on_opposite_choch && ctx.choch_against(plan.direction) {
            close(plan, candle.index, ExitReason::Cancelled, None, events);
            return;
        }

        let touched = match plan.direction {
            Direction::Long => candle.low <= plan.entry_price,
            Direction::Short => candle.high >= plan.entry_price,
        };
        if touched {
            // A candle opening through the limit fills at the better open.
            plan.entry_price = match plan.direction {
                Direction::Long => candle.open.min(plan.entry_price),
                Direction::Short => candle.open.max(plan.entry_price),
            };
            plan.state = PlanState::Open;
            plan.filled_at_candle_index = Some(candle.index);
            debug!(plan = %plan.id, index = candle.index, price = plan.entry_price, "pending entry filled");
            events.push(TradePlanEvent::Adjusted {
                plan: plan.clone(),
                adjustment: Adjustment::Filled {
                    price: plan.entry_price,
                },
            });
            // The fill candle's path is unknown; only the stop is checked.
            if let Some(price) = stop_hit(plan, candle) {
                close(plan, candle.index, ExitReason::StopLoss, Some(price), events);
            }
            return;
        }

        let target_reached = match plan.direction {
            Direction::Long => candle.high >= plan.take_profit,
            Direction::Short => candle.low <= plan.take_profit,
        };
        if target_reached {
            close(plan, candle.index, ExitReason::Cancelled, None, events);
        } else if candle.index.saturating_sub(plan.opened_at_candle_index)
            >= self.settings.pending_max_candles
        {
            close(plan, candle.index, ExitReason::Expired, None, events);
        }
    }

    /// Exit checks for a filled plan, then stop management.
    ///
    /// Stop-loss is checked before take-profit, then an opposite CHoCH.
    /// Break-even promotion happens on the first BOS in the trade's
    /// direction whose candle closes in profit. A BOS closing at or below
    /// the entry (above it for shorts) leaves the plan `Open` until a later
    /// BOS qualifies.
    fn manage_live(
        &self,
        active: &mut ActivePlan,
        ctx: &PlanContext<'_>,
        events: &mut Vec<TradePlanEvent>,
    ) {
        let candle = ctx.candle;
        let direction = active.plan.direction;

        if let Some(price) = stop_hit(&active.plan, candle) {
            close(&mut active.plan, candle.index, ExitReason::StopLoss, Some(price), events);
            return;
        }
        let target_hit = match direction {
            Direction::Long => candle.high >= active.plan.take_profit,
            Direction::Short => candle.low <= active.plan.take_profit,
        };
        if target_hit {
            let price = active.plan.take_profit;
            close(&mut active.plan, candle.index, ExitReason::TakeProfit, Some(price), events);
            return;
        }
        if self.settings.exit_on_opposite_choch && ctx.choch_against(direction) {
            close(
                &mut active.plan,
                candle.index,
                ExitReason::StructuralInvalidation,
                Some(candle.close),
                events,
            );
            return;
        }

        if active.plan.state == PlanState::BreakEven && self.settings.trailing {
            self.trail(active, ctx, events);
        }

        if active.plan.state == PlanState::Open && self.settings.break_even && ctx.bos_with(direction) {
            let entry = active.plan.entry_price;
            let in_profit = (candle.close - entry) * direction.sign() > 0.0;
            if in_profit {
                let from = active.plan.stop_loss;
                let to = active.ratchet.apply(entry);
                active.plan.stop_loss = to;
                active.plan.state = PlanState::BreakEven;
                info!(plan = %active.plan.id, index = candle.index, stop = to, "promoted to break-even");
                events.push(TradePlanEvent::Adjusted {
                    plan: active.plan.clone(),
                    adjustment: Adjustment::BreakEven { from, to },
                });
            }
        }
    }

    /// Ratchet the stop behind new swing points and new same-direction gaps.
    fn trail(&self, active: &mut ActivePlan, ctx: &PlanContext<'_>, events: &mut Vec<TradePlanEvent>) {
        let direction = active.plan.direction;
        let close_price = ctx.candle.close;

        let swing_levels = ctx.structure_events.iter().filter_map(|e| match (e, direction) {
            (StructureEvent::SwingConfirmed(s), Direction::Long) if s.kind == SwingKind::Low => {
                Some(s.price - self.buffer(s.price))
            }
            (StructureEvent::SwingConfirmed(s), Direction::Short) if s.kind == SwingKind::High => {
                Some(s.price + self.buffer(s.price))
            }
            _ => None,
        });
        let wanted = FvgDirection::from_trade_direction(direction);
        let gap_levels = ctx.gap_events.iter().filter_map(|e| match e {
            GapEvent::Confirmed(g) if g.direction == wanted => Some(match direction {
                Direction::Long => g.bottom - self.buffer(g.bottom),
                Direction::Short => g.top + self.buffer(g.top),
            }),
            _ => None,
        });

        // Candidates must stay on the protective side of the close.
        let best = swing_levels
            .chain(gap_levels)
            .filter(|&level| (close_price - level) * direction.sign() > 0.0)
            .filter(|&level| active.ratchet.tightens(level))
            .reduce(|a, b| match direction {
                Direction::Long => a.max(b),
                Direction::Short => a.min(b),
            });

        if let Some(level) = best {
            let from = active.plan.stop_loss;
            let to = active.ratchet.apply(level);
            active.plan.stop_loss = to;
            debug!(plan = %active.plan.id, index = ctx.candle.index, from, to, "stop trailed");
            events.push(TradePlanEvent::Adjusted {
                plan: active.plan.clone(),
                adjustment: Adjustment::Trailed { from, to },
            });
        }
    }
}

impl std::fmt::Debug for TradePlanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradePlanManager")
            .field("active", &self.active())
            .field("closed", &self.closed.len())
            .field("advisor", &self.advisor.is_some())
            .finish()
    }
}

/// Stop fill price if the candle breaches the stop. A gap through the stop
/// fills at the open.
fn stop_hit(plan: &TradePlan, candle: &Candle) -> Option<f64> {
    match plan.direction {
        Direction::Long if candle.open <= plan.stop_loss => Some(candle.open),
        Direction::Long if candle.low <= plan.stop_loss => Some(plan.stop_loss),
        Direction::Short if candle.open >= plan.stop_loss => Some(candle.open),
        Direction::Short if candle.high >= plan.stop_loss => Some(plan.stop_loss),
        _ => None,
    }
}

fn close(
    plan: &mut TradePlan,
    index: u64,
    reason: ExitReason,
    price: Option<f64>,
    events: &mut Vec<TradePlanEvent>,
) {
    plan.state = PlanState::Closed;
    plan.closed_at_candle_index = Some(index);
    plan.exit_reason = Some(reason);
    plan.exit_price = price;
    events.push(TradePlanEvent::Closed { plan: plan.clone() });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_candle;
    use crate::plan::FixedMultiplier;
    use crate::signals::DecisionDirection;
    use crate::structure::{SwingLabel, SwingPoint};

    fn decision(direction: DecisionDirection) -> Decision {
        Decision {
            direction,
            score: 1.0,
            long_score: 1.0,
            short_score: 0.0,
            contributing: 1,
        }
    }

    fn close_mode() -> PlanSettings {
        PlanSettings {
            entry_mode: EntryMode::Close,
            stop_buffer_bps: 0.0,
            reward_multiple: 2.0,
            ..PlanSettings::default()
        }
    }

    fn ctx<'a>(candle: &'a Candle, events: &'a [StructureEvent]) -> PlanContext<'a> {
        PlanContext {
            candle,
            structure_events: events,
            gap_events: &[],
            last_choch: None,
            last_swing_high: Some(110.0),
            last_swing_low: Some(95.0),
            open_gaps: &[],
        }
    }

    /// Long at 100, stop 95, target 110.
    fn open_long(mgr: &mut TradePlanManager) -> TradePlan {
        let candle = test_candle(10, 99.0, 101.0, 98.0, 100.0);
        let events = mgr
            .on_decision(&decision(DecisionDirection::Long), &ctx(&candle, &[]))
            .unwrap();
        events[0].plan().clone()
    }

    fn bos_long(index: u64) -> StructureEvent {
        StructureEvent::Bos {
            direction: Direction::Long,
            level: 104.0,
            candle_index: index,
            bos_count: 1,
        }
    }

    #[test]
    fn close_entry_levels_and_size() {
        let mut mgr = TradePlanManager::new(close_mode());
        let plan = open_long(&mut mgr);
        assert_eq!(plan.state, PlanState::Open);
        assert_eq!(plan.entry_price, 100.0);
        assert_eq!(plan.stop_loss, 95.0);
        assert_eq!(plan.take_profit, 110.0);
        // 10_000 * 1% / 5
        assert_eq!(plan.size, 20.0);
    }

    #[test]
    fn advisor_scales_size_only() {
        let mut mgr = TradePlanManager::new(close_mode()).with_advisor(Arc::new(FixedMultiplier(3.0)));
        let plan = open_long(&mut mgr);
        assert_eq!(plan.size, 40.0);
        assert_eq!(plan.stop_loss, 95.0);
        assert_eq!(plan.direction, Direction::Long);
    }

    #[test]
    fn stop_wins_when_both_levels_inside_candle() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 100.0, 111.0, 94.0, 100.0);
        let events = mgr.manage(&ctx(&candle, &[]));
        let plan = events[0].plan();
        assert_eq!(plan.exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(plan.exit_price, Some(95.0));
        assert_eq!(plan.r_multiple(), Some(-1.0));
    }

    #[test]
    fn gap_through_stop_fills_at_open() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 93.0, 94.0, 90.0, 91.0);
        let events = mgr.manage(&ctx(&candle, &[]));
        assert_eq!(events[0].plan().exit_price, Some(93.0));
    }

    #[test]
    fn take_profit_closes() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 105.0, 112.0, 104.0, 111.0);
        let events = mgr.manage(&ctx(&candle, &[]));
        assert_eq!(events[0].plan().exit_reason, Some(ExitReason::TakeProfit));
        assert_eq!(events[0].plan().r_multiple(), Some(2.0));
        assert!(mgr.active().is_none());
        assert_eq!(mgr.closed().len(), 1);
    }

    #[test]
    fn no_reentry_on_closing_step() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 105.0, 112.0, 104.0, 111.0);
        let c = ctx(&candle, &[]);
        mgr.manage(&c);
        let err = mgr.on_decision(&decision(DecisionDirection::Long), &c).unwrap_err();
        assert_eq!(err.code(), "closed_this_step");

        let next = test_candle(12, 111.0, 112.0, 110.0, 111.0);
        let c = ctx(&next, &[]);
        mgr.manage(&c);
        assert!(mgr.on_decision(&decision(DecisionDirection::Long), &c).is_ok());
    }

    #[test]
    fn active_plan_blocks_entries() {
        let mut mgr = TradePlanManager::new(close_mode());
        let plan = open_long(&mut mgr);
        let candle = test_candle(11, 100.0, 101.0, 99.0, 100.0);
        let c = ctx(&candle, &[]);
        mgr.manage(&c);
        let err = mgr.on_decision(&decision(DecisionDirection::Short), &c).unwrap_err();
        assert_eq!(err, SkipReason::PositionActive { plan: plan.id });
    }

    #[test]
    fn break_even_then_trailing_is_monotonic() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);

        let candle = test_candle(11, 100.0, 105.0, 99.0, 104.5);
        let bos = [bos_long(11)];
        let events = mgr.manage(&ctx(&candle, &bos));
        assert_eq!(
            events[0],
            TradePlanEvent::Adjusted {
                plan: mgr.active().unwrap().clone(),
                adjustment: Adjustment::BreakEven { from: 95.0, to: 100.0 },
            }
        );
        assert_eq!(mgr.active().unwrap().state, PlanState::BreakEven);

        let swing = |price, index| {
            StructureEvent::SwingConfirmed(SwingPoint {
                candle_index: index,
                price,
                kind: SwingKind::Low,
                label: SwingLabel::HigherLow,
                confirmed_at: index + 3,
            })
        };
        let candle = test_candle(12, 104.0, 106.0, 103.0, 105.0);
        let higher = [swing(102.0, 9)];
        mgr.manage(&ctx(&candle, &higher));
        assert_eq!(mgr.active().unwrap().stop_loss, 102.0);

        // A lower swing never loosens the stop.
        let candle = test_candle(13, 105.0, 106.0, 103.0, 105.0);
        let lower = [swing(98.0, 10)];
        let events = mgr.manage(&ctx(&candle, &lower));
        assert!(events.is_empty());
        assert_eq!(mgr.active().unwrap().stop_loss, 102.0);
    }

    #[test]
    fn bos_below_entry_does_not_promote() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 100.0, 101.0, 97.0, 99.0);
        let bos = [bos_long(11)];
        assert!(mgr.manage(&ctx(&candle, &bos)).is_empty());
        assert_eq!(mgr.active().unwrap().state, PlanState::Open);
    }

    #[test]
    fn opposite_choch_invalidates_at_close() {
        let mut mgr = TradePlanManager::new(close_mode());
        open_long(&mut mgr);
        let candle = test_candle(11, 100.0, 101.0, 96.0, 97.0);
        let choch = [StructureEvent::Choch {
            direction: Direction::Short,
            level: 97.5,
            candle_index: 11,
        }];
        let events = mgr.manage(&ctx(&candle, &choch));
        let plan = events[0].plan();
        assert_eq!(plan.exit_reason, Some(ExitReason::StructuralInvalidation));
        assert_eq!(plan.exit_price, Some(97.0));
    }

    #[test]
    fn missing_swing_is_no_structural_stop() {
        let mut mgr = TradePlanManager::new(close_mode());
        let candle = test_candle(5, 99.0, 101.0, 98.0, 100.0);
        let mut c = ctx(&candle, &[]);
        c.last_swing_low = None;
        let err = mgr.on_decision(&decision(DecisionDirection::Long), &c).unwrap_err();
        assert_eq!(err.code(), "no_structural_stop");
    }

    #[test]
    fn stop_above_close_is_degenerate() {
        let mut mgr = TradePlanManager::new(close_mode());
        let candle = test_candle(5, 99.0, 101.0, 94.0, 95.0);
        let err = mgr
            .on_decision(&decision(DecisionDirection::Long), &ctx(&candle, &[]))
            .unwrap_err();
        assert_eq!(err.code(), "degenerate_stop");
        assert!(mgr.active().is_none());
    }

    mod structure_gap {
        use super::*;

        fn gap() -> Fvg {
            Fvg {
                id: FvgId(1),
                direction: FvgDirection::Bullish,
                top: 104.0,
                bottom: 100.0,
                midpoint: 102.0,
                creation_candle_index: 21,
                displacement_candle_index: 20,
                displacement_high: 105.0,
                displacement_low: 99.0,
                filled_at: None,
                invalidated: false,
                confirmed: true,
                expired_at: None,
            }
        }

        fn settings() -> PlanSettings {
            PlanSettings {
                stop_buffer_bps: 0.0,
                reward_multiple: 4.0,
                pending_max_candles: 3,
                ..PlanSettings::default()
            }
        }

        fn gap_ctx<'a>(candle: &'a Candle, gaps: &'a [Fvg], choch_index: u64) -> PlanContext<'a> {
            PlanContext {
                candle,
                structure_events: &[],
                gap_events: &[],
                last_choch: Some(ChochRecord {
                    direction: Direction::Long,
                    level: 103.0,
                    candle_index: choch_index,
                }),
                last_swing_high: None,
                last_swing_low: None,
                open_gaps: gaps,
            }
        }

        fn open_pending(mgr: &mut TradePlanManager, gaps: &[Fvg]) -> TradePlan {
            let candle = test_candle(22, 104.5, 106.0, 104.2, 105.5);
            let events = mgr
                .on_decision(&decision(DecisionDirection::Long), &gap_ctx(&candle, gaps, 20))
                .unwrap();
            events[0].plan().clone()
        }

        #[test]
        fn limit_entry_at_gap_midpoint() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            let plan = open_pending(&mut mgr, &gaps);
            assert_eq!(plan.state, PlanState::Pending);
            assert_eq!(plan.entry_price, 102.0);
            assert_eq!(plan.stop_loss, 99.0);
            assert_eq!(plan.take_profit, 114.0);
            assert_eq!(plan.source_gap, Some(FvgId(1)));
        }

        #[test]
        fn uncorrelated_gap_is_skipped() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            let candle = test_candle(22, 104.5, 106.0, 104.2, 105.5);
            let err = mgr
                .on_decision(&decision(DecisionDirection::Long), &gap_ctx(&candle, &gaps, 15))
                .unwrap_err();
            assert_eq!(err, SkipReason::Plan(PlanError::NoCorrelatedGap { choch_index: 15 }));
        }

        #[test]
        fn invalidated_gap_never_used() {
            let mut invalid = gap();
            invalid.invalidated = true;
            let gaps = [invalid];
            let mut mgr = TradePlanManager::new(settings());
            let candle = test_candle(22, 104.5, 106.0, 104.2, 105.5);
            let err = mgr
                .on_decision(&decision(DecisionDirection::Long), &gap_ctx(&candle, &gaps, 20))
                .unwrap_err();
            assert_eq!(err.code(), "no_correlated_gap");
        }

        #[test]
        fn short_decision_needs_short_choch() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            let candle = test_candle(22, 104.5, 106.0, 104.2, 105.5);
            let err = mgr
                .on_decision(&decision(DecisionDirection::Short), &gap_ctx(&candle, &gaps, 20))
                .unwrap_err();
            assert_eq!(err.code(), "no_choch");
        }

        #[test]
        fn pending_fills_when_price_returns() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            let candle = test_candle(23, 104.0, 104.5, 101.5, 103.0);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            assert_eq!(events.len(), 1);
            assert!(matches!(
                events[0],
                TradePlanEvent::Adjusted {
                    adjustment: Adjustment::Filled { price },
                    ..
                } if price == 102.0
            ));
            let plan = mgr.active().unwrap();
            assert_eq!(plan.state, PlanState::Open);
            assert_eq!(plan.filled_at_candle_index, Some(23));
        }

        #[test]
        fn gap_below_limit_fills_at_open() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            let candle = test_candle(23, 101.0, 103.0, 100.5, 102.5);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            assert!(matches!(
                events[0],
                TradePlanEvent::Adjusted {
                    adjustment: Adjustment::Filled { price },
                    ..
                } if price == 101.0
            ));
            let plan = mgr.active().unwrap();
            assert_eq!(plan.entry_price, 101.0);
            assert_eq!(plan.initial_risk(), 2.0);

            let candle = test_candle(24, 110.0, 114.5, 109.0, 114.0);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            assert_eq!(events[0].plan().exit_reason, Some(ExitReason::TakeProfit));
            assert_eq!(events[0].plan().r_multiple(), Some(6.5));
        }

        #[test]
        fn fill_candle_checks_stop() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            let candle = test_candle(23, 104.0, 104.5, 98.0, 99.5);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            assert_eq!(events.len(), 2);
            assert_eq!(events[1].plan().exit_reason, Some(ExitReason::StopLoss));
            assert_eq!(events[1].plan().r_multiple(), Some(-1.0));
        }

        #[test]
        fn target_before_fill_cancels() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            let candle = test_candle(23, 106.0, 115.0, 105.0, 114.5);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            let plan = events[0].plan();
            assert_eq!(plan.exit_reason, Some(ExitReason::Cancelled));
            assert_eq!(plan.r_multiple(), None);
        }

        #[test]
        fn pending_expires() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            for index in 23..25 {
                let candle = test_candle(index, 105.0, 106.0, 104.0, 105.0);
                assert!(mgr.manage(&gap_ctx(&candle, &gaps, 20)).is_empty());
            }
            let candle = test_candle(25, 105.0, 106.0, 104.0, 105.0);
            let events = mgr.manage(&gap_ctx(&candle, &gaps, 20));
            assert_eq!(events[0].plan().exit_reason, Some(ExitReason::Expired));
        }

        #[test]
        fn used_gap_is_not_reused() {
            let gaps = [gap()];
            let mut mgr = TradePlanManager::new(settings());
            open_pending(&mut mgr, &gaps);
            let candle = test_candle(23, 106.0, 115.0, 105.0, 114.5);
            mgr.manage(&gap_ctx(&candle, &gaps, 20));
            let candle = test_candle(24, 114.0, 115.0, 113.0, 114.0);
            let c = gap_ctx(&candle, &gaps, 20);
            mgr.manage(&c);
            let err = mgr.on_decision(&decision(DecisionDirection::Long), &c).unwrap_err();
            assert_eq!(err.code(), "no_correlated_gap");
        }
    }
}
