//! Trade plan entity and the events emitted to executors.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::{Direction, FvgId, PlanId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    /// Waiting for price to reach a limit entry.
    Pending,
    Open,
    /// Stop moved to entry after a BOS in the trade direction.
    BreakEven,
    Closed,
}

impl PlanState {
    pub fn is_active(self) -> bool {
        !matches!(self, PlanState::Closed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    /// Opposite-direction CHoCH while the plan was live.
    StructuralInvalidation,
    /// Pending entry abandoned before fill.
    Cancelled,
    /// Pending entry not filled within the allowed number of candles.
    Expired,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::TakeProfit => "take_profit",
            ExitReason::StructuralInvalidation => "structural_invalidation",
            ExitReason::Cancelled => "cancelled",
            ExitReason::Expired => "expired",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradePlan {
    pub id: PlanId,
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    /// Stop at creation; defines 1R.
    pub initial_stop: f64,
    pub take_profit: f64,
    pub size: f64,
    pub state: PlanState,
    /// Candle on which the plan was created.
    pub opened_at_candle_index: u64,
    /// Candle on which the entry filled (`None` while pending or if never filled).
    pub filled_at_candle_index: Option<u64>,
    pub closed_at_candle_index: Option<u64>,
    pub exit_reason: Option<ExitReason>,
    pub exit_price: Option<f64>,
    /// Gap whose midpoint set the entry, for structure+gap plans.
    pub source_gap: Option<FvgId>,
}

impl TradePlan {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_filled(&self) -> bool {
        self.filled_at_candle_index.is_some()
    }

    /// Price distance between entry and the initial stop.
    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    /// Realized profit in R; `None` unless the plan filled and closed at a price.
    pub fn r_multiple(&self) -> Option<f64> {
        if !self.is_filled() {
            return None;
        }
        let exit = self.exit_price?;
        let risk = self.initial_risk();
        (risk > 0.0).then(|| (exit - self.entry_price) * self.direction.sign() / risk)
    }

    pub fn pnl(&self) -> Option<f64> {
        if !self.is_filled() {
            return None;
        }
        let exit = self.exit_price?;
        Some((exit - self.entry_price) * self.direction.sign() * self.size)
    }
}

/// What changed on an `Adjusted` event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Adjustment {
    Filled { price: f64 },
    BreakEven { from: f64, to: f64 },
    Trailed { from: f64, to: f64 },
}

/// One-way notification to the executor. Always carries a full snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradePlanEvent {
    Opened { plan: TradePlan },
    Adjusted { plan: TradePlan, adjustment: Adjustment },
    Closed { plan: TradePlan },
}

impl TradePlanEvent {
    pub fn plan(&self) -> &TradePlan {
        match self {
            TradePlanEvent::Opened { plan }
            | TradePlanEvent::Adjusted { plan, .. }
            | TradePlanEvent::Closed { plan } => plan,
        }
    }
}
