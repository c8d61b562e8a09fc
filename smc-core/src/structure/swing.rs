//! Swing points: locally confirmed extremes after a symmetric pivot window.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    High,
    Low,
}

/// Label relative to the previous swing point of the same kind.
///
/// Equal prices do not count as higher (for highs) or lower (for lows), so an
/// equal high is `LowerHigh` and an equal low is `HigherLow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingLabel {
    HigherHigh,
    LowerHigh,
    HigherLow,
    LowerLow,
    None,
}

impl SwingLabel {
    pub fn classify(kind: SwingKind, price: f64, previous: Option<f64>) -> Self {
        match (kind, previous) {
            (_, None) => SwingLabel::None,
            (SwingKind::High, Some(prev)) if price > prev => SwingLabel::HigherHigh,
            (SwingKind::High, Some(_)) => SwingLabel::LowerHigh,
            (SwingKind::Low, Some(prev)) if price < prev => SwingLabel::LowerLow,
            (SwingKind::Low, Some(_)) => SwingLabel::HigherLow,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            SwingLabel::HigherHigh => "HH",
            SwingLabel::LowerHigh => "LH",
            SwingLabel::HigherLow => "HL",
            SwingLabel::LowerLow => "LL",
            SwingLabel::None => "-",
        }
    }
}

/// A confirmed pivot. Created once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub candle_index: u64,
    pub price: f64,
    pub kind: SwingKind,
    pub label: SwingLabel,
    /// Index of the candle whose arrival confirmed the pivot.
    pub confirmed_at: u64,
}

/// Rolling `2L + 1` candle window used to confirm pivots `L` candles late.
#[derive(Debug, Clone)]
pub struct PivotWindow {
    lookback: usize,
    candles: VecDeque<Candle>,
}

/// Raw pivot candidate before labeling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub candle_index: u64,
    pub price: f64,
    pub kind: SwingKind,
}

impl PivotWindow {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback,
            candles: VecDeque::with_capacity(2 * lookback + 1),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Push a candle and return the pivots confirmed by it (at most one high
    /// and one low, both at the window center).
    pub fn push(&mut self, candle: &Candle) -> Vec<Pivot> {
        let size = 2 * self.lookback + 1;
        self.candles.push_back(candle.clone());
        if self.candles.len() > size {
            self.candles.pop_front();
        }
        if self.candles.len() < size {
            return Vec::new();
        }

        let mid = self.lookback;
        let center = &self.candles[mid];
        let mut others = self
            .candles
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != mid)
            .map(|(_, c)| c);

        let is_high = others.clone().all(|c| c.high < center.high);
        let is_low = others.all(|c| c.low > center.low);

        let mut pivots = Vec::new();
        if is_high {
            pivots.push(Pivot {
                candle_index: center.index,
                price: center.high,
                kind: SwingKind::High,
            });
        }
        if is_low {
            pivots.push(Pivot {
                candle_index: center.index,
                price: center.low,
                kind: SwingKind::Low,
            });
        }
        pivots
    }
}
