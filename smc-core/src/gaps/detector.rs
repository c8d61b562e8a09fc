//! Gap detector: registry of open, filled, invalidated and expired FVGs.
//!
//! Per candle, existing gaps are updated first (invalidation, fill, age),
//! then the 3-candle window ending at the candle is checked for a new gap.
//! A new gap is only tradable once it survives the next candle.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use super::fvg::{Fvg, FvgDirection};
use crate::config::GapSettings;
use crate::domain::{Candle, Direction, FvgId, IdSequence, SequenceGuard};
use crate::error::InputError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "gap", rename_all = "snake_case")]
pub enum GapEvent {
    Created(Fvg),
    /// Survived the invalidation check on the following candle.
    Confirmed(Fvg),
    Invalidated(Fvg),
    Filled(Fvg),
    Expired(Fvg),
}

impl GapEvent {
    pub fn gap(&self) -> &Fvg {
        match self {
            GapEvent::Created(g)
            | GapEvent::Confirmed(g)
            | GapEvent::Invalidated(g)
            | GapEvent::Filled(g)
            | GapEvent::Expired(g) => g,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GapDetector {
    settings: GapSettings,
    guard: SequenceGuard,
    window: VecDeque<Candle>,
    open: Vec<Fvg>,
    history: VecDeque<Fvg>,
    ids: IdSequence,
}

impl GapDetector {
    pub fn new(settings: GapSettings) -> Self {
        Self {
            settings,
            guard: SequenceGuard::new(),
            window: VecDeque::with_capacity(3),
            open: Vec::new(),
            history: VecDeque::new(),
            ids: IdSequence::default(),
        }
    }

    /// Gaps not yet filled, invalidated or expired (confirmed or not).
    pub fn open_gaps(&self) -> &[Fvg] {
        &self.open
    }

    /// Closed gaps kept for display, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &Fvg> {
        self.history.iter()
    }

    /// Tradable gaps in a direction, most recent first.
    pub fn tradable(&self, direction: Direction) -> impl Iterator<Item = &Fvg> {
        let wanted = FvgDirection::from_trade_direction(direction);
        self.open
            .iter()
            .rev()
            .filter(move |g| g.direction == wanted && g.is_tradable())
    }

    pub fn get(&self, id: FvgId) -> Option<&Fvg> {
        self.open
            .iter()
            .chain(self.history.iter())
            .find(|g| g.id == id)
    }

    pub fn on_candle(&mut self, candle: &Candle) -> Result<Vec<GapEvent>, InputError> {
        self.guard.accept(candle)?;

        let mut events = self.update_open(candle);

        self.window.push_back(candle.clone());
        if self.window.len() > 3 {
            self.window.pop_front();
        }
        if let Some(gap) = self.detect(candle) {
            debug!(
                id = %gap.id,
                direction = ?gap.direction,
                top = gap.top,
                bottom = gap.bottom,
                "fair value gap created"
            );
            events.push(GapEvent::Created(gap.clone()));
            self.open.push(gap);
        }
        Ok(events)
    }

    fn update_open(&mut self, candle: &Candle) -> Vec<GapEvent> {
        let mode = self.settings.fill_mode;
        let max_age = self.settings.max_age;
        let mut events = Vec::new();
        let mut still_open = Vec::with_capacity(self.open.len());

        for mut gap in std::mem::take(&mut self.open) {
            if !gap.confirmed {
                let far_edge = match gap.direction {
                    FvgDirection::Bullish => gap.bottom,
                    FvgDirection::Bearish => gap.top,
                };
                if gap.reached(far_edge, candle.high, candle.low) {
                    gap.invalidated = true;
                    debug!(id = %gap.id, index = candle.index, "fair value gap invalidated");
                    events.push(GapEvent::Invalidated(gap.clone()));
                    self.retire(gap);
                    continue;
                }
                gap.confirmed = true;
                events.push(GapEvent::Confirmed(gap.clone()));
            }

            if gap.reached(gap.fill_level(mode), candle.high, candle.low) {
                gap.filled_at = Some(candle.index);
                debug!(id = %gap.id, index = candle.index, "fair value gap filled");
                events.push(GapEvent::Filled(gap.clone()));
                self.retire(gap);
            } else if candle.index.saturating_sub(gap.creation_candle_index) > max_age {
                gap.expired_at = Some(candle.index);
                events.push(GapEvent::Expired(gap.clone()));
                self.retire(gap);
            } else {
                still_open.push(gap);
            }
        }

        self.open = still_open;
        events
    }

    fn detect(&mut self, current: &Candle) -> Option<Fvg> {
        if self.window.len() < 3 {
            return None;
        }
        let first = &self.window[0];
        let middle = &self.window[1];

        let (direction, top, bottom) = if current.low > first.high {
            (FvgDirection::Bullish, current.low, first.high)
        } else if current.high < first.low {
            (FvgDirection::Bearish, first.low, current.high)
        } else {
            return None;
        };

        let midpoint = (top + bottom) / 2.0;
        if (top - bottom) < self.settings.min_gap_fraction * midpoint.abs() {
            return None;
        }

        let (displacement_candle_index, displacement_high, displacement_low) =
            (middle.index, middle.high, middle.low);
        Some(Fvg {
            id: FvgId(self.ids.next_id()),
            direction,
            top,
            bottom,
            midpoint,
            creation_candle_index: current.index,
            displacement_candle_index,
            displacement_high,
            displacement_low,
            filled_at: None,
            invalidated: false,
            confirmed: false,
            expired_at: None,
        })
    }

    fn retire(&mut self, gap: Fvg) {
        if self.settings.history_limit == 0 {
            return;
        }
        if self.history.len() == self.settings.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(gap);
    }
}
