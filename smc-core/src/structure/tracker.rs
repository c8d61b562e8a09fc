//! Structure tracker: swing points, trend state, BOS and CHoCH.
//!
//! Consumes closed candles one at a time. Swing confirmation lags by the
//! pivot lookback `L`; breaks are evaluated on the close of every candle.
//!
//! Break rules:
//! - BOS: close beyond the last swing level in the trend direction (either
//!   level while `Ranging`). The broken level is replaced by the breaking
//!   candle's extreme, so the next BOS needs a close beyond that extreme.
//! - CHoCH: close beyond the opposite-side level after the trend failed to
//!   extend. If the breaking candle itself set a new trend extreme, the new
//!   extreme wins and no CHoCH fires.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::swing::{PivotWindow, SwingKind, SwingLabel, SwingPoint};
use crate::domain::{Candle, Direction, SequenceGuard, Trend};
use crate::error::InputError;

/// Live structure state of one instrument. Only the tracker mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    pub trend: Trend,
    pub bos_count: u32,
    pub last_swing_high: Option<f64>,
    pub last_swing_low: Option<f64>,
    /// Candle index of the most recent BOS or CHoCH.
    pub last_event_candle_index: Option<u64>,
}

impl StructureState {
    /// A trend is confirmed after two BOS in its direction.
    pub fn is_confirmed(&self) -> bool {
        self.trend != Trend::Ranging && self.bos_count >= 2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureEvent {
    SwingConfirmed(SwingPoint),
    Bos {
        direction: Direction,
        level: f64,
        candle_index: u64,
        bos_count: u32,
    },
    Choch {
        direction: Direction,
        level: f64,
        candle_index: u64,
    },
}

impl StructureEvent {
    pub fn candle_index(&self) -> u64 {
        match self {
            StructureEvent::SwingConfirmed(s) => s.confirmed_at,
            StructureEvent::Bos { candle_index, .. } | StructureEvent::Choch { candle_index, .. } => {
                *candle_index
            }
        }
    }
}

/// Most recent CHoCH, kept for entry correlation with fair value gaps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChochRecord {
    pub direction: Direction,
    pub level: f64,
    pub candle_index: u64,
}

#[derive(Debug, Clone)]
pub struct StructureTracker {
    window: PivotWindow,
    guard: SequenceGuard,
    swings: Vec<SwingPoint>,
    state: StructureState,
    /// Most favorable price reached since the current trend began.
    extreme: Option<f64>,
    last_choch: Option<ChochRecord>,
}

impl StructureTracker {
    /// `lookback` is validated by `StrategyConfig::validate` (>= 1).
    pub fn new(lookback: usize) -> Self {
        Self {
            window: PivotWindow::new(lookback.max(1)),
            guard: SequenceGuard::new(),
            swings: Vec::new(),
            state: StructureState::default(),
            extreme: None,
            last_choch: None,
        }
    }

    pub fn state(&self) -> &StructureState {
        &self.state
    }

    /// Every confirmed swing point, oldest first.
    pub fn swings(&self) -> &[SwingPoint] {
        &self.swings
    }

    pub fn last_swing(&self, kind: SwingKind) -> Option<&SwingPoint> {
        self.swings.iter().rev().find(|s| s.kind == kind)
    }

    pub fn last_choch(&self) -> Option<&ChochRecord> {
        self.last_choch.as_ref()
    }

    pub fn lookback(&self) -> usize {
        self.window.lookback()
    }

    pub fn on_candle(&mut self, candle: &Candle) -> Result<Vec<StructureEvent>, InputError> {
        self.guard.accept(candle)?;

        let mut events = Vec::new();
        for pivot in self.window.push(candle) {
            let previous = self.last_swing(pivot.kind).map(|s| s.price);
            let swing = SwingPoint {
                candle_index: pivot.candle_index,
                price: pivot.price,
                kind: pivot.kind,
                label: SwingLabel::classify(pivot.kind, pivot.price, previous),
                confirmed_at: candle.index,
            };
            match swing.kind {
                SwingKind::High => self.state.last_swing_high = Some(swing.price),
                SwingKind::Low => self.state.last_swing_low = Some(swing.price),
            }
            debug!(
                index = swing.candle_index,
                price = swing.price,
                label = swing.label.short_name(),
                "swing confirmed"
            );
            self.swings.push(swing);
            events.push(StructureEvent::SwingConfirmed(swing));
        }

        if let Some(event) = self.check_breaks(candle) {
            events.push(event);
        }
        Ok(events)
    }

    fn check_breaks(&mut self, candle: &Candle) -> Option<StructureEvent> {
        let close = candle.close;
        let above_high = self.state.last_swing_high.filter(|&h| close > h);
        let below_low = self.state.last_swing_low.filter(|&l| close < l);

        let event = match self.state.trend {
            Trend::Ranging => match (above_high, below_low) {
                (Some(level), _) => Some(self.bos(Direction::Long, level, candle)),
                (None, Some(level)) => Some(self.bos(Direction::Short, level, candle)),
                (None, None) => None,
            },
            Trend::Up => match (above_high, below_low) {
                (Some(level), _) => Some(self.bos(Direction::Long, level, candle)),
                (None, Some(level)) if !self.extends_trend(candle) => {
                    Some(self.choch(Direction::Short, level, candle))
                }
                _ => None,
            },
            Trend::Down => match (above_high, below_low) {
                (_, Some(level)) => Some(self.bos(Direction::Short, level, candle)),
                (Some(level), None) if !self.extends_trend(candle) => {
                    Some(self.choch(Direction::Long, level, candle))
                }
                _ => None,
            },
        };

        if !matches!(event, Some(StructureEvent::Choch { .. })) {
            self.track_extreme(candle);
        }
        event
    }

    /// True if the candle sets a new extreme in the current trend direction.
    fn extends_trend(&self, candle: &Candle) -> bool {
        match (self.state.trend, self.extreme) {
            (Trend::Up, Some(extreme)) => candle.high > extreme,
            (Trend::Down, Some(extreme)) => candle.low < extreme,
            _ => false,
        }
    }

    fn track_extreme(&mut self, candle: &Candle) {
        self.extreme = match (self.state.trend, self.extreme) {
            (Trend::Up, Some(e)) => Some(e.max(candle.high)),
            (Trend::Up, None) => Some(candle.high),
            (Trend::Down, Some(e)) => Some(e.min(candle.low)),
            (Trend::Down, None) => Some(candle.low),
            (Trend::Ranging, _) => None,
        };
    }

    fn bos(&mut self, direction: Direction, level: f64, candle: &Candle) -> StructureEvent {
        if self.state.trend == Trend::Ranging {
            self.state.trend = Trend::from_direction(direction);
            self.extreme = None;
        }
        self.state.bos_count += 1;
        match direction {
            Direction::Long => self.state.last_swing_high = Some(candle.high),
            Direction::Short => self.state.last_swing_low = Some(candle.low),
        }
        self.state.last_event_candle_index = Some(candle.index);
        debug!(
            index = candle.index,
            %direction,
            level,
            bos_count = self.state.bos_count,
            "break of structure"
        );
        StructureEvent::Bos {
            direction,
            level,
            candle_index: candle.index,
            bos_count: self.state.bos_count,
        }
    }

    fn choch(&mut self, direction: Direction, level: f64, candle: &Candle) -> StructureEvent {
        self.state.trend = Trend::from_direction(direction);
        self.state.bos_count = 0;
        let extreme = match direction {
            Direction::Long => {
                self.state.last_swing_high = Some(candle.high);
                candle.high
            }
            Direction::Short => {
                self.state.last_swing_low = Some(candle.low);
                candle.low
            }
        };
        self.extreme = Some(extreme);
        self.state.last_event_candle_index = Some(candle.index);
        self.last_choch = Some(ChochRecord {
            direction,
            level,
            candle_index: candle.index,
        });
        debug!(index = candle.index, %direction, level, "change of character");
        StructureEvent::Choch {
            direction,
            level,
            candle_index: candle.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::test_candle;

    /// Candle whose open sits at the close (clamped into range).
    fn c(index: u64, high: f64, low: f64, close: f64) -> Candle {
        let open = close.clamp(low, high);
        test_candle(index, open, high, low, close)
    }

    fn feed(tracker: &mut StructureTracker, candles: &[Candle]) -> Vec<StructureEvent> {
        candles
            .iter()
            .flat_map(|candle| tracker.on_candle(candle).unwrap())
            .collect()
    }

    fn bos_events(events: &[StructureEvent]) -> Vec<&StructureEvent> {
        events
            .iter()
            .filter(|e| matches!(e, StructureEvent::Bos { .. }))
            .collect()
    }

    #[test]
    fn swing_high_confirmed_with_lag() {
        let mut tracker = StructureTracker::new(2);
        let events = feed(
            &mut tracker,
            &[
                c(0, 101.0, 99.0, 100.0),
                c(1, 102.0, 100.0, 101.0),
                c(2, 105.0, 101.0, 103.0),
                c(3, 103.0, 100.5, 101.0),
            ],
        );
        assert!(events.is_empty());
        let events = tracker.on_candle(&c(4, 102.0, 100.0, 101.0)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            StructureEvent::SwingConfirmed(s) => {
                assert_eq!(s.candle_index, 2);
                assert_eq!(s.confirmed_at, 4);
                assert_eq!(s.price, 105.0);
                assert_eq!(s.label, SwingLabel::None);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(tracker.state().last_swing_high, Some(105.0));
    }

    #[test]
    fn ranging_bos_sets_trend() {
        let mut tracker = StructureTracker::new(1);
        feed(
            &mut tracker,
            &[
                c(0, 99.0, 97.0, 98.0),
                c(1, 100.0, 98.0, 99.0),
                c(2, 98.0, 96.0, 97.0),
            ],
        );
        assert_eq!(tracker.state().last_swing_high, Some(100.0));
        let events = tracker.on_candle(&c(3, 102.0, 97.0, 101.0)).unwrap();
        assert_eq!(bos_events(&events).len(), 1);
        assert_eq!(tracker.state().trend, Trend::Up);
        assert_eq!(tracker.state().bos_count, 1);
        assert_eq!(tracker.state().last_swing_high, Some(102.0));
        assert!(!tracker.state().is_confirmed());
    }

    #[test]
    fn new_extreme_beats_choch() {
        let mut tracker = StructureTracker::new(1);
        // swing high 100, swing low 96
        feed(
            &mut tracker,
            &[
                c(0, 99.0, 97.0, 98.0),
                c(1, 100.0, 98.0, 99.0),
                c(2, 98.0, 96.0, 97.0),
                c(3, 99.0, 97.0, 98.0),
                // BOS up
                c(4, 102.0, 97.5, 101.0),
            ],
        );
        assert_eq!(tracker.state().trend, Trend::Up);
        assert_eq!(tracker.state().last_swing_low, Some(96.0));
        // outside candle: new high 103 but closes below 96
        let events = tracker.on_candle(&c(5, 103.0, 94.0, 95.0)).unwrap();
        assert!(events
            .iter()
            .all(|e| !matches!(e, StructureEvent::Choch { .. })));
        assert_eq!(tracker.state().trend, Trend::Up);

        // the following candle fails to extend and closes below the low
        let events = tracker.on_candle(&c(6, 96.0, 93.0, 94.0)).unwrap();
        assert!(events
            .iter()
            .any(|e| matches!(e, StructureEvent::Choch { direction: Direction::Short, .. })));
        assert_eq!(tracker.state().trend, Trend::Down);
        assert_eq!(tracker.state().bos_count, 0);
        assert_eq!(tracker.last_choch().map(|c| c.candle_index), Some(6));
    }

    #[test]
    fn rejects_out_of_order_without_state_change() {
        let mut tracker = StructureTracker::new(2);
        tracker.on_candle(&c(3, 101.0, 99.0, 100.0)).unwrap();
        let before = tracker.state().clone();
        assert_eq!(
            tracker.on_candle(&c(2, 101.0, 99.0, 100.0)),
            Err(InputError::OutOfOrder { last: 3, got: 2 })
        );
        assert_eq!(tracker.state(), &before);
    }
}
