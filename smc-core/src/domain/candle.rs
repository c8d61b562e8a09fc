//! Candle: the fundamental market data unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InputError, MalformedReason};

/// Closed OHLCV candle with its position in the stream.
///
/// Candles are immutable once appended. `index` is assigned by the feed and
/// must be strictly increasing per instrument; the core never renumbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub index: u64,
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        index: u64,
        time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            index,
            time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// High minus low.
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Midpoint of the candle body.
    pub fn body_mid(&self) -> f64 {
        (self.open + self.close) / 2.0
    }

    /// OHLCV sanity check. Malformed candles are rejected at the boundary,
    /// never coerced.
    pub fn validate(&self) -> Result<(), InputError> {
        let reason = if !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
        {
            Some(MalformedReason::NonFinite)
        } else if self.low > self.high {
            Some(MalformedReason::LowAboveHigh)
        } else if self.open < self.low || self.open > self.high {
            Some(MalformedReason::OpenOutsideRange)
        } else if self.close < self.low || self.close > self.high {
            Some(MalformedReason::CloseOutsideRange)
        } else if self.volume < 0.0 {
            Some(MalformedReason::NegativeVolume)
        } else {
            None
        };

        match reason {
            Some(reason) => Err(InputError::Malformed {
                index: self.index,
                reason,
            }),
            None => Ok(()),
        }
    }
}
