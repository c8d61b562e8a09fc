//! Per-instrument ordering guard.

use serde::{Deserialize, Serialize};

use super::Candle;
use crate::error::InputError;

/// Enforces strictly increasing candle indices.
///
/// `check` is side-effect free so callers can validate a candle before any
/// component state is touched, then `commit` once the step has run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceGuard {
    last: Option<u64>,
}

impl SequenceGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }

    /// Validate OHLC and ordering without advancing.
    pub fn check(&self, candle: &Candle) -> Result<(), InputError> {
        candle.validate()?;
        match self.last {
            Some(last) if candle.index == last => Err(InputError::Duplicate {
                index: candle.index,
            }),
            Some(last) if candle.index < last => Err(InputError::OutOfOrder {
                last,
                got: candle.index,
            }),
            _ => Ok(()),
        }
    }

    pub fn commit(&mut self, index: u64) {
        self.last = Some(index);
    }

    /// `check` followed by `commit`.
    pub fn accept(&mut self, candle: &Candle) -> Result<(), InputError> {
        self.check(candle)?;
        self.commit(candle.index);
        Ok(())
    }
}
