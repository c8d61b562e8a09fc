//! RSI detector: mean-reversion reading of Wilder's RSI.
//!
//! Below `oversold`: Long, stronger the deeper the reading.
//! Above `overbought`: Short, mirrored.

use crate::config::RsiParams;
use crate::domain::{Candle, Direction};
use crate::indicators::{Indicator, Rsi};
use crate::signals::{Detector, Signal, SourceType};

#[derive(Debug, Clone)]
pub struct RsiDetector {
    rsi: Rsi,
    oversold: f64,
    overbought: f64,
    name: String,
}

impl RsiDetector {
    pub fn new(params: &RsiParams) -> Self {
        Self {
            rsi: Rsi::new(params.period),
            oversold: params.oversold,
            overbought: params.overbought,
            name: format!("rsi_{}", params.period),
        }
    }
}

impl Detector for RsiDetector {
    fn source(&self) -> SourceType {
        SourceType::Rsi
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal> {
        let Some(rsi) = self.rsi.update(candle.close) else {
            return Vec::new();
        };
        if rsi < self.oversold && self.oversold > 0.0 {
            let strength = (self.oversold - rsi) / self.oversold;
            vec![Signal::new(SourceType::Rsi, Direction::Long, strength, candle.index)]
        } else if rsi > self.overbought && self.overbought < 100.0 {
            let strength = (rsi - self.overbought) / (100.0 - self.overbought);
            vec![Signal::new(SourceType::Rsi, Direction::Short, strength, candle.index)]
        } else {
            Vec::new()
        }
    }
}
