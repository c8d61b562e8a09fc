//! Momentum detector: rate of change of the close.
//!
//! Long when ROC > 0, Short when ROC < 0. Strength scales linearly with
//! |ROC| and saturates at `full_scale_pct`.

use crate::config::MomentumParams;
use crate::domain::{Candle, Direction};
use crate::indicators::{Indicator, Roc};
use crate::signals::{Detector, Signal, SourceType};

#[derive(Debug, Clone)]
pub struct MomentumDetector {
    roc: Roc,
    full_scale_pct: f64,
    name: String,
}

impl MomentumDetector {
    pub fn new(params: &MomentumParams) -> Self {
        Self {
            roc: Roc::new(params.period),
            full_scale_pct: params.full_scale_pct,
            name: format!("momentum_roc_{}", params.period),
        }
    }
}

impl Detector for MomentumDetector {
    fn source(&self) -> SourceType {
        SourceType::Momentum
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal> {
        let Some(roc) = self.roc.update(candle.close) else {
            return Vec::new();
        };
        let direction = if roc > 0.0 {
            Direction::Long
        } else if roc < 0.0 {
            Direction::Short
        } else {
            return Vec::new();
        };
        let strength = if self.full_scale_pct > 0.0 {
            roc.abs() / self.full_scale_pct
        } else {
            1.0
        };
        vec![Signal::new(SourceType::Momentum, direction, strength, candle.index)]
    }
}
