//! MACD detector: fast/slow EMA spread against its signal line.
//!
//! A histogram sign change (crossover) is a full-strength signal; while the
//! histogram keeps its sign the detector repeats the direction at half
//! strength.

use crate::config::MacdParams;
use crate::domain::{Candle, Direction};
use crate::indicators::{Ema, Indicator};
use crate::signals::{Detector, Signal, SourceType};

const CONTINUATION_STRENGTH: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct MacdDetector {
    fast: Ema,
    slow: Ema,
    signal: Ema,
    prev_histogram: Option<f64>,
    name: String,
}

impl MacdDetector {
    pub fn new(params: &MacdParams) -> Self {
        Self {
            fast: Ema::new(params.fast),
            slow: Ema::new(params.slow),
            signal: Ema::new(params.signal),
            prev_histogram: None,
            name: format!("macd_{}_{}_{}", params.fast, params.slow, params.signal),
        }
    }
}

impl Detector for MacdDetector {
    fn source(&self) -> SourceType {
        SourceType::Macd
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn on_candle(&mut self, candle: &Candle) -> Vec<Signal> {
        let fast = self.fast.update(candle.close);
        let slow = self.slow.update(candle.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Vec::new();
        };
        let macd = fast - slow;
        let Some(signal_line) = self.signal.update(macd) else {
            return Vec::new();
        };
        let histogram = macd - signal_line;
        let previous = self.prev_histogram.replace(histogram);

        let direction = if histogram > 0.0 {
            Direction::Long
        } else if histogram < 0.0 {
            Direction::Short
        } else {
            return Vec::new();
        };
        let crossed = previous.is_some_and(|p| p.signum() != histogram.signum() || p == 0.0);
        let strength = if crossed { 1.0 } else { CONTINUATION_STRENGTH };
        vec![Signal::new(SourceType::Macd, direction, strength, candle.index)]
    }
}
