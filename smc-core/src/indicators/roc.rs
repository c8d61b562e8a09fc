//! Rate of Change (ROC).
//!
//! Percentage change over N values.
//! ROC[t] = (x[t] - x[t-period]) / x[t-period] * 100
//! Lookback: period.

use std::collections::VecDeque;

use super::Indicator;

#[derive(Debug, Clone)]
pub struct Roc {
    period: usize,
    name: String,
    history: VecDeque<f64>,
}

impl Roc {
    pub fn new(period: usize) -> Self {
        let period = period.max(1);
        Self {
            period,
            name: format!("roc_{period}"),
            history: VecDeque::with_capacity(period + 1),
        }
    }
}

impl Indicator for Roc {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn update(&mut self, x: f64) -> Option<f64> {
        self.history.push_back(x);
        if self.history.len() > self.period + 1 {
            self.history.pop_front();
        }
        if self.history.len() <= self.period {
            return None;
        }
        let base = self.history[0];
        (base != 0.0).then(|| (x - base) / base * 100.0)
    }
}
