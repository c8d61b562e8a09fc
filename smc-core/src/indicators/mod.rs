//! Streaming indicator primitives.
//!
//! Indicators are pure functions of the values fed so far: one value in, one
//! optional output out. `None` during warmup. No indicator output at step t
//! may depend on input after t.

pub mod ema;
pub mod roc;
pub mod rsi;

pub use ema::Ema;
pub use roc::Roc;
pub use rsi::Rsi;

pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "ema_20", "rsi_14").
    fn name(&self) -> &str;

    /// Number of inputs consumed before the first output.
    fn lookback(&self) -> usize;

    /// Feed the next value.
    fn update(&mut self, x: f64) -> Option<f64>;
}

/// Run an indicator over a whole series, `NaN` during warmup.
pub fn compute_series(indicator: &mut dyn Indicator, values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .map(|&v| indicator.update(v).unwrap_or(f64::NAN))
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
