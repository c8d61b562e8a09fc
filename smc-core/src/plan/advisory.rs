//! Optional external size advice.
//!
//! An advisor sees the finished plan levels and may scale the size. It can
//! never change direction, entry or stop/take levels. Failures and
//! non-finite answers fall back to 1.0; answers are clamped to the
//! configured range.

use thiserror::Error;
use tracing::warn;

use crate::domain::Direction;

/// Plan levels exposed to the advisor before size is finalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdvisoryContext {
    pub direction: Direction,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub base_size: f64,
    pub candle_index: u64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisoryError {
    #[error("advisor unavailable: {0}")]
    Unavailable(String),
    #[error("advisor timed out")]
    Timeout,
}

pub trait SizeAdvisor: Send + Sync {
    fn suggest_size_multiplier(&self, ctx: &AdvisoryContext) -> Result<f64, AdvisoryError>;
}

/// Always answers with the same multiplier.
#[derive(Debug, Clone, Copy)]
pub struct FixedMultiplier(pub f64);

impl SizeAdvisor for FixedMultiplier {
    fn suggest_size_multiplier(&self, _ctx: &AdvisoryContext) -> Result<f64, AdvisoryError> {
        Ok(self.0)
    }
}

/// Ask the advisor (if any) and bound its answer to `[min, max]`.
pub fn resolve_multiplier(
    advisor: Option<&dyn SizeAdvisor>,
    ctx: &AdvisoryContext,
    min: f64,
    max: f64,
) -> f64 {
    let Some(advisor) = advisor else {
        return 1.0;
    };
    match advisor.suggest_size_multiplier(ctx) {
        Ok(m) if m.is_finite() => m.clamp(min, max),
        Ok(m) => {
            warn!(multiplier = m, index = ctx.candle_index, "non-finite size advice ignored");
            1.0
        }
        Err(e) => {
            warn!(error = %e, index = ctx.candle_index, "size advisor failed, using 1.0");
            1.0
        }
    }
}
