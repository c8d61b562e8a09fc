//! Domain types shared by every stage of the pipeline.

pub mod candle;
pub mod direction;
pub mod ids;
pub mod sequence;

pub use candle::Candle;
pub use direction::{Direction, Trend};
pub use ids::{FvgId, IdSequence, PlanId};
pub use sequence::SequenceGuard;

/// Instrument identifier (e.g. "BTC-USD").
pub type Instrument = String;

/// Build a candle at a fixed minute offset, for tests.
#[cfg(test)]
pub(crate) fn test_candle(index: u64, open: f64, high: f64, low: f64, close: f64) -> Candle {
    use chrono::{Duration, TimeZone, Utc};
    let base = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    Candle::new(
        index,
        base + Duration::minutes(index as i64),
        open,
        high,
        low,
        close,
        1_000.0,
    )
}
