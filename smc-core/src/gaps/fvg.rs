//! Fair value gap record.

use serde::{Deserialize, Serialize};

use crate::domain::{Direction, FvgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FvgDirection {
    Bullish,
    Bearish,
}

impl FvgDirection {
    pub fn trade_direction(self) -> Direction {
        match self {
            FvgDirection::Bullish => Direction::Long,
            FvgDirection::Bearish => Direction::Short,
        }
    }

    pub fn from_trade_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => FvgDirection::Bullish,
            Direction::Short => FvgDirection::Bearish,
        }
    }
}

/// How deep price must revisit a gap before it counts as filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillMode {
    /// A wick reaching the midpoint fills the gap.
    #[default]
    Midpoint,
    /// A wick must reach the far edge of the zone.
    FullZone,
}

/// Three-candle imbalance. `top > bottom` always.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fvg {
    pub id: FvgId,
    pub direction: FvgDirection,
    pub top: f64,
    pub bottom: f64,
    pub midpoint: f64,
    pub creation_candle_index: u64,
    pub displacement_candle_index: u64,
    /// Displacement candle extremes, used for stop placement.
    pub displacement_high: f64,
    pub displacement_low: f64,
    pub filled_at: Option<u64>,
    pub invalidated: bool,
    /// Set once the gap survives the candle right after creation.
    pub confirmed: bool,
    pub expired_at: Option<u64>,
}

impl Fvg {
    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    /// Open, confirmed, unfilled and not invalidated.
    pub fn is_tradable(&self) -> bool {
        self.confirmed && !self.invalidated && self.filled_at.is_none() && self.expired_at.is_none()
    }

    /// Price a wick must reach for the gap to count as filled.
    pub fn fill_level(&self, mode: FillMode) -> f64 {
        match (mode, self.direction) {
            (FillMode::Midpoint, _) => self.midpoint,
            (FillMode::FullZone, FvgDirection::Bullish) => self.bottom,
            (FillMode::FullZone, FvgDirection::Bearish) => self.top,
        }
    }

    /// True if the candle range reaches `level` coming from the gap's side.
    pub(crate) fn reached(&self, level: f64, high: f64, low: f64) -> bool {
        match self.direction {
            FvgDirection::Bullish => low <= level,
            FvgDirection::Bearish => high >= level,
        }
    }

    /// Gap height relative to the displacement candle's range, in [0, 1].
    pub fn strength(&self) -> f64 {
        let range = self.displacement_high - self.displacement_low;
        if range <= 0.0 {
            return 0.0;
        }
        (self.height() / range).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bullish() -> Fvg {
        Fvg {
            id: FvgId(1),
            direction: FvgDirection::Bullish,
            top: 104.0,
            bottom: 100.0,
            midpoint: 102.0,
            creation_candle_index: 2,
            displacement_candle_index: 1,
            displacement_high: 105.0,
            displacement_low: 99.0,
            filled_at: None,
            invalidated: false,
            confirmed: true,
            expired_at: None,
        }
    }

    #[test]
    fn fill_levels_by_mode() {
        let gap = bullish();
        assert_eq!(gap.fill_level(FillMode::Midpoint), 102.0);
        assert_eq!(gap.fill_level(FillMode::FullZone), 100.0);
        let mut bear = gap.clone();
        bear.direction = FvgDirection::Bearish;
        assert_eq!(bear.fill_level(FillMode::FullZone), 104.0);
    }

    #[test]
    fn strength_is_relative_to_displacement() {
        let gap = bullish();
        assert!((gap.strength() - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn invalidated_gap_is_not_tradable() {
        let mut gap = bullish();
        assert!(gap.is_tradable());
        gap.invalidated = true;
        assert!(!gap.is_tradable());
    }
}
