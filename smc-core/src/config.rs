//! Strategy configuration: an immutable value shared by every pipeline.
//!
//! Strategy variants ("personas") are different values of this struct, not
//! different code paths. Validation runs once at pipeline construction; a
//! pipeline never sees an invalid configuration.
//!
//! Weights are keyed by source-type name so that TOML files referencing an
//! unknown source fail validation with `ConfigError::UnknownSource` rather
//! than a generic parse error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::gaps::FillMode;
use crate::signals::{AggregatorConfig, SourceType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StructureSettings {
    /// Pivot lookback `L` on each side of a swing candle.
    pub swing_lookback: usize,
}

impl Default for StructureSettings {
    fn default() -> Self {
        Self { swing_lookback: 3 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapSettings {
    pub fill_mode: FillMode,
    /// Candles after creation before an unfilled gap is dropped.
    pub max_age: u64,
    /// Minimum gap height as a fraction of its midpoint. 0 keeps every gap.
    pub min_gap_fraction: f64,
    /// Closed gaps retained for display.
    pub history_limit: usize,
}

impl Default for GapSettings {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Midpoint,
            max_age: 50,
            min_gap_fraction: 0.0,
            history_limit: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorSettings {
    /// Weight per source type name (`structure`, `gap`, `momentum`, ...).
    pub weights: BTreeMap<String, f64>,
    pub threshold: f64,
    pub min_strength: f64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        let mut weights = BTreeMap::new();
        weights.insert("structure".to_string(), 1.0);
        weights.insert("gap".to_string(), 1.0);
        Self {
            weights,
            threshold: 0.8,
            min_strength: 0.2,
        }
    }
}

/// How the entry price of a new plan is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryMode {
    /// Limit entry at the midpoint of the FVG correlated with the last CHoCH.
    #[default]
    StructureGap,
    /// Market entry at the decision candle's close.
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanSettings {
    pub entry_mode: EntryMode,
    /// Take-profit distance as a multiple of the initial risk.
    pub reward_multiple: f64,
    /// Stop buffer beyond the reference level, in basis points of that level.
    pub stop_buffer_bps: f64,
    /// Fraction of `equity` risked per plan.
    pub risk_fraction: f64,
    /// Notional account equity used for sizing.
    pub equity: f64,
    pub break_even: bool,
    pub trailing: bool,
    pub exit_on_opposite_choch: bool,
    /// Candles a pending limit entry may wait before it expires.
    pub pending_max_candles: u64,
    /// Max distance in candles between a CHoCH and a gap's displacement candle.
    pub correlation_window: u64,
    pub advisory_min: f64,
    pub advisory_max: f64,
}

impl Default for PlanSettings {
    fn default() -> Self {
        Self {
            entry_mode: EntryMode::StructureGap,
            reward_multiple: 4.0,
            stop_buffer_bps: 10.0,
            risk_fraction: 0.01,
            equity: 10_000.0,
            break_even: true,
            trailing: true,
            exit_on_opposite_choch: true,
            pending_max_candles: 20,
            correlation_window: 1,
            advisory_min: 0.5,
            advisory_max: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumParams {
    pub period: usize,
    /// Rate of change (percent) that maps to full strength.
    pub full_scale_pct: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            period: 10,
            full_scale_pct: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsiParams {
    pub period: usize,
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for RsiParams {
    fn default() -> Self {
        Self {
            period: 14,
            oversold: 30.0,
            overbought: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacdParams {
    pub fast: usize,
    pub slow: usize,
    pub signal: usize,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub momentum: MomentumParams,
    pub rsi: RsiParams,
    pub macd: MacdParams,
}

/// Complete strategy configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    pub structure: StructureSettings,
    pub gaps: GapSettings,
    pub aggregator: AggregatorSettings,
    pub plan: PlanSettings,
    pub indicators: IndicatorSettings,
}

impl StrategyConfig {
    /// Resolve weights into typed source keys and check aggregator bounds.
    pub fn aggregator_config(&self) -> Result<AggregatorConfig, ConfigError> {
        let agg = &self.aggregator;
        if !(0.0..=1.0).contains(&agg.threshold) {
            return Err(ConfigError::ThresholdOutOfRange(agg.threshold));
        }
        if !(0.0..=1.0).contains(&agg.min_strength) {
            return Err(ConfigError::MinStrengthOutOfRange(agg.min_strength));
        }

        let mut weights = BTreeMap::new();
        for (name, &weight) in &agg.weights {
            let source = SourceType::from_str(name)?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    name: name.clone(),
                    weight,
                });
            }
            weights.insert(source, weight);
        }

        Ok(AggregatorConfig {
            weights,
            threshold: agg.threshold,
            min_strength: agg.min_strength,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.structure.swing_lookback < 1 {
            return Err(ConfigError::InvalidSwingLookback(
                self.structure.swing_lookback,
            ));
        }

        let gaps = &self.gaps;
        if gaps.max_age < 1 {
            return Err(ConfigError::InvalidParameter {
                name: "gaps.max_age",
                value: gaps.max_age as f64,
            });
        }
        if !gaps.min_gap_fraction.is_finite() || gaps.min_gap_fraction < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "gaps.min_gap_fraction",
                value: gaps.min_gap_fraction,
            });
        }

        self.aggregator_config()?;

        let plan = &self.plan;
        if !plan.reward_multiple.is_finite() || plan.reward_multiple <= 0.0 {
            return Err(ConfigError::NegativeRiskMultiple(plan.reward_multiple));
        }
        if !plan.stop_buffer_bps.is_finite() || plan.stop_buffer_bps < 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "plan.stop_buffer_bps",
                value: plan.stop_buffer_bps,
            });
        }
        if !(plan.risk_fraction > 0.0 && plan.risk_fraction < 1.0) {
            return Err(ConfigError::InvalidRiskFraction(plan.risk_fraction));
        }
        if !plan.equity.is_finite() || plan.equity <= 0.0 {
            return Err(ConfigError::InvalidParameter {
                name: "plan.equity",
                value: plan.equity,
            });
        }
        if plan.pending_max_candles < 1 {
            return Err(ConfigError::InvalidParameter {
                name: "plan.pending_max_candles",
                value: plan.pending_max_candles as f64,
            });
        }
        if !(plan.advisory_min > 0.0
            && plan.advisory_min <= 1.0
            && plan.advisory_max >= 1.0
            && plan.advisory_max.is_finite())
        {
            return Err(ConfigError::InvalidAdvisoryBounds {
                min: plan.advisory_min,
                max: plan.advisory_max,
            });
        }

        let ind = &self.indicators;
        let periods = [
            ("indicators.momentum.period", ind.momentum.period),
            ("indicators.rsi.period", ind.rsi.period),
            ("indicators.macd.fast", ind.macd.fast),
            ("indicators.macd.signal", ind.macd.signal),
        ];
        for (name, period) in periods {
            if period < 1 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    value: period as f64,
                });
            }
        }
        if ind.macd.slow <= ind.macd.fast {
            return Err(ConfigError::InvalidParameter {
                name: "indicators.macd.slow",
                value: ind.macd.slow as f64,
            });
        }
        if !(ind.momentum.full_scale_pct > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "indicators.momentum.full_scale_pct",
                value: ind.momentum.full_scale_pct,
            });
        }
        if !(0.0 < ind.rsi.oversold && ind.rsi.oversold < ind.rsi.overbought && ind.rsi.overbought < 100.0)
        {
            return Err(ConfigError::InvalidParameter {
                name: "indicators.rsi.oversold",
                value: ind.rsi.oversold,
            });
        }

        Ok(())
    }

    /// BLAKE3 hash of the canonical JSON form. `BTreeMap` keeps key order stable.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}

/// Named configurations shipped with the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPreset {
    /// CHoCH + correlated FVG, limit entry at the gap midpoint.
    StructureGap,
    /// Indicator blend confirmed by structure, market entry at close.
    MomentumBlend,
}

impl StrategyPreset {
    pub fn all() -> [StrategyPreset; 2] {
        [StrategyPreset::StructureGap, StrategyPreset::MomentumBlend]
    }

    pub fn name(self) -> &'static str {
        match self {
            StrategyPreset::StructureGap => "structure_gap",
            StrategyPreset::MomentumBlend => "momentum_blend",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|p| p.name() == name)
    }

    pub fn config(self) -> StrategyConfig {
        match self {
            StrategyPreset::StructureGap => StrategyConfig {
                name: self.name().to_string(),
                ..StrategyConfig::default()
            },
            StrategyPreset::MomentumBlend => {
                let mut weights = BTreeMap::new();
                weights.insert("momentum".to_string(), 1.0);
                weights.insert("macd".to_string(), 0.75);
                weights.insert("rsi".to_string(), 0.5);
                weights.insert("structure".to_string(), 0.5);
                StrategyConfig {
                    name: self.name().to_string(),
                    aggregator: AggregatorSettings {
                        weights,
                        threshold: 0.7,
                        min_strength: 0.25,
                    },
                    plan: PlanSettings {
                        entry_mode: EntryMode::Close,
                        reward_multiple: 2.0,
                        ..PlanSettings::default()
                    },
                    ..StrategyConfig::default()
                }
            }
        }
    }
}
