//! Weighted signal aggregation.
//!
//! Filters, then sums `weight * strength` per direction:
//! - signals below `min_strength` are noise and dropped
//! - signals from sources without a weight are out of the strategy's scope
//!
//! Long wins if its score reaches the threshold and strictly beats short;
//! short is the mirror; anything else (including exact ties) is Wait.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Signal, SourceType};
use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    pub weights: BTreeMap<SourceType, f64>,
    pub threshold: f64,
    pub min_strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionDirection {
    Wait,
    Long,
    Short,
}

impl DecisionDirection {
    pub fn direction(self) -> Option<Direction> {
        match self {
            DecisionDirection::Wait => None,
            DecisionDirection::Long => Some(Direction::Long),
            DecisionDirection::Short => Some(Direction::Short),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub direction: DecisionDirection,
    /// Score of the winning side (the larger side for Wait).
    pub score: f64,
    pub long_score: f64,
    pub short_score: f64,
    /// Signals that survived filtering.
    pub contributing: usize,
}

impl Decision {
    pub fn wait() -> Self {
        Self {
            direction: DecisionDirection::Wait,
            score: 0.0,
            long_score: 0.0,
            short_score: 0.0,
            contributing: 0,
        }
    }

    pub fn is_wait(&self) -> bool {
        self.direction == DecisionDirection::Wait
    }
}

#[derive(Debug, Clone)]
pub struct SignalAggregator {
    config: AggregatorConfig,
}

impl SignalAggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn evaluate(&self, signals: &[Signal]) -> Decision {
        evaluate(signals, &self.config)
    }
}

pub fn evaluate(signals: &[Signal], config: &AggregatorConfig) -> Decision {
    let mut long_score = 0.0;
    let mut short_score = 0.0;
    let mut contributing = 0;

    for signal in signals {
        if signal.strength < config.min_strength {
            continue;
        }
        let Some(&weight) = config.weights.get(&signal.source) else {
            continue;
        };
        contributing += 1;
        match signal.direction {
            Direction::Long => long_score += weight * signal.strength,
            Direction::Short => short_score += weight * signal.strength,
        }
    }

    let (direction, score) = if long_score >= config.threshold && long_score > short_score {
        (DecisionDirection::Long, long_score)
    } else if short_score >= config.threshold && short_score > long_score {
        (DecisionDirection::Short, short_score)
    } else {
        (DecisionDirection::Wait, long_score.max(short_score))
    };

    Decision {
        direction,
        score,
        long_score,
        short_score,
        contributing,
    }
}
