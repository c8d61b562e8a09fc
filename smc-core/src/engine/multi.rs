//! Multi-instrument engine: one lazily created pipeline per instrument.
//!
//! Pipelines share only the immutable `Arc<StrategyConfig>`.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::pipeline::{Pipeline, StepOutput};
use crate::config::StrategyConfig;
use crate::domain::{Candle, Instrument};
use crate::error::{ConfigError, InputError};
use crate::plan::SizeAdvisor;
use crate::signals::AggregatorConfig;

pub struct Engine {
    config: Arc<StrategyConfig>,
    aggregator: AggregatorConfig,
    advisor: Option<Arc<dyn SizeAdvisor>>,
    pipelines: BTreeMap<Instrument, Pipeline>,
}

impl Engine {
    pub fn new(config: StrategyConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let aggregator = config.aggregator_config()?;
        Ok(Self {
            config: Arc::new(config),
            aggregator,
            advisor: None,
            pipelines: BTreeMap::new(),
        })
    }

    pub fn with_advisor(mut self, advisor: Arc<dyn SizeAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn config(&self) -> &Arc<StrategyConfig> {
        &self.config
    }

    pub fn push_candle(&mut self, instrument: &str, candle: &Candle) -> Result<StepOutput, InputError> {
        let pipeline = match self.pipelines.entry(instrument.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut pipeline = Pipeline::with_aggregator(
                    instrument.to_string(),
                    Arc::clone(&self.config),
                    self.aggregator.clone(),
                );
                if let Some(advisor) = &self.advisor {
                    pipeline = pipeline.with_advisor(Arc::clone(advisor));
                }
                entry.insert(pipeline)
            }
        };
        pipeline.push_candle(candle)
    }

    pub fn pipeline(&self, instrument: &str) -> Option<&Pipeline> {
        self.pipelines.get(instrument)
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.pipelines.keys().map(String::as_str)
    }

    pub fn into_pipelines(self) -> BTreeMap<Instrument, Pipeline> {
        self.pipelines
    }
}
