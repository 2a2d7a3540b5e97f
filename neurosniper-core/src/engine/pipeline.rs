//! The shared, immutable part of the decision pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::positions::FillModel;
use crate::aggregate::{Aggregator, AggregatorConfig};
use crate::domain::{Timeframe, TradingMode};
use crate::features::engine::IndicatorSet;
use crate::indicators::{standard_set, Indicator};
use crate::patterns::{PatternConfig, PatternDetector};
use crate::risk::{RiskGate, RiskParams, SessionRules};
use crate::strategy::{FactoryError, StrategyConfig, StrategySet};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Factory(#[from] FactoryError),

    #[error("cross-check timeframe {cross_check} must be finer than primary {primary} and divide it")]
    Timeframes {
        primary: Timeframe,
        cross_check: Timeframe,
    },
}

/// Everything that shapes a decision, shared by every lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub primary: Timeframe,
    pub cross_check: Timeframe,
    pub mode: TradingMode,
    pub strategies: Vec<StrategyConfig>,
    pub patterns: PatternConfig,
    pub aggregator: AggregatorConfig,
    pub risk: RiskParams,
    pub session: SessionRules,
    pub fill: FillModel,
    /// OI snapshots older than this are treated as stale.
    pub oi_max_age_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            primary: Timeframe::M15,
            cross_check: Timeframe::M5,
            mode: TradingMode::DryRun,
            strategies: StrategyConfig::defaults(),
            patterns: PatternConfig::default(),
            aggregator: AggregatorConfig::default(),
            risk: RiskParams::default(),
            session: SessionRules::default(),
            fill: FillModel::default(),
            oi_max_age_minutes: 30,
        }
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    indicators: IndicatorSet,
    detectors: Vec<Box<dyn PatternDetector>>,
    strategies: StrategySet,
    aggregator: Aggregator,
    gate: RiskGate,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let strategies = StrategySet::from_configs(&config.strategies)?;
        Self::with_strategies(config, strategies)
    }

    /// Build around an already-assembled strategy set; `config.strategies`
    /// is ignored.
    pub fn with_strategies(config: PipelineConfig, strategies: StrategySet) -> Result<Self, PipelineError> {
        if config.cross_check >= config.primary || !config.primary.is_multiple_of(config.cross_check) {
            return Err(PipelineError::Timeframes {
                primary: config.primary,
                cross_check: config.cross_check,
            });
        }
        let indicators = merge_indicators(standard_set(), strategies.indicators());
        Ok(Self {
            indicators: Arc::new(indicators),
            detectors: config.patterns.build(),
            aggregator: Aggregator::new(config.aggregator.clone()),
            gate: RiskGate::new(config.risk.clone(), config.session.clone()),
            strategies,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn indicators(&self) -> &IndicatorSet {
        &self.indicators
    }

    pub fn detectors(&self) -> &[Box<dyn PatternDetector>] {
        &self.detectors
    }

    pub fn strategies(&self) -> &StrategySet {
        &self.strategies
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn gate(&self) -> &RiskGate {
        &self.gate
    }

    /// Candles of history the detectors look at.
    pub fn pattern_history(&self) -> usize {
        self.detectors.iter().map(|d| d.lookback()).max().unwrap_or(0) + 1
    }
}

/// Standard indicators plus strategy extras, first name wins.
fn merge_indicators(
    standard: Vec<Box<dyn Indicator>>,
    extra: Vec<Box<dyn Indicator>>,
) -> Vec<Box<dyn Indicator>> {
    let mut seen = BTreeSet::new();
    standard
        .into_iter()
        .chain(extra)
        .filter(|i| seen.insert(i.name().to_string()))
        .collect()
}
