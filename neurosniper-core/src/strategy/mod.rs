//! Strategy Set: independent rules that turn features, patterns and the
//! model's view into candidate signals.
//!
//! Strategies are stateless and see only the cycle's [`StrategyContext`];
//! they cannot reach positions or other lanes' mutable state. A strategy
//! that errors or panics loses its signal for the cycle and nothing else
//! (see [`StrategySet::run`]).

pub mod correlation;
pub mod ema_trend;
pub mod factory;
pub mod fvg_retest;
pub mod model_follow;
pub mod oi_skew;
pub mod rsi_reversion;
pub mod set;
pub mod trap_reversal;

pub use correlation::Correlation;
pub use ema_trend::EmaTrend;
pub use factory::{create_strategy, FactoryError, StrategyConfig};
pub use fvg_retest::FvgRetest;
pub use model_follow::ModelFollow;
pub use oi_skew::OiSkewStrategy;
pub use rsi_reversion::RsiReversion;
pub use set::{StrategyRun, StrategySet};
pub use trap_reversal::TrapReversal;

use thiserror::Error;

use crate::domain::{CandidateSignal, Direction, MarketSnapshot};
use crate::features::FeatureSet;
use crate::indicators::{names, Indicator};
use crate::patterns::Pattern;
use crate::prediction::Prediction;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StrategyError {
    #[error("feature '{0}' unavailable")]
    MissingInput(String),

    #[error("{0}")]
    Internal(String),
}

/// Everything a strategy may read for one cycle.
#[derive(Debug, Clone, Copy)]
pub struct StrategyContext<'a> {
    pub features: &'a FeatureSet,
    pub patterns: &'a [Pattern],
    pub prediction: Option<&'a Prediction>,
    pub market: &'a MarketSnapshot,
    /// A fresh OI snapshot fed this cycle's patterns.
    pub oi_fresh: bool,
}

impl<'a> StrategyContext<'a> {
    pub fn feature(&self, name: &str) -> Result<f64, StrategyError> {
        self.features
            .get(name)
            .ok_or_else(|| StrategyError::MissingInput(name.to_string()))
    }

    pub fn close(&self) -> Result<f64, StrategyError> {
        self.feature(names::CLOSE)
    }

    /// A signal stamped with this cycle's instrument, timeframe and anchor.
    pub fn signal(
        &self,
        strategy: &str,
        direction: Direction,
        confidence: f64,
        stop: Option<f64>,
        target: Option<f64>,
    ) -> Result<CandidateSignal, StrategyError> {
        Ok(CandidateSignal {
            instrument: self.features.instrument.clone(),
            timeframe: self.features.timeframe,
            timestamp: self.features.anchor,
            strategy: strategy.to_string(),
            direction,
            entry: self.close()?,
            target,
            stop,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// Stop and target at ATR multiples from `entry`.
pub fn atr_levels(
    entry: f64,
    atr: f64,
    direction: Direction,
    stop_atr: f64,
    reward_ratio: f64,
) -> (f64, f64) {
    let risk = atr * stop_atr;
    let sign = direction.sign();
    (entry - sign * risk, entry + sign * risk * reward_ratio)
}

/// Trait for strategies.
pub trait Strategy: Send + Sync {
    /// Unique name (e.g., "rsi_reversion").
    fn name(&self) -> &str;

    /// Features that must be available for the strategy to run.
    fn required_features(&self) -> Vec<String>;

    /// Indicators the strategy needs beyond the standard set.
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        Vec::new()
    }

    fn needs_prediction(&self) -> bool {
        false
    }

    fn needs_oi(&self) -> bool {
        false
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::{NaiveDate, NaiveDateTime};

    pub fn anchor() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 6)
            .unwrap()
            .and_hms_opt(11, 0, 0)
            .unwrap()
    }

    pub fn features(values: &[(&str, f64)]) -> FeatureSet {
        let mut fs = FeatureSet::new("NIFTY", Timeframe::M15, anchor());
        for (name, v) in values {
            fs.set(*name, *v);
        }
        fs
    }

    pub fn ctx<'a>(
        features: &'a FeatureSet,
        patterns: &'a [Pattern],
        prediction: Option<&'a Prediction>,
        market: &'a MarketSnapshot,
    ) -> StrategyContext<'a> {
        StrategyContext {
            features,
            patterns,
            prediction,
            market,
            oi_fresh: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atr_levels_are_mirrored() {
        let (stop, target) = atr_levels(100.0, 2.0, Direction::Long, 1.5, 2.0);
        assert_eq!((stop, target), (97.0, 106.0));
        let (stop, target) = atr_levels(100.0, 2.0, Direction::Short, 1.5, 2.0);
        assert_eq!((stop, target), (103.0, 94.0));
    }
}
