//! Cross-instrument confirmation: trade with a reference index when it is
//! moving and this instrument's own trend agrees.
//!
//! Reads the reference only through the cycle's immutable market snapshot.

use super::{atr_levels, Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::names;

#[derive(Debug, Clone)]
pub struct Correlation {
    reference: String,
    min_change_pct: f64,
    /// Views older than this many minutes before the anchor are ignored.
    max_age_minutes: i64,
    stop_atr: f64,
    reward_ratio: f64,
}

impl Correlation {
    pub fn new(reference: impl Into<String>, min_change_pct: f64, max_age_minutes: i64) -> Self {
        Self {
            reference: reference.into().to_ascii_uppercase(),
            min_change_pct,
            max_age_minutes,
            stop_atr: 1.5,
            reward_ratio: 2.0,
        }
    }
}

impl Default for Correlation {
    fn default() -> Self {
        Self::new("BANKNIFTY", 0.2, 15)
    }
}

impl Strategy for Correlation {
    fn name(&self) -> &str {
        "correlation"
    }

    fn required_features(&self) -> Vec<String> {
        vec![names::EMA_SPREAD.to_string(), names::ATR.to_string()]
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        if ctx.features.instrument == self.reference {
            return Ok(None);
        }
        let Some(view) = ctx.market.get(&self.reference) else {
            return Ok(None);
        };
        let age = (ctx.features.anchor - view.anchor).num_minutes();
        if !(0..=self.max_age_minutes).contains(&age) {
            return Ok(None);
        }
        let direction = view.trend;
        if !direction.is_directional()
            || view.change_pct.abs() < self.min_change_pct
            || view.change_pct.signum() != direction.sign()
        {
            return Ok(None);
        }
        let own = ctx.feature(names::EMA_SPREAD)?;
        if own.signum() != direction.sign() {
            return Ok(None);
        }
        let confidence = 0.55 + (view.change_pct.abs() / (5.0 * self.min_change_pct)).min(0.3);
        let (stop, target) = atr_levels(
            ctx.close()?,
            ctx.feature(names::ATR)?,
            direction,
            self.stop_atr,
            self.reward_ratio,
        );
        ctx.signal(self.name(), direction, confidence, Some(stop), Some(target))
            .map(Some)
    }
}
