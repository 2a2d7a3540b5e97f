//! Follow the prediction model when it is decisive enough.

use super::{atr_levels, Strategy, StrategyContext, StrategyError};
use crate::domain::CandidateSignal;
use crate::indicators::names;

#[derive(Debug, Clone)]
pub struct ModelFollow {
    min_probability: f64,
    stop_atr: f64,
    reward_ratio: f64,
}

impl ModelFollow {
    pub fn new(min_probability: f64, stop_atr: f64, reward_ratio: f64) -> Self {
        Self {
            min_probability,
            stop_atr,
            reward_ratio,
        }
    }
}

impl Default for ModelFollow {
    fn default() -> Self {
        Self::new(0.6, 1.5, 2.0)
    }
}

impl Strategy for ModelFollow {
    fn name(&self) -> &str {
        "model_follow"
    }

    fn required_features(&self) -> Vec<String> {
        vec![names::ATR.to_string()]
    }

    fn needs_prediction(&self) -> bool {
        true
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let Some(prediction) = ctx.prediction else {
            return Ok(None);
        };
        let direction = prediction.direction();
        let p = prediction.probability(direction);
        if !direction.is_directional() || p < self.min_probability {
            return Ok(None);
        }
        let (stop, target) = atr_levels(
            ctx.close()?,
            ctx.feature(names::ATR)?,
            direction,
            self.stop_atr,
            self.reward_ratio,
        );
        ctx.signal(self.name(), direction, p, Some(stop), Some(target))
            .map(Some)
    }
}
