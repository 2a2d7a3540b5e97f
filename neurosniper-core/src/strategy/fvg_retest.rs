//! Fair value gap retest: price trading back into an earlier gap in the
//! gap's direction. Stop sits just beyond the far edge of the gap.

use super::{Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::names;
use crate::patterns::PatternKind;

#[derive(Debug, Clone)]
pub struct FvgRetest {
    min_strength: f64,
    stop_buffer_atr: f64,
    reward_ratio: f64,
}

impl FvgRetest {
    pub fn new(min_strength: f64, stop_buffer_atr: f64, reward_ratio: f64) -> Self {
        Self {
            min_strength,
            stop_buffer_atr,
            reward_ratio,
        }
    }
}

impl Default for FvgRetest {
    fn default() -> Self {
        Self::new(0.2, 0.25, 2.0)
    }
}

impl Strategy for FvgRetest {
    fn name(&self) -> &str {
        "fvg_retest"
    }

    fn required_features(&self) -> Vec<String> {
        vec![names::ATR.to_string()]
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let close = ctx.close()?;
        let atr = ctx.feature(names::ATR)?;
        // gaps formed on this very candle are not a retest
        let best = ctx
            .patterns
            .iter()
            .filter(|p| matches!(p.kind, PatternKind::FairValueGap { .. }))
            .filter(|p| p.timeframe == ctx.features.timeframe)
            .filter(|p| p.detected_at < ctx.features.anchor)
            .filter(|p| p.strength >= self.min_strength && p.contains(close))
            .max_by(|a, b| a.strength.total_cmp(&b.strength));
        let Some(gap) = best else {
            return Ok(None);
        };
        let direction = gap.bias();
        let stop = match direction {
            Direction::Long => gap.low - atr * self.stop_buffer_atr,
            Direction::Short => gap.high + atr * self.stop_buffer_atr,
            Direction::Flat => return Ok(None),
        };
        let target = close + direction.sign() * (close - stop).abs() * self.reward_ratio;
        let confidence = 0.5 + 0.4 * gap.strength;
        ctx.signal(self.name(), direction, confidence, Some(stop), Some(target))
            .map(Some)
    }
}
