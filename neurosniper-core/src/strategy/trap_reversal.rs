//! Trap reversal: fade a freshly detected stop-hunt.
//!
//! Trades against the hunted side on the candle the trap is detected, with
//! the stop beyond the sweep's extreme.

use super::{Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::names;
use crate::patterns::PatternKind;

#[derive(Debug, Clone)]
pub struct TrapReversal {
    min_strength: f64,
    stop_buffer_atr: f64,
    reward_ratio: f64,
}

impl TrapReversal {
    pub fn new(min_strength: f64, stop_buffer_atr: f64, reward_ratio: f64) -> Self {
        Self {
            min_strength,
            stop_buffer_atr,
            reward_ratio,
        }
    }
}

impl Default for TrapReversal {
    fn default() -> Self {
        Self::new(0.3, 0.5, 2.0)
    }
}

impl Strategy for TrapReversal {
    fn name(&self) -> &str {
        "trap_reversal"
    }

    fn required_features(&self) -> Vec<String> {
        vec![names::ATR.to_string()]
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let fresh = ctx
            .patterns
            .iter()
            .filter(|p| p.detected_at == ctx.features.anchor)
            .filter(|p| p.timeframe == ctx.features.timeframe)
            .filter(|p| matches!(p.kind, PatternKind::Trap { .. }))
            .filter(|p| p.strength >= self.min_strength)
            .max_by(|a, b| a.strength.total_cmp(&b.strength));
        let Some(trap) = fresh else {
            return Ok(None);
        };
        let close = ctx.close()?;
        let atr = ctx.feature(names::ATR)?;
        let direction = trap.bias();
        let stop = match direction {
            Direction::Short => trap.high + atr * self.stop_buffer_atr,
            Direction::Long => trap.low - atr * self.stop_buffer_atr,
            Direction::Flat => return Ok(None),
        };
        let target = close + direction.sign() * (close - stop).abs() * self.reward_ratio;
        let confidence = 0.55 + 0.35 * trap.strength;
        ctx.signal(self.name(), direction, confidence, Some(stop), Some(target))
            .map(Some)
    }
}
