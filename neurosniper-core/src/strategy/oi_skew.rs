//! Trade the option chain's positioning: a PCR skew sets the direction,
//! buildup strikes set the stop (support/resistance) and target.

use super::{atr_levels, Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::names;
use crate::patterns::{OiLevel, PatternKind};

#[derive(Debug, Clone)]
pub struct OiSkewStrategy {
    min_strength: f64,
    stop_atr: f64,
    reward_ratio: f64,
    /// A buildup level further than this many ATRs away is ignored.
    max_level_atr: f64,
}

impl OiSkewStrategy {
    pub fn new(min_strength: f64, stop_atr: f64, reward_ratio: f64, max_level_atr: f64) -> Self {
        Self {
            min_strength,
            stop_atr,
            reward_ratio,
            max_level_atr,
        }
    }

    fn level(&self, ctx: &StrategyContext<'_>, wanted: OiLevel) -> Option<f64> {
        ctx.patterns.iter().find_map(|p| match p.kind {
            PatternKind::OiBuildup { level, .. } if level == wanted => Some(p.low),
            _ => None,
        })
    }
}

impl Default for OiSkewStrategy {
    fn default() -> Self {
        Self::new(0.15, 1.5, 2.0, 3.0)
    }
}

impl Strategy for OiSkewStrategy {
    fn name(&self) -> &str {
        "oi_skew"
    }

    fn required_features(&self) -> Vec<String> {
        vec![names::ATR.to_string()]
    }

    fn needs_oi(&self) -> bool {
        true
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let skew = ctx.patterns.iter().find_map(|p| match p.kind {
            PatternKind::OiSkew { bias, .. } if p.strength >= self.min_strength => Some((bias, p.strength)),
            _ => None,
        });
        let Some((direction, strength)) = skew else {
            return Ok(None);
        };
        if !direction.is_directional() {
            return Ok(None);
        }
        let close = ctx.close()?;
        let atr = ctx.feature(names::ATR)?;
        let (mut stop, mut target) = atr_levels(close, atr, direction, self.stop_atr, self.reward_ratio);
        let reach = atr * self.max_level_atr;

        let (protect, aim) = match direction {
            Direction::Long => (OiLevel::Support, OiLevel::Resistance),
            _ => (OiLevel::Resistance, OiLevel::Support),
        };
        if let Some(level) = self.level(ctx, protect) {
            let behind = (close - level) * direction.sign();
            if behind > 0.0 && behind <= reach {
                stop = level - direction.sign() * atr * 0.25;
            }
        }
        if let Some(level) = self.level(ctx, aim) {
            let ahead = (level - close) * direction.sign();
            if ahead > 0.0 {
                target = level;
            }
        }
        let confidence = 0.5 + 0.4 * strength.min(1.0);
        ctx.signal(self.name(), direction, confidence, Some(stop), Some(target))
            .map(Some)
    }
}
