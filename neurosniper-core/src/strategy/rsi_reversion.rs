//! RSI mean reversion: long below `oversold`, short above `overbought`.
//!
//! Confidence grows from 0.5 at the threshold to 1.0 at the extreme (0 or
//! 100). Stop and target are ATR multiples.

use super::{atr_levels, Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::{names, Atr, Indicator, Rsi};

#[derive(Debug, Clone)]
pub struct RsiReversion {
    period: usize,
    oversold: f64,
    overbought: f64,
    stop_atr: f64,
    reward_ratio: f64,
    rsi_name: String,
}

impl RsiReversion {
    pub fn new(period: usize, oversold: f64, overbought: f64, stop_atr: f64, reward_ratio: f64) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        assert!(
            0.0 < oversold && oversold < overbought && overbought < 100.0,
            "RSI thresholds must satisfy 0 < oversold < overbought < 100"
        );
        Self {
            period,
            oversold,
            overbought,
            stop_atr,
            reward_ratio,
            rsi_name: format!("rsi_{period}"),
        }
    }
}

impl Default for RsiReversion {
    fn default() -> Self {
        Self::new(14, 30.0, 70.0, 1.5, 2.0)
    }
}

impl Strategy for RsiReversion {
    fn name(&self) -> &str {
        "rsi_reversion"
    }

    fn required_features(&self) -> Vec<String> {
        vec![self.rsi_name.clone(), names::ATR.to_string()]
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Rsi::new(self.period)), Box::new(Atr::new(14))]
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let rsi = ctx.feature(&self.rsi_name)?;
        let (direction, confidence) = if rsi < self.oversold {
            (Direction::Long, 0.5 + 0.5 * (self.oversold - rsi) / self.oversold)
        } else if rsi > self.overbought {
            (
                Direction::Short,
                0.5 + 0.5 * (rsi - self.overbought) / (100.0 - self.overbought),
            )
        } else {
            return Ok(None);
        };
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketSnapshot;
    use crate::strategy::test_support::{ctx, features};

    fn run(rsi: f64) -> Option<CandidateSignal> {
        let fs = features(&[("close", 22_000.0), ("rsi_14", rsi), ("atr_14", 20.0)]);
        let market = MarketSnapshot::empty();
        RsiReversion::default()
            .generate_signal(&ctx(&fs, &[], None, &market))
            .unwrap()
    }

    #[test]
    fn oversold_goes_long() {
        let s = run(20.0).unwrap();
        assert_eq!(s.direction, Direction::Long);
        assert!((s.confidence - (0.5 + 0.5 * 10.0 / 30.0)).abs() < 1e-12);
        assert_eq!(s.stop, Some(21_970.0));
        assert_eq!(s.target, Some(22_060.0));
        assert_eq!(s.strategy, "rsi_reversion");
    }

    #[test]
    fn overbought_goes_short() {
        let s = run(85.0).unwrap();
        assert_eq!(s.direction, Direction::Short);
        assert!((s.confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn neutral_band_is_silent() {
        assert!(run(50.0).is_none());
        assert!(run(30.0).is_none());
        assert!(run(70.0).is_none());
    }
}
