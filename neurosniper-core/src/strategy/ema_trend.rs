//! EMA trend: fast EMA above slow EMA with price above VWAP is long, the
//! mirror image is short. Confidence scales with the spread.

use super::{atr_levels, Strategy, StrategyContext, StrategyError};
use crate::domain::{CandidateSignal, Direction};
use crate::indicators::{names, Ema, Indicator};

#[derive(Debug, Clone)]
pub struct EmaTrend {
    fast: usize,
    slow: usize,
    min_spread_pct: f64,
    stop_atr: f64,
    reward_ratio: f64,
    fast_name: String,
    slow_name: String,
}

impl EmaTrend {
    pub fn new(fast: usize, slow: usize, min_spread_pct: f64, stop_atr: f64, reward_ratio: f64) -> Self {
        assert!(fast >= 1 && slow > fast, "EMA trend needs 1 <= fast < slow");
        Self {
            fast,
            slow,
            min_spread_pct,
            stop_atr,
            reward_ratio,
            fast_name: format!("ema_{fast}"),
            slow_name: format!("ema_{slow}"),
        }
    }
}

impl Default for EmaTrend {
    fn default() -> Self {
        Self::new(9, 21, 0.05, 1.5, 2.0)
    }
}

impl Strategy for EmaTrend {
    fn name(&self) -> &str {
        "ema_trend"
    }

    fn required_features(&self) -> Vec<String> {
        vec![
            self.fast_name.clone(),
            self.slow_name.clone(),
            names::VWAP.to_string(),
            names::ATR.to_string(),
        ]
    }

    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(Ema::new(self.fast)), Box::new(Ema::new(self.slow))]
    }

    fn generate_signal(
        &self,
        ctx: &StrategyContext<'_>,
    ) -> Result<Option<CandidateSignal>, StrategyError> {
        let fast = ctx.feature(&self.fast_name)?;
        let slow = ctx.feature(&self.slow_name)?;
        let vwap = ctx.feature(names::VWAP)?;
        let close = ctx.close()?;
        if slow <= 0.0 {
            return Ok(None);
        }
        let spread = (fast - slow) / slow * 100.0;
        if spread.abs() < self.min_spread_pct {
            return Ok(None);
        }
        let direction = if spread > 0.0 && close > vwap {
            Direction::Long
        } else if spread < 0.0 && close < vwap {
            Direction::Short
        } else {
            return Ok(None);
        };
        let confidence = (0.55 + spread.abs() / (10.0 * self.min_spread_pct)).min(0.9);
        let (stop, target) = atr_levels(
            close,
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

    fn run(fast: f64, slow: f64, close: f64, vwap: f64) -> Option<CandidateSignal> {
        let fs = features(&[
            ("close", close),
            ("ema_9", fast),
            ("ema_21", slow),
            ("vwap_20", vwap),
            ("atr_14", 10.0),
        ]);
        let market = MarketSnapshot::empty();
        EmaTrend::default()
            .generate_signal(&ctx(&fs, &[], None, &market))
            .unwrap()
    }

    #[test]
    fn aligned_uptrend_is_long() {
        let s = run(10_020.0, 10_000.0, 10_030.0, 10_010.0).unwrap();
        assert_eq!(s.direction, Direction::Long);
        assert!(s.confidence > 0.55 && s.confidence <= 0.9);
    }

    #[test]
    fn price_below_vwap_vetoes_long() {
        assert!(run(10_020.0, 10_000.0, 10_000.0, 10_010.0).is_none());
    }

    #[test]
    fn downtrend_is_short() {
        let s = run(9_980.0, 10_000.0, 9_970.0, 9_990.0).unwrap();
        assert_eq!(s.direction, Direction::Short);
        assert_eq!(s.stop, Some(9_985.0));
    }

    #[test]
    fn tiny_spread_is_ignored() {
        assert!(run(10_001.0, 10_000.0, 10_030.0, 10_010.0).is_none());
    }
}
