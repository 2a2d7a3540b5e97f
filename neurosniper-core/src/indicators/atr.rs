//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! Wilder smoothing (alpha = 1/period) seeded on the first `period` true
//! ranges of the trailing window.
//! Needs period + 1 candles; window: 5 × period + 1.

use super::{trailing, Indicator};
use crate::domain::Candle;

/// True range of `curr` given the previous candle.
pub fn true_range(prev: &Candle, curr: &Candle) -> f64 {
    let pc = prev.close;
    (curr.high - curr.low)
        .max((curr.high - pc).abs())
        .max((curr.low - pc).abs())
}

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.period + 1
    }

    fn window(&self) -> usize {
        self.period * 5 + 1
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let window = trailing(candles, self.window());
        let tr: Vec<f64> = window.windows(2).map(|w| true_range(&w[0], &w[1])).collect();
        let seed = tr[..self.period].iter().sum::<f64>() / self.period as f64;
        let alpha = 1.0 / self.period as f64;
        Some(
            tr[self.period..]
                .iter()
                .fold(seed, |atr, &v| alpha * v + (1.0 - alpha) * atr),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn true_range_uses_gap_from_prev_close() {
        let mut candles = make_candles(&[100.0, 100.0]);
        candles[1].high = 110.0;
        candles[1].low = 105.0;
        assert_approx(true_range(&candles[0], &candles[1]), 10.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_constant_range() {
        // flat closes → every TR = high - low = 2.0
        let candles = make_candles(&[100.0; 20]);
        assert_approx(Atr::new(5).value(&candles).unwrap(), 2.0, DEFAULT_EPSILON);
    }

    #[test]
    fn atr_needs_period_plus_one() {
        let candles = make_candles(&[100.0; 5]);
        assert!(Atr::new(5).value(&candles).is_none());
        assert!(Atr::new(5).value(&make_candles(&[100.0; 6])).is_some());
    }
}
