//! Exponential Moving Average (EMA) and the fast/slow EMA spread.
//!
//! alpha = 2 / (period + 1). Seeded with the SMA of the first `period`
//! closes of the trailing window, then smoothed forward to the anchor.
//! Window: 4 × period.

use super::{trailing, Indicator};
use crate::domain::Candle;

const WINDOW_MULTIPLE: usize = 4;

/// EMA of `values`, seeded on the first `period` entries. `None` if too short.
pub fn ema_last(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = values[..period].iter().sum::<f64>() / period as f64;
    Some(
        values[period..]
            .iter()
            .fold(seed, |ema, &v| alpha * v + (1.0 - alpha) * ema),
    )
}

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "EMA period must be >= 1");
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.period
    }

    fn window(&self) -> usize {
        self.period * WINDOW_MULTIPLE
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = trailing(candles, self.window()).iter().map(|c| c.close).collect();
        ema_last(&closes, self.period)
    }
}

/// (EMA(fast) − EMA(slow)) / EMA(slow) × 100, both over the slow window.
#[derive(Debug, Clone)]
pub struct EmaSpread {
    fast: usize,
    slow: usize,
    name: String,
}

impl EmaSpread {
    pub fn new(fast: usize, slow: usize) -> Self {
        assert!(fast >= 1 && slow > fast, "EMA spread needs 1 <= fast < slow");
        Self {
            fast,
            slow,
            name: format!("ema_spread_{fast}_{slow}"),
        }
    }
}

impl Indicator for EmaSpread {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.slow
    }

    fn window(&self) -> usize {
        self.slow * WINDOW_MULTIPLE
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        let closes: Vec<f64> = trailing(candles, self.window()).iter().map(|c| c.close).collect();
        let slow = ema_last(&closes, self.slow)?;
        // fast EMA over the same span the slow one sees
        let fast = ema_last(&closes, self.fast)?;
        if slow == 0.0 {
            return None;
        }
        Some((fast - slow) / slow * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn ema_seed_equals_sma() {
        let candles = make_candles(&[2.0, 4.0, 6.0]);
        assert_approx(Ema::new(3).value(&candles).unwrap(), 4.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_recursion() {
        // seed 4.0, alpha 0.5, next close 8 → 6.0
        let candles = make_candles(&[2.0, 4.0, 6.0, 8.0]);
        assert_approx(Ema::new(3).value(&candles).unwrap(), 6.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_constant_series() {
        let candles = make_candles(&[50.0; 40]);
        assert_approx(Ema::new(9).value(&candles).unwrap(), 50.0, DEFAULT_EPSILON);
    }

    #[test]
    fn ema_depends_only_on_trailing_window() {
        let mut a: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let b_prefix: Vec<f64> = (0..30).map(|i| 500.0 - i as f64).collect();
        let tail: Vec<f64> = (0..12).map(|i| 200.0 + (i % 3) as f64).collect();
        a.extend(&tail);
        let mut b = b_prefix;
        b.extend(&tail);
        let ema = Ema::new(3);
        assert_eq!(
            ema.value(&make_candles(&a)).unwrap().to_bits(),
            ema.value(&make_candles(&b)).unwrap().to_bits()
        );
    }

    #[test]
    fn spread_sign_follows_trend() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();
        let spread = EmaSpread::new(9, 21);
        assert!(spread.value(&make_candles(&rising)).unwrap() > 0.0);
        assert!(spread.value(&make_candles(&falling)).unwrap() < 0.0);
        assert!(spread.value(&make_candles(&rising[..20])).is_none());
    }
}
