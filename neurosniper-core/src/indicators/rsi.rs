//! Relative Strength Index (RSI).
//!
//! Wilder smoothing of average gains and losses, seeded on the first
//! `period` changes of the trailing window.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Needs period + 1 candles; window: 5 × period + 1.
//! Edge cases: avg_loss == 0 → 100; avg_gain == 0 → 0; no movement → 50.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "RSI period must be >= 1");
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
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
        let changes: Vec<f64> = window.windows(2).map(|w| w[1].close - w[0].close).collect();

        let (mut avg_gain, mut avg_loss) = changes[..self.period]
            .iter()
            .fold((0.0, 0.0), |(g, l), &ch| {
                if ch > 0.0 {
                    (g + ch, l)
                } else {
                    (g, l - ch)
                }
            });
        avg_gain /= self.period as f64;
        avg_loss /= self.period as f64;

        let alpha = 1.0 / self.period as f64;
        for &ch in &changes[self.period..] {
            avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
        }
        Some(rsi_from_averages(avg_gain, avg_loss))
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
