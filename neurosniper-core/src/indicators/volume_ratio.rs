//! Volume ratio: latest volume over the mean volume of the preceding `period` candles.
//!
//! Needs period + 1 candles.

use super::{trailing, Indicator};
use crate::domain::Candle;

#[derive(Debug, Clone)]
pub struct VolumeRatio {
    period: usize,
    name: String,
}

impl VolumeRatio {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "volume ratio period must be >= 1");
        Self {
            period,
            name: format!("volume_ratio_{period}"),
        }
    }
}

impl Indicator for VolumeRatio {
    fn name(&self) -> &str {
        &self.name
    }

    fn min_candles(&self) -> usize {
        self.period + 1
    }

    fn value(&self, candles: &[Candle]) -> Option<f64> {
        if candles.len() < self.min_candles() {
            return None;
        }
        let window = trailing(candles, self.min_candles());
        let (last, prior) = window.split_last()?;
        let mean = prior.iter().map(|c| c.volume).sum::<f64>() / self.period as f64;
        if mean <= 0.0 {
            None
        } else {
            Some(last.volume / mean)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn spike_shows_as_ratio() {
        let mut candles = make_candles(&[100.0; 4]);
        candles[3].volume = 2500.0;
        assert_approx(VolumeRatio::new(3).value(&candles).unwrap(), 2.5, DEFAULT_EPSILON);
    }
}
