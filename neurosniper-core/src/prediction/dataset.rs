//! Labelled samples for retraining, built from closed candles.

use serde::{Deserialize, Serialize};

use crate::domain::{Candle, Direction};
use crate::features::engine::compute_features;
use crate::indicators::Indicator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub inputs: Vec<f64>,
    pub label: Direction,
}

/// Long above +threshold percent, short below −threshold, flat otherwise.
pub fn label_for_return(forward_return_pct: f64, threshold_pct: f64) -> Direction {
    if forward_return_pct > threshold_pct {
        Direction::Long
    } else if forward_return_pct < -threshold_pct {
        Direction::Short
    } else {
        Direction::Flat
    }
}

/// One sample per candle whose features are all available and whose
/// `horizon`-candle forward close exists.
///
/// Inputs at candle i only use candles up to i; the label uses candle
/// i + horizon, which is why this is a training-time tool and never part
/// of a decision cycle.
pub fn build_samples(
    candles: &[Candle],
    indicators: &[Box<dyn Indicator>],
    feature_names: &[String],
    horizon: usize,
    threshold_pct: f64,
) -> Vec<LabeledSample> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };
    let window = indicators.iter().map(|i| i.window()).max().unwrap_or(1);
    let mut samples = Vec::new();
    for i in 0..candles.len().saturating_sub(horizon) {
        let start = (i + 1).saturating_sub(window);
        let fs = compute_features(&first.instrument, first.timeframe, indicators, &candles[start..=i]);
        let inputs: Option<Vec<f64>> = feature_names.iter().map(|n| fs.get(n)).collect();
        let Some(inputs) = inputs else {
            continue;
        };
        let now = candles[i].close;
        if now <= 0.0 {
            continue;
        }
        let ret = (candles[i + horizon].close - now) / now * 100.0;
        samples.push(LabeledSample {
            inputs,
            label: label_for_return(ret, threshold_pct),
        });
    }
    samples
}
