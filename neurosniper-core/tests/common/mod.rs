//! Shared fixtures for integration tests.

#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use neurosniper_core::domain::{resample, CandidateSignal, Candle, Direction, ModelVersion, Timeframe};
use neurosniper_core::features::FeatureSet;
use neurosniper_core::prediction::{ModelError, Prediction, PredictionModel};
use neurosniper_core::strategy::{Strategy, StrategyContext, StrategyError};

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 5, 6)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap()
}

/// Pseudo-random walk of 5-minute candles (LCG, no external seed).
pub fn walk(instrument: &str, n: usize) -> Vec<Candle> {
    let mut price = 22_000.0;
    (0..n)
        .map(|i| {
            let seed = (i as u64).wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let change = ((seed >> 33) % 200) as f64 - 100.0;
            let open = price;
            price = (price + change * 0.4).max(1_000.0);
            let close = price;
            Candle {
                instrument: instrument.into(),
                timeframe: Timeframe::M5,
                timestamp: t0() + chrono::Duration::minutes(5 * i as i64),
                open,
                high: open.max(close) + 6.0 + (seed % 7) as f64,
                low: open.min(close) - 6.0 - (seed % 5) as f64,
                close,
                volume: 10_000.0 + ((seed >> 40) % 5_000) as f64,
                open_interest: None,
            }
        })
        .collect()
}

/// Primary 15m bars interleaved after their 5m constituents.
pub fn interleave(five: &[Candle]) -> Vec<Candle> {
    let fifteen = resample(five, Timeframe::M15);
    let mut out = Vec::new();
    for (j, bar) in fifteen.into_iter().enumerate() {
        out.extend(five[3 * j..3 * j + 3].iter().cloned());
        out.push(bar);
    }
    out
}

pub struct Fixed {
    pub name: &'static str,
    pub direction: Direction,
    pub confidence: f64,
}

impl Strategy for Fixed {
    fn name(&self) -> &str {
        self.name
    }

    fn required_features(&self) -> Vec<String> {
        Vec::new()
    }

    fn generate_signal(&self, ctx: &StrategyContext<'_>) -> Result<Option<CandidateSignal>, StrategyError> {
        let close = ctx.close()?;
        let sign = self.direction.sign();
        ctx.signal(self.name, self.direction, self.confidence, Some(close - sign * 30.0), Some(close + sign * 60.0))
            .map(Some)
    }
}

pub struct ConstantModel {
    pub version: u64,
    pub p_long: f64,
}

impl PredictionModel for ConstantModel {
    fn version(&self) -> ModelVersion {
        ModelVersion(self.version)
    }

    fn features(&self) -> &[String] {
        &[]
    }

    fn predict(&self, _features: &FeatureSet) -> Result<Prediction, ModelError> {
        let p_short = (1.0 - self.p_long) / 2.0;
        Ok(Prediction {
            p_long: self.p_long,
            p_short,
            p_flat: 1.0 - self.p_long - p_short,
            confidence: self.p_long,
            model_version: ModelVersion(self.version),
        })
    }
}
