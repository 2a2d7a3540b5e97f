//! Open-interest analysis: put/call skew and strike buildup around spot.
//!
//! PCR = Σ put OI / Σ call OI over strikes within `band_pct` of spot (the
//! anchor close). Heavy put writing (high PCR) reads as support, so PCR
//! above `bullish_pcr` is a long skew and PCR below `bearish_pcr` a short
//! skew. Buildup: the largest put OI strike at or below spot is support,
//! the largest call OI strike at or above spot is resistance.

use serde::{Deserialize, Serialize};

use super::{DetectionInput, OiLevel, Pattern, PatternDetector, PatternKind};
use crate::domain::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OiConfig {
    pub band_pct: f64,
    pub bullish_pcr: f64,
    pub bearish_pcr: f64,
    pub expiry_bars: usize,
}

impl Default for OiConfig {
    fn default() -> Self {
        Self {
            band_pct: 2.0,
            bullish_pcr: 1.2,
            bearish_pcr: 0.8,
            expiry_bars: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OiAnalyzer {
    config: OiConfig,
}

impl OiAnalyzer {
    pub fn new(config: OiConfig) -> Self {
        Self { config }
    }
}

impl PatternDetector for OiAnalyzer {
    fn name(&self) -> &str {
        "oi"
    }

    fn lookback(&self) -> usize {
        1
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Pattern> {
        let (Some(snapshot), Some(last), Some(anchor)) =
            (input.oi, input.candles.last(), input.anchor())
        else {
            return Vec::new();
        };
        // a snapshot from after the anchor would leak the future
        if snapshot.timestamp > anchor || snapshot.instrument != last.instrument {
            return Vec::new();
        }
        let spot = last.close;
        let base = |kind: PatternKind, low: f64, high: f64, strength: f64| Pattern {
            kind,
            instrument: last.instrument.clone(),
            timeframe: last.timeframe,
            detected_at: anchor,
            origin: snapshot.timestamp,
            low,
            high,
            strength: strength.clamp(0.0, 1.0),
            expires_after_bars: self.config.expiry_bars,
        };

        let mut found = Vec::new();

        if let Some(pcr) = snapshot.pcr(spot, self.config.band_pct) {
            let bias = if pcr >= self.config.bullish_pcr {
                Some(Direction::Long)
            } else if pcr <= self.config.bearish_pcr {
                Some(Direction::Short)
            } else {
                None
            };
            if let Some(bias) = bias {
                found.push(base(PatternKind::OiSkew { pcr, bias }, spot, spot, pcr.ln().abs()));
            }
        }

        let band: Vec<_> = snapshot.band(spot, self.config.band_pct).collect();
        let total_put: f64 = band.iter().map(|(_, oi)| oi.put_oi).sum();
        let total_call: f64 = band.iter().map(|(_, oi)| oi.call_oi).sum();

        let support = band
            .iter()
            .filter(|(strike, oi)| (*strike as f64) <= spot && oi.put_oi > 0.0)
            .max_by(|a, b| a.1.put_oi.total_cmp(&b.1.put_oi));
        if let Some((strike, oi)) = support {
            let level = *strike as f64;
            found.push(base(
                PatternKind::OiBuildup { strike: *strike, level: OiLevel::Support },
                level,
                level,
                oi.put_oi / total_put,
            ));
        }

        let resistance = band
            .iter()
            .filter(|(strike, oi)| (*strike as f64) >= spot && oi.call_oi > 0.0)
            .max_by(|a, b| a.1.call_oi.total_cmp(&b.1.call_oi));
        if let Some((strike, oi)) = resistance {
            let level = *strike as f64;
            found.push(base(
                PatternKind::OiBuildup { strike: *strike, level: OiLevel::Resistance },
                level,
                level,
                oi.call_oi / total_call,
            ));
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OiSnapshot, StrikeOi};
    use crate::patterns::test_support::ohlcv;

    fn strike(call_oi: f64, put_oi: f64) -> StrikeOi {
        StrikeOi {
            call_oi,
            put_oi,
            ..Default::default()
        }
    }

    fn spot_candle() -> Vec<crate::domain::Candle> {
        vec![ohlcv(3, 22_040.0, 22_060.0, 22_030.0, 22_050.0, 1000.0)]
    }

    #[test]
    fn put_heavy_chain_is_long_skew_with_levels() {
        let candles = spot_candle();
        let snap = OiSnapshot::new("NIFTY", candles[0].timestamp)
            .with_strike(21_900, strike(1_000.0, 9_000.0))
            .with_strike(22_000, strike(2_000.0, 12_000.0))
            .with_strike(22_100, strike(8_000.0, 3_000.0))
            .with_strike(22_200, strike(6_000.0, 1_000.0));
        let found = OiAnalyzer::new(OiConfig::default())
            .detect(&DetectionInput::candles(&candles).with_oi(Some(&snap)));

        let skew = found.iter().find(|p| p.kind.label() == "oi_skew").unwrap();
        assert_eq!(skew.bias(), Direction::Long);

        let support = found
            .iter()
            .find(|p| matches!(p.kind, PatternKind::OiBuildup { level: OiLevel::Support, .. }))
            .unwrap();
        assert_eq!(support.low, 22_000.0);
        let resistance = found
            .iter()
            .find(|p| matches!(p.kind, PatternKind::OiBuildup { level: OiLevel::Resistance, .. }))
            .unwrap();
        assert_eq!(resistance.low, 22_100.0);
    }

    #[test]
    fn balanced_chain_has_no_skew() {
        let candles = spot_candle();
        let snap = OiSnapshot::new("NIFTY", candles[0].timestamp)
            .with_strike(22_000, strike(5_000.0, 5_000.0))
            .with_strike(22_100, strike(5_000.0, 5_000.0));
        let found = OiAnalyzer::new(OiConfig::default())
            .detect(&DetectionInput::candles(&candles).with_oi(Some(&snap)));
        assert!(found.iter().all(|p| p.kind.label() != "oi_skew"));
    }

    #[test]
    fn future_snapshot_is_ignored() {
        let candles = spot_candle();
        let later = candles[0].close_time() + chrono::Duration::minutes(1);
        let snap = OiSnapshot::new("NIFTY", later).with_strike(22_000, strike(1.0, 100.0));
        let found = OiAnalyzer::new(OiConfig::default())
            .detect(&DetectionInput::candles(&candles).with_oi(Some(&snap)));
        assert!(found.is_empty());
    }
}
