//! Option-chain open interest snapshots.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Call/put open interest at one strike.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StrikeOi {
    pub call_oi: f64,
    pub put_oi: f64,
    #[serde(default)]
    pub call_oi_change: f64,
    #[serde(default)]
    pub put_oi_change: f64,
}

/// Per-strike OI map at a point in time. Strikes are whole index points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiSnapshot {
    pub instrument: String,
    pub timestamp: NaiveDateTime,
    pub strikes: BTreeMap<i64, StrikeOi>,
}

impl OiSnapshot {
    pub fn new(instrument: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            instrument: instrument.into(),
            timestamp,
            strikes: BTreeMap::new(),
        }
    }

    pub fn with_strike(mut self, strike: i64, oi: StrikeOi) -> Self {
        self.strikes.insert(strike, oi);
        self
    }

    /// Strikes within `band_pct` percent of `spot`, in ascending order.
    pub fn band(&self, spot: f64, band_pct: f64) -> impl Iterator<Item = (i64, &StrikeOi)> {
        let lo = spot * (1.0 - band_pct / 100.0);
        let hi = spot * (1.0 + band_pct / 100.0);
        self.strikes
            .iter()
            .filter(move |(strike, _)| {
                let s = **strike as f64;
                s >= lo && s <= hi
            })
            .map(|(strike, oi)| (*strike, oi))
    }

    /// Put/call OI ratio over the band; `None` when no call OI is present.
    pub fn pcr(&self, spot: f64, band_pct: f64) -> Option<f64> {
        let (calls, puts) = self
            .band(spot, band_pct)
            .fold((0.0, 0.0), |(c, p), (_, oi)| (c + oi.call_oi, p + oi.put_oi));
        if calls <= 0.0 {
            None
        } else {
            Some(puts / calls)
        }
    }
}
