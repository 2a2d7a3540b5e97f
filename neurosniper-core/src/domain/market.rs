//! Read-only cross-instrument view shared between lanes.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::direction::Direction;

/// Latest primary-timeframe state one lane publishes about its instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentView {
    pub instrument: String,
    pub anchor: NaiveDateTime,
    pub close: f64,
    /// Percent change of the last primary candle.
    pub change_pct: f64,
    /// Sign of the fast/slow EMA spread; flat while unavailable.
    pub trend: Direction,
}

/// Immutable snapshot of every lane's latest view, taken at cycle start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    views: BTreeMap<String, InstrumentView>,
}

impl MarketSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, instrument: &str) -> Option<&InstrumentView> {
        self.views.get(instrument)
    }

    /// Copy of this snapshot with `view` replacing its instrument's entry.
    pub fn with_view(&self, view: InstrumentView) -> Self {
        let mut views = self.views.clone();
        views.insert(view.instrument.clone(), view);
        Self { views }
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}
