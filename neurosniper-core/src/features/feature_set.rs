use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::Timeframe;

/// One named feature at the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeatureValue {
    Available { value: f64 },
    /// The window was shorter than the indicator's lookback.
    Unavailable { required: usize, have: usize },
}

impl FeatureValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            FeatureValue::Available { value } => Some(*value),
            FeatureValue::Unavailable { .. } => None,
        }
    }
}

/// Named indicator values for one (instrument, timeframe) at `anchor`.
///
/// `anchor` is the close time of the newest candle that contributed; no
/// value in the set may depend on a later candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub anchor: NaiveDateTime,
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureSet {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, anchor: NaiveDateTime) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            anchor,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FeatureValue) {
        self.values.insert(name.into(), value);
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.insert(name, FeatureValue::Available { value });
    }

    /// Value of `name`, or `None` if absent or unavailable.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(FeatureValue::value)
    }

    pub fn state(&self, name: &str) -> Option<&FeatureValue> {
        self.values.get(name)
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// True when every name in `required` has a value.
    pub fn has_all(&self, required: &[&str]) -> bool {
        required.iter().all(|name| self.is_available(name))
    }

    /// Names that are present but unavailable.
    pub fn unavailable(&self) -> Vec<&str> {
        self.values
            .iter()
            .filter(|(_, v)| v.value().is_none())
            .map(|(k, _)| k.as_str())
            .collect()
    }

    /// At least one feature is unavailable.
    pub fn is_partial(&self) -> bool {
        self.values.values().any(|v| v.value().is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
