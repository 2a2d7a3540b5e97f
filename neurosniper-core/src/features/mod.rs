//! Indicator Engine: per-lane feature computation.

pub mod engine;
pub mod feature_set;

pub use engine::FeatureEngine;
pub use feature_set::{FeatureSet, FeatureValue};
