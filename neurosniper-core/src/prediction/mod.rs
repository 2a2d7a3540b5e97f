//! Prediction Model: feature set in, class probabilities out.
//!
//! The engine treats the model as an opaque [`PredictionModel`]. Versions
//! live in a [`ModelStore`]; a cycle takes one handle and uses it for the
//! whole decision, so a concurrent swap never mixes versions.

pub mod dataset;
pub mod logistic;
pub mod store;

pub use dataset::{build_samples, label_for_return, LabeledSample};
pub use logistic::{LogisticModel, TrainConfig};
pub use store::{ModelHandle, ModelSource, ModelStore};

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Direction, ModelVersion};
use crate::features::FeatureSet;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("feature '{0}' unavailable")]
    MissingFeature(String),

    #[error("model timed out")]
    Timeout,

    #[error("model produced invalid output: {0}")]
    InvalidOutput(String),

    #[error("model panicked: {0}")]
    Panicked(String),
}

/// Class probabilities for the next move plus an overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub p_long: f64,
    pub p_short: f64,
    pub p_flat: f64,
    pub confidence: f64,
    pub model_version: ModelVersion,
}

impl Prediction {
    /// Most probable class. Ties resolve to flat.
    pub fn direction(&self) -> Direction {
        if self.p_long > self.p_short && self.p_long > self.p_flat {
            Direction::Long
        } else if self.p_short > self.p_long && self.p_short > self.p_flat {
            Direction::Short
        } else {
            Direction::Flat
        }
    }

    pub fn probability(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.p_long,
            Direction::Short => self.p_short,
            Direction::Flat => self.p_flat,
        }
    }

    /// Probabilities are finite, in [0, 1] and sum to 1.
    pub fn is_valid(&self) -> bool {
        let ps = [self.p_long, self.p_short, self.p_flat, self.confidence];
        ps.iter().all(|p| p.is_finite() && (0.0..=1.0).contains(p))
            && ((self.p_long + self.p_short + self.p_flat) - 1.0).abs() < 1e-6
    }
}

/// Trait for prediction models.
pub trait PredictionModel: Send + Sync {
    fn version(&self) -> ModelVersion;

    /// Feature names the model reads.
    fn features(&self) -> &[String];

    fn predict(&self, features: &FeatureSet) -> Result<Prediction, ModelError>;
}

/// What the aggregator knows about this cycle's prediction.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutcome {
    Available(Prediction),
    Failed(ModelError),
}

impl PredictionOutcome {
    /// Run `model` and reject malformed output as a model failure. A panic
    /// inside the model is caught and reported the same way.
    pub fn from_model(model: &dyn PredictionModel, features: &FeatureSet) -> Self {
        match catch_unwind(AssertUnwindSafe(|| model.predict(features))) {
            Ok(Ok(p)) if p.is_valid() => PredictionOutcome::Available(p),
            Ok(Ok(p)) => PredictionOutcome::Failed(ModelError::InvalidOutput(format!(
                "long={} short={} flat={} confidence={}",
                p.p_long, p.p_short, p.p_flat, p.confidence
            ))),
            Ok(Err(e)) => PredictionOutcome::Failed(e),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown payload".to_string());
                PredictionOutcome::Failed(ModelError::Panicked(detail))
            }
        }
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            PredictionOutcome::Available(p) => Some(p),
            PredictionOutcome::Failed(_) => None,
        }
    }
}
