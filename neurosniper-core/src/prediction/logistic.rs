//! Multinomial logistic regression over z-scored features.
//!
//! logits_k = bias_k + Σ_i w_ik × (x_i − mean_i) / scale_i, probabilities by
//! softmax over (long, short, flat), confidence = top probability.
//! Training is full-batch gradient descent with L2, so the same samples and
//! config always produce the same weights.

use serde::{Deserialize, Serialize};

use super::dataset::LabeledSample;
use super::{ModelError, Prediction, PredictionModel};
use crate::domain::{Direction, ModelVersion};
use crate::features::FeatureSet;
use crate::indicators::names;

const CLASSES: usize = 3;

fn class_index(direction: Direction) -> usize {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
        Direction::Flat => 2,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub version: ModelVersion,
    pub feature_names: Vec<String>,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    /// One row per feature: weights for (long, short, flat).
    pub weights: Vec<[f64; CLASSES]>,
    pub bias: [f64; CLASSES],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub l2: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 300,
            learning_rate: 0.5,
            l2: 1e-3,
        }
    }
}

impl LogisticModel {
    /// Untrained momentum prior: rising RSI/ROC/EMA spread leans long,
    /// falling leans short, a quiet tape leans flat.
    pub fn baseline() -> Self {
        let feature_names: Vec<String> = [names::RSI, names::ROC, names::EMA_SPREAD, names::BB_PCTB]
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            version: ModelVersion(0),
            feature_names,
            means: vec![50.0, 0.0, 0.0, 0.5],
            scales: vec![15.0, 0.5, 0.2, 0.35],
            weights: vec![
                [0.6, -0.6, 0.0],
                [0.5, -0.5, 0.0],
                [0.7, -0.7, 0.0],
                [0.3, -0.3, 0.0],
            ],
            bias: [0.0, 0.0, 0.4],
        }
    }

    pub fn with_version(mut self, version: ModelVersion) -> Self {
        self.version = version;
        self
    }

    /// Fit a model on labelled samples. Returns `None` for an empty sample set.
    pub fn train(
        feature_names: Vec<String>,
        samples: &[LabeledSample],
        config: &TrainConfig,
        version: ModelVersion,
    ) -> Option<Self> {
        if samples.is_empty() || feature_names.is_empty() {
            return None;
        }
        let dims = feature_names.len();
        let n = samples.len() as f64;

        let mut means = vec![0.0; dims];
        for s in samples {
            for (m, x) in means.iter_mut().zip(&s.inputs) {
                *m += x / n;
            }
        }
        let mut scales = vec![0.0; dims];
        for s in samples {
            for ((sc, x), m) in scales.iter_mut().zip(&s.inputs).zip(&means) {
                *sc += (x - m).powi(2) / n;
            }
        }
        for sc in &mut scales {
            *sc = if *sc > 1e-12 { sc.sqrt() } else { 1.0 };
        }

        let mut model = Self {
            version,
            feature_names,
            means,
            scales,
            weights: vec![[0.0; CLASSES]; dims],
            bias: [0.0; CLASSES],
        };

        for _ in 0..config.epochs {
            let mut grad_w = vec![[0.0; CLASSES]; dims];
            let mut grad_b = [0.0; CLASSES];
            for s in samples {
                let z = model.standardize(&s.inputs);
                let probs = model.probabilities(&z);
                let target = class_index(s.label);
                for k in 0..CLASSES {
                    let err = probs[k] - if k == target { 1.0 } else { 0.0 };
                    grad_b[k] += err / n;
                    for (g, x) in grad_w.iter_mut().zip(&z) {
                        g[k] += err * x / n;
                    }
                }
            }
            for (w, g) in model.weights.iter_mut().zip(&grad_w) {
                for k in 0..CLASSES {
                    w[k] -= config.learning_rate * (g[k] + config.l2 * w[k]);
                }
            }
            for k in 0..CLASSES {
                model.bias[k] -= config.learning_rate * grad_b[k];
            }
        }
        Some(model)
    }

    fn standardize(&self, inputs: &[f64]) -> Vec<f64> {
        inputs
            .iter()
            .zip(self.means.iter().zip(&self.scales))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    fn probabilities(&self, z: &[f64]) -> [f64; CLASSES] {
        let mut logits = self.bias;
        for (w, x) in self.weights.iter().zip(z) {
            for k in 0..CLASSES {
                logits[k] += w[k] * x;
            }
        }
        softmax(logits)
    }

    /// Read the model's inputs from a feature set.
    pub fn inputs(&self, features: &FeatureSet) -> Result<Vec<f64>, ModelError> {
        self.feature_names
            .iter()
            .map(|name| {
                features
                    .get(name)
                    .ok_or_else(|| ModelError::MissingFeature(name.clone()))
            })
            .collect()
    }
}

fn softmax(logits: [f64; CLASSES]) -> [f64; CLASSES] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps = logits.map(|l| (l - max).exp());
    let sum: f64 = exps.iter().sum();
    exps.map(|e| e / sum)
}

impl PredictionModel for LogisticModel {
    fn version(&self) -> ModelVersion {
        self.version
    }

    fn features(&self) -> &[String] {
        &self.feature_names
    }

    fn predict(&self, features: &FeatureSet) -> Result<Prediction, ModelError> {
        let inputs = self.inputs(features)?;
        let probs = self.probabilities(&self.standardize(&inputs));
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(ModelError::InvalidOutput("non-finite probability".into()));
        }
        Ok(Prediction {
            p_long: probs[0],
            p_short: probs[1],
            p_flat: probs[2],
            confidence: probs.iter().copied().fold(0.0, f64::max),
            model_version: self.version,
        })
    }
}
