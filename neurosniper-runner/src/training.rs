//! Model retraining lifecycle: label history, fit, persist, swap.
//!
//! Training runs off the decision path. A trained model only affects
//! decisions once it is swapped into a [`ModelSource`]; cycles already
//! holding the previous handle finish on the previous version.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use neurosniper_core::domain::ModelVersion;
use neurosniper_core::indicators::standard_set;
use neurosniper_core::prediction::{build_samples, LabeledSample, LogisticModel, ModelSource};

use crate::config::BacktestConfig;
use crate::data_loader::MarketData;

/// Fewer labelled samples than this is not worth fitting.
pub const MIN_SAMPLES: usize = 30;

#[derive(Debug, Error)]
pub enum ModelFileError {
    #[error("cannot access model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file {path} is not a valid model: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("{instrument}: only {count} labelled samples, need at least {min}", min = MIN_SAMPLES)]
    TooFewSamples { instrument: String, count: usize },

    #[error(transparent)]
    File(#[from] ModelFileError),
}

/// Labelled samples from primary-timeframe candles for the given features.
pub fn training_samples(data: &MarketData, config: &BacktestConfig, feature_names: &[String]) -> Vec<LabeledSample> {
    let candles = data.series(config.timeframes.primary);
    build_samples(
        &candles,
        &standard_set(),
        feature_names,
        config.training.horizon,
        config.training.threshold_pct,
    )
}

/// Fit a new model over the baseline feature set.
pub fn retrain(data: &MarketData, config: &BacktestConfig, version: ModelVersion) -> Result<LogisticModel, TrainingError> {
    let features = LogisticModel::baseline().feature_names;
    let samples = training_samples(data, config, &features);
    if samples.len() < MIN_SAMPLES {
        return Err(TrainingError::TooFewSamples {
            instrument: data.instrument.clone(),
            count: samples.len(),
        });
    }
    let model = LogisticModel::train(features, &samples, &config.training.optimizer, version).ok_or_else(|| {
        TrainingError::TooFewSamples {
            instrument: data.instrument.clone(),
            count: 0,
        }
    })?;
    info!(
        instrument = %data.instrument,
        samples = samples.len(),
        version = %version,
        "model trained"
    );
    Ok(model)
}

/// Train the successor of the active model and swap it in.
///
/// Returns the replaced version. The store is untouched if training fails.
pub fn retrain_and_swap(
    store: &dyn ModelSource,
    data: &MarketData,
    config: &BacktestConfig,
) -> Result<ModelVersion, TrainingError> {
    let next = ModelVersion(store.active_version().version().0 + 1);
    let model = retrain(data, config, next)?;
    Ok(store.swap(Arc::new(model)))
}

pub fn save_model(path: &Path, model: &LogisticModel) -> Result<(), ModelFileError> {
    let io_err = |source| ModelFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
    }
    let json = serde_json::to_string_pretty(model).map_err(|source| ModelFileError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(io_err)
}

pub fn load_model(path: &Path) -> Result<LogisticModel, ModelFileError> {
    let content = std::fs::read_to_string(path).map_err(|source| ModelFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ModelFileError::Json {
        path: path.to_path_buf(),
        source,
    })
}
