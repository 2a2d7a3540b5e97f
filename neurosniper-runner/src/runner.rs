//! Backtest orchestration: load data, replay, score, verify, persist.

use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use neurosniper_core::domain::{decision_digest, Decision, Position, RunFingerprint};
use neurosniper_core::engine::{Pipeline, PipelineError};
use neurosniper_core::prediction::{LogisticModel, ModelHandle};

use crate::config::{BacktestConfig, ConfigError};
use crate::data_loader::{compute_dataset_hash, load_market_data, LoadError, MarketData};
use crate::feed::HistoricalFeed;
use crate::metrics::PerformanceMetrics;
use crate::replay::{EquityPoint, Replay, ReplayOutcome};
use crate::store::{RunStore, StoreError};
use crate::training::{load_model, ModelFileError};

/// Current schema version for persisted runs.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("data error: {0}")]
    Data(#[from] LoadError),

    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("model error: {0}")]
    Model(#[from] ModelFileError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("start {start} is after end {end}")]
    EmptyRange { start: NaiveDate, end: NaiveDate },

    #[error("replay determinism violated for fingerprint {fingerprint}: expected digest {expected}, got {actual}")]
    ReplayDeterminismViolation {
        fingerprint: String,
        expected: String,
        actual: String,
    },
}

/// Complete result of one instrument replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRun {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub instrument: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fingerprint: RunFingerprint,
    pub fingerprint_hash: String,
    /// BLAKE3 over the serialized decision sequence.
    pub decision_digest: String,
    pub decisions: Vec<Decision>,
    pub positions: Vec<Position>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: PerformanceMetrics,
    pub synthetic: bool,
    pub candle_count: usize,
    pub fault_count: usize,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

pub fn parse_date(value: &str) -> Result<NaiveDate, RunError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| RunError::InvalidDate(value.to_string()))
}

/// The model a config asks for: a trained file or the built-in baseline.
pub fn configured_model(config: &BacktestConfig) -> Result<ModelHandle, RunError> {
    let model: ModelHandle = match &config.backtest.model {
        Some(path) => Arc::new(load_model(path)?),
        None => Arc::new(LogisticModel::baseline()),
    };
    Ok(model)
}

/// Replay `instrument` over `[start, end]` under `config`.
///
/// This is the high-level entry point used by the CLI: loads data and the
/// model, replays, optionally replays a second time to prove determinism,
/// and records the run when a store is configured.
pub fn run_backtest(instrument: &str, start: &str, end: &str, config: &BacktestConfig) -> Result<BacktestRun, RunError> {
    let (start, end) = (parse_date(start)?, parse_date(end)?);
    if start > end {
        return Err(RunError::EmptyRange { start, end });
    }
    config.validate()?;
    let symbol = instrument.trim().to_ascii_uppercase();
    let data = load_market_data(&symbol, start, end, &config.backtest.data, config.timeframes.cross_check)?;
    let model = configured_model(config)?;

    let run = run_backtest_on_data(&data, start, end, config, Arc::clone(&model))?;
    if config.backtest.verify_determinism {
        verify_determinism(&run, &data, config, model)?;
    }
    if let Some(dir) = &config.backtest.store_dir {
        let store = RunStore::open(dir)?;
        record_run(&store, &run)?;
    }
    Ok(run)
}

/// Replay pre-loaded data. No I/O.
pub fn run_backtest_on_data(
    data: &MarketData,
    start: NaiveDate,
    end: NaiveDate,
    config: &BacktestConfig,
    model: ModelHandle,
) -> Result<BacktestRun, RunError> {
    let pipeline = Arc::new(Pipeline::new(config.pipeline_config())?);
    let instrument = config.instrument(&data.instrument);
    let capital = config.backtest.capital;
    let fingerprint = RunFingerprint {
        config: config.config_hash(),
        dataset: compute_dataset_hash(data),
        model_version: model.version(),
    };

    let feed = HistoricalFeed::new(data, config.timeframes.primary, config.timeframes.cross_check);
    let candle_count = feed.primary_candles();
    info!(
        instrument = %instrument.symbol,
        %start,
        %end,
        events = feed.len(),
        model = %fingerprint.model_version,
        "replay starting"
    );
    let ReplayOutcome {
        decisions,
        positions,
        equity_curve,
        faults,
        ..
    } = Replay::new(pipeline, instrument.clone(), capital, model).run(feed.into_events());

    let curve: Vec<f64> = std::iter::once(capital)
        .chain(equity_curve.iter().map(|p| p.equity))
        .collect();
    let metrics = PerformanceMetrics::compute(&curve, &positions, capital);

    Ok(BacktestRun {
        schema_version: SCHEMA_VERSION,
        instrument: instrument.symbol,
        start,
        end,
        fingerprint_hash: fingerprint.hash(),
        fingerprint,
        decision_digest: decision_digest(&decisions),
        decisions,
        positions,
        equity_curve,
        metrics,
        synthetic: data.synthetic,
        candle_count,
        fault_count: faults.len(),
    })
}

/// Replay the same inputs again and require a byte-identical decision sequence.
pub fn verify_determinism(
    run: &BacktestRun,
    data: &MarketData,
    config: &BacktestConfig,
    model: ModelHandle,
) -> Result<(), RunError> {
    let again = run_backtest_on_data(data, run.start, run.end, config, model)?;
    check_digest(&run.fingerprint_hash, &run.decision_digest, &again.decision_digest)
}

fn check_digest(fingerprint: &str, expected: &str, actual: &str) -> Result<(), RunError> {
    if expected == actual {
        return Ok(());
    }
    error!(fingerprint, expected, actual, "replay determinism violated");
    Err(RunError::ReplayDeterminismViolation {
        fingerprint: fingerprint.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

/// Append `run` after checking it against stored runs with the same
/// input fingerprint.
pub fn record_run(store: &RunStore, run: &BacktestRun) -> Result<(), RunError> {
    for prior in store.runs_with_fingerprint(&run.fingerprint_hash)? {
        check_digest(&run.fingerprint_hash, &prior.decision_digest, &run.decision_digest)?;
    }
    store.append(run)?;
    Ok(())
}

/// Replay several instruments in parallel. Each replay is sequential;
/// results come back in input order and are recorded in that order.
pub fn run_backtests(
    instruments: &[String],
    start: &str,
    end: &str,
    config: &BacktestConfig,
) -> Vec<(String, Result<BacktestRun, RunError>)> {
    let mut unstored = config.clone();
    unstored.backtest.store_dir = None;

    let mut results: Vec<(String, Result<BacktestRun, RunError>)> = instruments
        .par_iter()
        .map(|instrument| (instrument.clone(), run_backtest(instrument, start, end, &unstored)))
        .collect();

    if let Some(dir) = &config.backtest.store_dir {
        match RunStore::open(dir) {
            Ok(store) => {
                for (_, result) in results.iter_mut() {
                    let recorded = match result {
                        Ok(run) => record_run(&store, run),
                        Err(_) => continue,
                    };
                    if let Err(e) = recorded {
                        *result = Err(e);
                    }
                }
            }
            Err(e) => error!(dir = %dir.display(), error = %e, "run store unavailable, runs not recorded"),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RunQuery;
    use neurosniper_core::domain::{ModelVersion, Timeframe};

    fn quick() -> BacktestConfig {
        BacktestConfig::default()
    }

    #[test]
    fn dates_are_validated() {
        assert!(matches!(
            run_backtest("NIFTY", "2025-13-01", "2025-05-09", &quick()),
            Err(RunError::InvalidDate(_))
        ));
        assert!(matches!(
            run_backtest("NIFTY", "2025-05-09", "2025-05-01", &quick()),
            Err(RunError::EmptyRange { .. })
        ));
        assert!(matches!(
            run_backtest("NIFTY", "2025-05-03", "2025-05-04", &quick()),
            Err(RunError::Data(LoadError::Empty { .. }))
        ));
    }

    #[test]
    fn run_carries_fingerprint_and_metrics() {
        let run = run_backtest("nifty", "2025-05-05", "2025-05-16", &quick()).unwrap();
        assert_eq!(run.instrument, "NIFTY");
        assert!(run.synthetic);
        assert_eq!(run.candle_count, 10 * 25);
        assert_eq!(run.fingerprint.model_version, ModelVersion(0));
        assert_eq!(run.fingerprint_hash, run.fingerprint.hash());
        assert_eq!(run.decision_digest, decision_digest(&run.decisions));
        assert_eq!(run.metrics.trade_count, run.positions.len());
        assert!(run.positions.iter().all(|p| !p.is_open()));
        // decisions only after the primary engine warms
        assert!(!run.decisions.is_empty());
        assert!(run.decisions.len() < run.candle_count);
    }

    #[test]
    fn config_changes_change_the_fingerprint() {
        let a = run_backtest("NIFTY", "2025-05-05", "2025-05-09", &quick()).unwrap();
        let mut tighter = quick();
        tighter.risk.entry_threshold = 0.9;
        let b = run_backtest("NIFTY", "2025-05-05", "2025-05-09", &tighter).unwrap();
        assert_eq!(a.fingerprint.dataset, b.fingerprint.dataset);
        assert_ne!(a.fingerprint_hash, b.fingerprint_hash);
    }

    #[test]
    fn bad_pipeline_config_is_reported() {
        let mut config = quick();
        config.strategies = vec![neurosniper_core::strategy::StrategyConfig::new("astrology")];
        let err = run_backtest("NIFTY", "2025-05-05", "2025-05-09", &config).unwrap_err();
        assert!(matches!(err, RunError::Pipeline(_)));
    }

    #[test]
    fn stored_fingerprint_mismatch_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        let run = run_backtest("NIFTY", "2025-05-05", "2025-05-07", &quick()).unwrap();
        record_run(&store, &run).unwrap();
        record_run(&store, &run).unwrap();

        let mut tampered = run.clone();
        tampered.decision_digest = "0".repeat(64);
        let err = record_run(&store, &tampered).unwrap_err();
        assert!(matches!(err, RunError::ReplayDeterminismViolation { .. }));
        assert_eq!(store.runs().unwrap().len(), 2);
    }

    #[test]
    fn parallel_runs_keep_input_order_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = quick();
        config.backtest.store_dir = Some(dir.path().to_path_buf());
        let instruments = vec!["NIFTY".to_string(), "BANKNIFTY".to_string(), "FINNIFTY".to_string()];
        let results = run_backtests(&instruments, "2025-05-05", "2025-05-07", &config);
        let names: Vec<&str> = results.iter().map(|(i, _)| i.as_str()).collect();
        assert_eq!(names, vec!["NIFTY", "BANKNIFTY", "FINNIFTY"]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));

        let store = RunStore::open(dir.path()).unwrap();
        assert_eq!(store.runs().unwrap().len(), 3);
        assert_eq!(store.query_runs(&RunQuery::default().instrument("BANKNIFTY")).unwrap().len(), 1);
    }

    #[test]
    fn csv_timeframe_must_fit() {
        let mut config = quick();
        config.backtest.data = crate::config::DataConfig::Csv {
            candles: "x.csv".into(),
            oi: None,
            timeframe: Timeframe::M15,
        };
        assert!(matches!(
            run_backtest("NIFTY", "2025-05-05", "2025-05-07", &config),
            Err(RunError::Config(ConfigError::Invalid(_)))
        ));
    }
}
