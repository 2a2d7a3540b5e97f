//! TOML backtest configuration.
//!
//! Every section has defaults, so an empty file is a valid config:
//!
//! ```toml
//! log_level = "info"
//!
//! [backtest]
//! instrument = "NIFTY"
//! capital = 1000000.0
//! mode = "dry_run"
//!
//! [backtest.data]
//! source = "synthetic"
//!
//! [timeframes]
//! primary = "15m"
//! cross_check = "5m"
//!
//! [[strategies]]
//! kind = "ema_trend"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use neurosniper_core::aggregate::AggregatorConfig;
use neurosniper_core::domain::{ConfigHash, Instrument, Timeframe, TradingMode};
use neurosniper_core::engine::{FillModel, PipelineConfig};
use neurosniper_core::patterns::PatternConfig;
use neurosniper_core::prediction::TrainConfig;
use neurosniper_core::risk::{RiskParams, SessionRules};
use neurosniper_core::strategy::StrategyConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where replay candles and OI chains come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// Deterministic generated session data. The seed defaults to the instrument.
    Synthetic {
        #[serde(default)]
        seed: Option<String>,
    },
    Csv {
        candles: PathBuf,
        #[serde(default)]
        oi: Option<PathBuf>,
        /// Bar interval of the candle file; must be the cross-check timeframe
        /// or finer.
        #[serde(default = "default_csv_timeframe")]
        timeframe: Timeframe,
    },
}

fn default_csv_timeframe() -> Timeframe {
    Timeframe::M5
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig::Synthetic { seed: None }
    }
}

impl DataConfig {
    pub fn is_synthetic(&self) -> bool {
        matches!(self, DataConfig::Synthetic { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSection {
    pub instrument: String,
    pub capital: f64,
    pub mode: TradingMode,
    /// Overrides the exchange preset lot size.
    pub lot_size: Option<f64>,
    pub data: DataConfig,
    /// Trained model JSON; the built-in baseline when absent.
    pub model: Option<PathBuf>,
    /// Replay twice in-process and fail on any decision difference.
    pub verify_determinism: bool,
    /// Run store directory; nothing is persisted when absent.
    pub store_dir: Option<PathBuf>,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            instrument: "NIFTY".into(),
            capital: 1_000_000.0,
            mode: TradingMode::DryRun,
            lot_size: None,
            data: DataConfig::default(),
            model: None,
            verify_determinism: false,
            store_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeSection {
    pub primary: Timeframe,
    pub cross_check: Timeframe,
}

impl Default for TimeframeSection {
    fn default() -> Self {
        Self {
            primary: Timeframe::M15,
            cross_check: Timeframe::M5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OiSection {
    /// Snapshots older than this (relative to the candle close) are stale.
    pub max_age_minutes: i64,
}

impl Default for OiSection {
    fn default() -> Self {
        Self { max_age_minutes: 30 }
    }
}

/// Retraining: forward-return labelling plus optimizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Primary candles ahead used for the label.
    pub horizon: usize,
    /// Forward return (percent) beyond which a sample is long or short.
    pub threshold_pct: f64,
    #[serde(flatten)]
    pub optimizer: TrainConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            horizon: 4,
            threshold_pct: 0.15,
            optimizer: TrainConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub log_level: String,
    pub backtest: BacktestSection,
    pub timeframes: TimeframeSection,
    pub strategies: Vec<StrategyConfig>,
    pub patterns: PatternConfig,
    pub aggregator: AggregatorConfig,
    pub risk: RiskParams,
    pub session: SessionRules,
    pub fill: FillModel,
    pub oi: OiSection,
    pub training: TrainingConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            backtest: BacktestSection::default(),
            timeframes: TimeframeSection::default(),
            strategies: StrategyConfig::defaults(),
            patterns: PatternConfig::default(),
            aggregator: AggregatorConfig::default(),
            risk: RiskParams::default(),
            session: SessionRules::default(),
            fill: FillModel::default(),
            oi: OiSection::default(),
            training: TrainingConfig::default(),
        }
    }
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backtest.instrument.trim().is_empty() {
            return Err(ConfigError::Invalid("backtest.instrument is empty".into()));
        }
        if !(self.backtest.capital.is_finite() && self.backtest.capital > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "backtest.capital must be positive, got {}",
                self.backtest.capital
            )));
        }
        if let Some(lot) = self.backtest.lot_size {
            if !(lot.is_finite() && lot > 0.0) {
                return Err(ConfigError::Invalid(format!("backtest.lot_size must be positive, got {lot}")));
            }
        }
        let r = self.risk.max_risk_per_trade;
        if !(r > 0.0 && r <= 1.0) {
            return Err(ConfigError::Invalid(format!("risk.max_risk_per_trade must be in (0, 1], got {r}")));
        }
        let tf = self.timeframes;
        if !tf.primary.is_multiple_of(tf.cross_check) {
            return Err(ConfigError::Invalid(format!(
                "timeframes.cross_check {} must be finer than and divide primary {}",
                tf.cross_check, tf.primary
            )));
        }
        if let DataConfig::Csv { timeframe, .. } = &self.backtest.data {
            if *timeframe != tf.cross_check && !tf.cross_check.is_multiple_of(*timeframe) {
                return Err(ConfigError::Invalid(format!(
                    "csv timeframe {timeframe} cannot be resampled to {}",
                    tf.cross_check
                )));
            }
        }
        if self.training.horizon == 0 {
            return Err(ConfigError::Invalid("training.horizon must be at least 1".into()));
        }
        Ok(())
    }

    /// Contract details for `instrument`, honouring the lot size override.
    pub fn instrument(&self, symbol: &str) -> Instrument {
        let mut instrument = Instrument::preset(symbol);
        if let Some(lot) = self.backtest.lot_size {
            instrument.lot_size = lot;
        }
        instrument
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            primary: self.timeframes.primary,
            cross_check: self.timeframes.cross_check,
            mode: self.backtest.mode,
            strategies: self.strategies.clone(),
            patterns: self.patterns.clone(),
            aggregator: self.aggregator.clone(),
            risk: self.risk.clone(),
            session: self.session.clone(),
            fill: self.fill.clone(),
            oi_max_age_minutes: self.oi.max_age_minutes,
        }
    }

    /// BLAKE3 over everything that can change a decision: the pipeline
    /// config, capital and lot size. Paths, logging and the store are
    /// excluded so moving files around keeps the fingerprint.
    pub fn config_hash(&self) -> ConfigHash {
        let canonical = serde_json::json!({
            "pipeline": self.pipeline_config(),
            "capital": self.backtest.capital,
            "lot_size": self.backtest.lot_size,
        });
        ConfigHash(blake3::hash(canonical.to_string().as_bytes()).to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = BacktestConfig::from_toml("").unwrap();
        assert_eq!(config, BacktestConfig::default());
        assert_eq!(config.backtest.instrument, "NIFTY");
        assert!(config.backtest.data.is_synthetic());
        assert_eq!(config.strategies.len(), 7);
    }

    #[test]
    fn parses_sections() {
        let toml_str = r#"
log_level = "debug"

[backtest]
instrument = "BANKNIFTY"
capital = 500000.0
mode = "auto"
verify_determinism = true

[backtest.data]
source = "csv"
candles = "data/banknifty_5m.csv"
oi = "data/banknifty_oi.csv"

[timeframes]
primary = "15m"
cross_check = "5m"

[[strategies]]
kind = "ema_trend"

[[strategies]]
kind = "rsi_reversion"
params = { oversold = 25.0, overbought = 75.0 }

[aggregator]
min_confidence = 0.6
confirmation = "majority"

[risk]
max_risk_per_trade = 0.02

[session]
max_trades_per_day = 3

[training]
horizon = 6
epochs = 50
"#;
        let config = BacktestConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.backtest.instrument, "BANKNIFTY");
        assert_eq!(config.backtest.mode, TradingMode::Auto);
        assert!(config.backtest.verify_determinism);
        match &config.backtest.data {
            DataConfig::Csv { candles, oi, timeframe } => {
                assert_eq!(candles, &PathBuf::from("data/banknifty_5m.csv"));
                assert!(oi.is_some());
                assert_eq!(*timeframe, Timeframe::M5);
            }
            other => panic!("expected csv data, got {other:?}"),
        }
        assert_eq!(config.strategies.len(), 2);
        assert_eq!(config.strategies[1].params["oversold"], 25.0);
        assert_eq!(config.aggregator.min_confidence, 0.6);
        assert_eq!(config.risk.max_risk_per_trade, 0.02);
        assert_eq!(config.session.max_trades_per_day, 3);
        assert_eq!(config.training.horizon, 6);
        assert_eq!(config.training.optimizer.epochs, 50);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.mode, TradingMode::Auto);
        assert_eq!(pipeline.oi_max_age_minutes, 30);
    }

    #[test]
    fn rejects_bad_values() {
        let err = BacktestConfig::from_toml("[backtest]\ncapital = -1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = BacktestConfig::from_toml("[timeframes]\nprimary = \"5m\"\ncross_check = \"15m\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = BacktestConfig::from_toml("[risk]\nmax_risk_per_trade = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = BacktestConfig::from_toml("[backtest\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn config_hash_tracks_decision_inputs_only() {
        let base = BacktestConfig::default();
        let mut moved = base.clone();
        moved.backtest.store_dir = Some(PathBuf::from("/tmp/elsewhere"));
        moved.log_level = "trace".into();
        assert_eq!(base.config_hash(), moved.config_hash());

        let mut riskier = base.clone();
        riskier.risk.max_risk_per_trade = 0.02;
        assert_ne!(base.config_hash(), riskier.config_hash());
        assert_eq!(base.config_hash().0.len(), 64);
    }

    #[test]
    fn lot_size_override() {
        let mut config = BacktestConfig::default();
        assert_eq!(config.instrument("NIFTY").lot_size, 75.0);
        config.backtest.lot_size = Some(25.0);
        assert_eq!(config.instrument("NIFTY").lot_size, 25.0);
    }
}
