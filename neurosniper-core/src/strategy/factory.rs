//! Builds strategies from configuration.
//!
//! The set of strategy types is closed; `kind` selects one and `params`
//! overrides its defaults by name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{
    Correlation, EmaTrend, FvgRetest, ModelFollow, OiSkewStrategy, RsiReversion, Strategy,
    TrapReversal,
};

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("unknown strategy type: {0}")]
    UnknownStrategy(String),

    #[error("invalid parameter '{param}' for {strategy}: {reason}")]
    InvalidParam {
        strategy: String,
        param: String,
        reason: String,
    },
}

/// One configured strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub kind: String,
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Instruments the strategy runs on; empty means all.
    #[serde(default)]
    pub instruments: Vec<String>,
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    /// Only used by `correlation`.
    #[serde(default)]
    pub reference: Option<String>,
}

fn enabled_default() -> bool {
    true
}

impl StrategyConfig {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            enabled: true,
            instruments: Vec::new(),
            params: BTreeMap::new(),
            reference: None,
        }
    }

    pub fn with_param(mut self, name: &str, value: f64) -> Self {
        self.params.insert(name.to_string(), value);
        self
    }

    pub fn runs_on(&self, instrument: &str) -> bool {
        self.instruments.is_empty()
            || self
                .instruments
                .iter()
                .any(|i| i.eq_ignore_ascii_case(instrument))
    }

    /// Every built-in strategy with default parameters.
    pub fn defaults() -> Vec<StrategyConfig> {
        [
            "rsi_reversion",
            "ema_trend",
            "fvg_retest",
            "trap_reversal",
            "oi_skew",
            "model_follow",
            "correlation",
        ]
        .iter()
        .map(|k| StrategyConfig::new(*k))
        .collect()
    }
}

fn param(config: &StrategyConfig, name: &str, default: f64) -> f64 {
    config.params.get(name).copied().unwrap_or(default)
}

fn param_period(config: &StrategyConfig, name: &str, default: usize) -> Result<usize, FactoryError> {
    match config.params.get(name) {
        None => Ok(default),
        Some(v) if v.is_finite() && *v >= 1.0 && v.fract() == 0.0 => Ok(*v as usize),
        Some(v) => Err(FactoryError::InvalidParam {
            strategy: config.kind.clone(),
            param: name.to_string(),
            reason: format!("expected a positive whole number, got {v}"),
        }),
    }
}

fn invalid(config: &StrategyConfig, param: &str, reason: &str) -> FactoryError {
    FactoryError::InvalidParam {
        strategy: config.kind.clone(),
        param: param.to_string(),
        reason: reason.to_string(),
    }
}

/// Create a strategy from its config.
pub fn create_strategy(config: &StrategyConfig) -> Result<Box<dyn Strategy>, FactoryError> {
    match config.kind.as_str() {
        "rsi_reversion" => {
            let period = param_period(config, "period", 14)?;
            let oversold = param(config, "oversold", 30.0);
            let overbought = param(config, "overbought", 70.0);
            if !(0.0 < oversold && oversold < overbought && overbought < 100.0) {
                return Err(invalid(config, "oversold", "need 0 < oversold < overbought < 100"));
            }
            Ok(Box::new(RsiReversion::new(
                period,
                oversold,
                overbought,
                param(config, "stop_atr", 1.5),
                param(config, "reward_ratio", 2.0),
            )))
        }
        "ema_trend" => {
            let fast = param_period(config, "fast", 9)?;
            let slow = param_period(config, "slow", 21)?;
            if slow <= fast {
                return Err(invalid(config, "slow", "slow period must exceed fast period"));
            }
            Ok(Box::new(EmaTrend::new(
                fast,
                slow,
                param(config, "min_spread_pct", 0.05),
                param(config, "stop_atr", 1.5),
                param(config, "reward_ratio", 2.0),
            )))
        }
        "fvg_retest" => Ok(Box::new(FvgRetest::new(
            param(config, "min_strength", 0.2),
            param(config, "stop_buffer_atr", 0.25),
            param(config, "reward_ratio", 2.0),
        ))),
        "trap_reversal" => Ok(Box::new(TrapReversal::new(
            param(config, "min_strength", 0.3),
            param(config, "stop_buffer_atr", 0.5),
            param(config, "reward_ratio", 2.0),
        ))),
        "oi_skew" => Ok(Box::new(OiSkewStrategy::new(
            param(config, "min_strength", 0.15),
            param(config, "stop_atr", 1.5),
            param(config, "reward_ratio", 2.0),
            param(config, "max_level_atr", 3.0),
        ))),
        "model_follow" => Ok(Box::new(ModelFollow::new(
            param(config, "min_probability", 0.6),
            param(config, "stop_atr", 1.5),
            param(config, "reward_ratio", 2.0),
        ))),
        "correlation" => Ok(Box::new(Correlation::new(
            config.reference.clone().unwrap_or_else(|| "BANKNIFTY".to_string()),
            param(config, "min_change_pct", 0.2),
            param(config, "max_age_minutes", 15.0) as i64,
        ))),
        other => Err(FactoryError::UnknownStrategy(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_default_builds() {
        for config in StrategyConfig::defaults() {
            let strategy = create_strategy(&config).unwrap();
            assert_eq!(strategy.name(), config.kind);
        }
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let err = create_strategy(&StrategyConfig::new("martingale")).err().unwrap();
        assert!(matches!(err, FactoryError::UnknownStrategy(k) if k == "martingale"));
    }

    #[test]
    fn bad_params_are_rejected_not_panicked() {
        let cfg = StrategyConfig::new("rsi_reversion").with_param("period", 0.0);
        assert!(matches!(create_strategy(&cfg), Err(FactoryError::InvalidParam { .. })));
        let cfg = StrategyConfig::new("rsi_reversion").with_param("oversold", 80.0);
        assert!(create_strategy(&cfg).is_err());
        let cfg = StrategyConfig::new("ema_trend").with_param("fast", 30.0);
        assert!(create_strategy(&cfg).is_err());
    }

    #[test]
    fn params_flow_into_feature_names() {
        let cfg = StrategyConfig::new("rsi_reversion").with_param("period", 7.0);
        let strategy = create_strategy(&cfg).unwrap();
        assert!(strategy.required_features().contains(&"rsi_7".to_string()));
        assert!(strategy.indicators().iter().any(|i| i.name() == "rsi_7"));
    }

    #[test]
    fn instrument_allow_list() {
        let mut cfg = StrategyConfig::new("oi_skew");
        assert!(cfg.runs_on("NIFTY"));
        cfg.instruments = vec!["banknifty".into()];
        assert!(cfg.runs_on("BANKNIFTY"));
        assert!(!cfg.runs_on("NIFTY"));
    }

    #[test]
    fn config_from_toml_like_json() {
        let cfg: StrategyConfig =
            serde_json::from_str(r#"{"kind":"ema_trend","params":{"fast":5,"slow":13}}"#).unwrap();
        assert!(cfg.enabled);
        assert!(cfg.instruments.is_empty());
        assert_eq!(cfg.params["fast"], 5.0);
    }
}
