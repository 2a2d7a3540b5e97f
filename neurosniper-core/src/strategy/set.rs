//! The configured strategies for a pipeline and fault-isolated evaluation.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::trace;

use super::factory::{create_strategy, FactoryError, StrategyConfig};
use super::{Strategy, StrategyContext, StrategyError};
use crate::domain::CandidateSignal;
use crate::error::{Fault, FaultKind};
use crate::indicators::Indicator;

struct Entry {
    strategy: Box<dyn Strategy>,
    config: StrategyConfig,
}

/// Result of running every applicable strategy once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyRun {
    pub signals: Vec<CandidateSignal>,
    pub faults: Vec<Fault>,
    /// Strategies skipped because an input they need was unavailable.
    pub suppressed: Vec<String>,
}

pub struct StrategySet {
    entries: Vec<Entry>,
}

impl StrategySet {
    pub fn from_configs(configs: &[StrategyConfig]) -> Result<Self, FactoryError> {
        let entries = configs
            .iter()
            .map(|config| {
                Ok(Entry {
                    strategy: create_strategy(config)?,
                    config: config.clone(),
                })
            })
            .collect::<Result<Vec<_>, FactoryError>>()?;
        Ok(Self { entries })
    }

    /// A set from already-built strategies, all enabled everywhere.
    pub fn from_strategies(strategies: Vec<Box<dyn Strategy>>) -> Self {
        let entries = strategies
            .into_iter()
            .map(|strategy| {
                let config = StrategyConfig::new(strategy.name());
                Entry { strategy, config }
            })
            .collect();
        Self { entries }
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.strategy.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indicators any configured strategy asked for.
    pub fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        self.entries
            .iter()
            .flat_map(|e| e.strategy.indicators())
            .collect()
    }

    /// True if `name` is configured, enabled and allowed on `instrument`.
    pub fn is_enabled_for(&self, name: &str, instrument: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.strategy.name() == name && e.config.enabled && e.config.runs_on(instrument))
    }

    /// Evaluate every strategy enabled for the context's instrument.
    ///
    /// `disabled` holds per-lane runtime overrides. Strategies whose inputs
    /// are unavailable are suppressed; strategies that fail or panic are
    /// recorded as faults. Either way the remaining strategies still run.
    pub fn run(&self, ctx: &StrategyContext<'_>, disabled: &BTreeSet<String>) -> StrategyRun {
        let fs = ctx.features;
        let mut out = StrategyRun::default();
        let fault = |source: &str, kind: FaultKind, detail: String| {
            Fault::new(kind, &fs.instrument, fs.timeframe, fs.anchor, source, detail)
        };

        for entry in &self.entries {
            let name = entry.strategy.name();
            if !entry.config.enabled || !entry.config.runs_on(&fs.instrument) || disabled.contains(name) {
                continue;
            }

            let required = entry.strategy.required_features();
            let missing: Vec<&String> = required.iter().filter(|f| !fs.is_available(f)).collect();
            if !missing.is_empty() {
                trace!(strategy = name, ?missing, "strategy suppressed");
                out.suppressed.push(name.to_string());
                continue;
            }
            if entry.strategy.needs_prediction() && ctx.prediction.is_none() {
                out.suppressed.push(name.to_string());
                continue;
            }
            if entry.strategy.needs_oi() && !ctx.oi_fresh {
                out.suppressed.push(name.to_string());
                continue;
            }

            let result = catch_unwind(AssertUnwindSafe(|| entry.strategy.generate_signal(ctx)));
            match result {
                Ok(Ok(Some(signal))) => {
                    if (0.0..=1.0).contains(&signal.confidence) && signal.entry.is_finite() {
                        out.signals.push(signal);
                    } else {
                        out.faults.push(fault(
                            name,
                            FaultKind::Strategy,
                            format!(
                                "signal with confidence {} or entry {} out of range",
                                signal.confidence, signal.entry
                            ),
                        ));
                    }
                }
                Ok(Ok(None)) => {}
                Ok(Err(StrategyError::MissingInput(feature))) => {
                    out.faults.push(fault(
                        name,
                        FaultKind::Data,
                        format!("feature '{feature}' unavailable"),
                    ));
                }
                Ok(Err(e)) => out.faults.push(fault(name, FaultKind::Strategy, e.to_string())),
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "panicked".to_string());
                    out.faults.push(fault(name, FaultKind::Strategy, format!("panic: {detail}")));
                }
            }
        }
        out.signals
            .sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Direction, MarketSnapshot};
    use crate::strategy::test_support::{ctx, features};

    struct Always(&'static str, Direction);

    impl Strategy for Always {
        fn name(&self) -> &str {
            self.0
        }
        fn required_features(&self) -> Vec<String> {
            Vec::new()
        }
        fn generate_signal(
            &self,
            ctx: &StrategyContext<'_>,
        ) -> Result<Option<CandidateSignal>, StrategyError> {
            ctx.signal(self.0, self.1, 0.8, None, None).map(Some)
        }
    }

    struct Broken;

    impl Strategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn required_features(&self) -> Vec<String> {
            Vec::new()
        }
        fn generate_signal(
            &self,
            _ctx: &StrategyContext<'_>,
        ) -> Result<Option<CandidateSignal>, StrategyError> {
            panic!("index out of bounds")
        }
    }

    struct Failing;

    impl Strategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }
        fn required_features(&self) -> Vec<String> {
            Vec::new()
        }
        fn generate_signal(
            &self,
            _ctx: &StrategyContext<'_>,
        ) -> Result<Option<CandidateSignal>, StrategyError> {
            Err(StrategyError::Internal("boom".into()))
        }
    }

    #[test]
    fn faulty_strategies_are_isolated() {
        let set = StrategySet::from_strategies(vec![
            Box::new(Broken),
            Box::new(Always("b_long", Direction::Long)),
            Box::new(Failing),
            Box::new(Always("a_long", Direction::Long)),
        ]);
        let fs = features(&[("close", 100.0)]);
        let market = MarketSnapshot::empty();
        let run = set.run(&ctx(&fs, &[], None, &market), &BTreeSet::new());
        let names: Vec<&str> = run.signals.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(names, vec!["a_long", "b_long"]);
        assert_eq!(run.faults.len(), 2);
        assert!(run.faults.iter().all(|f| f.kind == FaultKind::Strategy));
        assert!(run.faults.iter().any(|f| f.detail.contains("index out of bounds")));
    }

    struct Overconfident;

    impl Strategy for Overconfident {
        fn name(&self) -> &str {
            "overconfident"
        }
        fn required_features(&self) -> Vec<String> {
            Vec::new()
        }
        fn generate_signal(
            &self,
            ctx: &StrategyContext<'_>,
        ) -> Result<Option<CandidateSignal>, StrategyError> {
            let mut signal = ctx.signal("overconfident", Direction::Long, 0.8, None, None)?;
            signal.confidence = 1.7;
            Ok(Some(signal))
        }
    }

    #[test]
    fn confidence_outside_unit_range_is_a_fault() {
        let set = StrategySet::from_strategies(vec![
            Box::new(Overconfident),
            Box::new(Always("steady", Direction::Long)),
        ]);
        let fs = features(&[("close", 100.0)]);
        let market = MarketSnapshot::empty();
        let run = set.run(&ctx(&fs, &[], None, &market), &BTreeSet::new());
        assert_eq!(run.signals.len(), 1);
        assert_eq!(run.signals[0].strategy, "steady");
        assert_eq!(run.faults.len(), 1);
        assert_eq!(run.faults[0].kind, FaultKind::Strategy);
        assert!(run.faults[0].detail.contains("1.7"));
    }

    #[test]
    fn missing_inputs_suppress() {
        let set = StrategySet::from_configs(&[
            StrategyConfig::new("rsi_reversion"),
            StrategyConfig::new("model_follow"),
        ])
        .unwrap();
        let fs = features(&[("close", 100.0), ("atr_14", 1.0)]);
        let market = MarketSnapshot::empty();
        let run = set.run(&ctx(&fs, &[], None, &market), &BTreeSet::new());
        assert!(run.signals.is_empty());
        assert_eq!(run.suppressed, vec!["rsi_reversion", "model_follow"]);
    }

    #[test]
    fn disabled_and_allow_listed() {
        let mut only_bank = StrategyConfig::new("rsi_reversion");
        only_bank.instruments = vec!["BANKNIFTY".into()];
        let mut off = StrategyConfig::new("ema_trend");
        off.enabled = false;
        let set = StrategySet::from_configs(&[only_bank, off, StrategyConfig::new("fvg_retest")]).unwrap();
        assert!(!set.is_enabled_for("rsi_reversion", "NIFTY"));
        assert!(set.is_enabled_for("rsi_reversion", "BANKNIFTY"));
        assert!(!set.is_enabled_for("ema_trend", "NIFTY"));
        assert!(set.is_enabled_for("fvg_retest", "NIFTY"));

        let fs = features(&[("close", 100.0), ("rsi_14", 10.0), ("atr_14", 1.0)]);
        let market = MarketSnapshot::empty();
        let run = set.run(&ctx(&fs, &[], None, &market), &BTreeSet::new());
        assert!(run.signals.is_empty());
        assert!(run.suppressed.is_empty());

        let mut runtime_off = BTreeSet::new();
        runtime_off.insert("fvg_retest".to_string());
        let run = set.run(&ctx(&fs, &[], None, &market), &runtime_off);
        assert!(run.signals.is_empty());
    }
}
