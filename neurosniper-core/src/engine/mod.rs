//! Wiring of the pipeline into per-instrument lanes, live and replayed.

pub mod dispatch;
pub mod lane;
pub mod live;
pub mod pipeline;
pub mod positions;
pub mod source;

pub use dispatch::{DecisionLog, DecisionRouter, Routing};
pub use lane::{InstrumentLane, LaneOutput};
pub use live::{AckError, EngineError, LiveEngine, SnapshotBoard};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use positions::{FillModel, PositionBook};
pub use source::{CandleSource, DecisionObserver, ExecutionSink, FeedEvent, OpenInterestSource, SourceError};

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::pipeline::{Pipeline, PipelineConfig};
    use super::positions::FillModel;
    use crate::domain::{resample, CandidateSignal, Candle, Direction, ModelVersion, Timeframe, TradingMode};
    use crate::features::FeatureSet;
    use crate::prediction::{ModelError, Prediction, PredictionModel};
    use crate::risk::SessionRules;
    use crate::strategy::{Strategy, StrategyContext, StrategyError, StrategySet};

    /// Emits the same call every cycle with a 10-point stop and 20-point target.
    pub struct Fixed {
        pub name: &'static str,
        pub direction: Direction,
        pub confidence: f64,
    }

    impl Strategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn required_features(&self) -> Vec<String> {
            Vec::new()
        }

        fn generate_signal(&self, ctx: &StrategyContext<'_>) -> Result<Option<CandidateSignal>, StrategyError> {
            let close = ctx.close()?;
            let sign = self.direction.sign();
            ctx.signal(
                self.name,
                self.direction,
                self.confidence,
                Some(close - sign * 10.0),
                Some(close + sign * 20.0),
            )
            .map(Some)
        }
    }

    pub struct FixedModel(pub u64);

    impl PredictionModel for FixedModel {
        fn version(&self) -> ModelVersion {
            ModelVersion(self.0)
        }

        fn features(&self) -> &[String] {
            &[]
        }

        fn predict(&self, _features: &FeatureSet) -> Result<Prediction, ModelError> {
            Ok(Prediction {
                p_long: 0.7,
                p_short: 0.2,
                p_flat: 0.1,
                confidence: 0.7,
                model_version: ModelVersion(self.0),
            })
        }
    }

    pub fn pipeline(mode: TradingMode, strategies: Vec<Box<dyn Strategy>>) -> Pipeline {
        let config = PipelineConfig {
            mode,
            session: SessionRules::disabled(),
            fill: FillModel::zero(),
            ..PipelineConfig::default()
        };
        Pipeline::with_strategies(config, StrategySet::from_strategies(strategies)).unwrap()
    }

    pub fn long_only() -> Vec<Box<dyn Strategy>> {
        vec![Box::new(Fixed {
            name: "fixed_long",
            direction: Direction::Long,
            confidence: 0.9,
        })]
    }

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 6)
            .unwrap()
            .and_hms_opt(9, 15, 0)
            .unwrap()
    }

    /// Gently rising 5-minute candles for `instrument`.
    pub fn five_minute(instrument: &str, n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + 0.1 * i as f64 + if i % 2 == 0 { 0.05 } else { -0.05 };
                let open = close - 0.08;
                Candle {
                    instrument: instrument.into(),
                    timeframe: Timeframe::M5,
                    timestamp: t0() + chrono::Duration::minutes(5 * i as i64),
                    open,
                    high: close + 0.2,
                    low: open - 0.2,
                    close,
                    volume: 1000.0 + (i % 7) as f64 * 50.0,
                    open_interest: None,
                }
            })
            .collect()
    }

    /// `n` primary (15m) bars interleaved with their 5m constituents in
    /// close-time order, cross-check first.
    pub fn interleaved(instrument: &str, n: usize) -> Vec<Candle> {
        let five = five_minute(instrument, 3 * n);
        let fifteen = resample(&five, Timeframe::M15);
        let mut out = Vec::with_capacity(4 * n);
        for (j, bar) in fifteen.into_iter().enumerate() {
            out.extend(five[3 * j..3 * j + 3].iter().cloned());
            out.push(bar);
        }
        out
    }
}
