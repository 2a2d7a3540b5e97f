//! Per-instrument pipeline state and the per-candle decision cycle.
//!
//! A lane owns everything mutable about one instrument: feature buffers for
//! the primary and cross-check timeframes, pattern trackers, the latest OI
//! snapshot and the position book. Candles must arrive in close-time order
//! with cross-check candles ahead of a primary candle that closes at the
//! same time. The same lane code runs live and in replay.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use super::pipeline::Pipeline;
use crate::aggregate::{Aggregate, AggregationInput, CrossCheckView};
use crate::domain::{
    check_append, Candle, Decision, DecisionId, DecisionReason, DecisionStatus, Direction, ExitReason, Instrument,
    InstrumentView, MarketSnapshot, OiSnapshot, Position, SeriesError, Timeframe,
};
use crate::error::{Fault, FaultKind};
use crate::features::{FeatureEngine, FeatureSet};
use crate::indicators::names;
use crate::patterns::{DetectionInput, Pattern, PatternTracker};
use crate::prediction::{PredictionModel, PredictionOutcome};
use crate::risk::RiskInput;
use crate::strategy::StrategyContext;

/// What one lane event produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaneOutput {
    /// Set once per completed primary cycle.
    pub decision: Option<Decision>,
    pub faults: Vec<Fault>,
    pub closed: Vec<Position>,
    /// Fresh cross-instrument view to publish.
    pub view: Option<InstrumentView>,
}

impl LaneOutput {
    fn fault(fault: Fault) -> Self {
        Self {
            faults: vec![fault],
            ..Self::default()
        }
    }
}

struct Series {
    engine: FeatureEngine,
    patterns: PatternTracker,
}

impl Series {
    fn new(pipeline: &Pipeline, instrument: &str, timeframe: Timeframe) -> Self {
        Self {
            engine: FeatureEngine::new(
                instrument,
                timeframe,
                Arc::clone(pipeline.indicators()),
                pipeline.pattern_history(),
            ),
            patterns: PatternTracker::new(),
        }
    }

    /// Push, age patterns, detect. Returns this candle's features.
    fn advance(
        &mut self,
        pipeline: &Pipeline,
        candle: Candle,
        oi: Option<&OiSnapshot>,
    ) -> Result<FeatureSet, SeriesError> {
        self.patterns.advance(&candle);
        let features = self.engine.push(candle)?;
        let input = DetectionInput::candles(self.engine.window()).with_oi(oi);
        let fresh: Vec<Pattern> = pipeline
            .detectors()
            .iter()
            .flat_map(|d| d.detect(&input))
            .collect();
        self.patterns.extend(fresh);
        Ok(features)
    }

    fn reset(&mut self) {
        self.engine.invalidate();
        self.patterns.clear();
    }
}

pub struct InstrumentLane {
    pipeline: Arc<Pipeline>,
    instrument: Instrument,
    primary: Series,
    cross: Series,
    cross_view: CrossCheckView,
    oi: Option<OiSnapshot>,
    book: super::positions::PositionBook,
    initial_equity: f64,
    trades_today: usize,
    session_day: Option<NaiveDate>,
    /// Anchor of the latest primary cycle.
    last_cycle: Option<NaiveDateTime>,
    next_seq: u64,
    disabled: BTreeSet<String>,
    vix: Option<f64>,
}

impl InstrumentLane {
    pub fn new(pipeline: Arc<Pipeline>, instrument: Instrument, equity: f64) -> Self {
        let config = pipeline.config();
        let primary = Series::new(&pipeline, &instrument.symbol, config.primary);
        let cross = Series::new(&pipeline, &instrument.symbol, config.cross_check);
        Self {
            primary,
            cross,
            cross_view: CrossCheckView::default(),
            oi: None,
            book: super::positions::PositionBook::new(),
            initial_equity: equity,
            trades_today: 0,
            session_day: None,
            last_cycle: None,
            next_seq: 0,
            disabled: BTreeSet::new(),
            vix: None,
            instrument,
            pipeline,
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn symbol(&self) -> &str {
        &self.instrument.symbol
    }

    pub fn is_warm(&self) -> bool {
        self.primary.engine.is_warm() && self.cross.engine.is_warm()
    }

    /// Account equity: starting capital plus realized P&L.
    pub fn equity(&self) -> f64 {
        self.initial_equity + self.book.realized_pnl()
    }

    pub fn positions(&self) -> &super::positions::PositionBook {
        &self.book
    }

    pub fn active_patterns(&self) -> Vec<Pattern> {
        self.primary.patterns.patterns()
    }

    pub fn set_vix(&mut self, vix: Option<f64>) {
        self.vix = vix;
    }

    /// Runtime override; takes effect from the next cycle.
    pub fn disable_strategy(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    pub fn enable_strategy(&mut self, name: &str) {
        self.disabled.remove(name);
    }

    pub fn last_cycle(&self) -> Option<NaiveDateTime> {
        self.last_cycle
    }

    /// Operator acceptance of a pending decision.
    ///
    /// Only a decision from the latest primary cycle is accepted; older ones
    /// come back `Expired`. Pyramiding, trap cooldown and session rules are
    /// checked again against open and queued entries. An accepted decision
    /// is queued for the next primary open and returned `Approved`.
    pub fn accept(&mut self, mut decision: Decision) -> Decision {
        if !decision.is_pending() {
            return decision;
        }
        let check = if decision.instrument != self.instrument.symbol || self.last_cycle != Some(decision.timestamp) {
            Err(DecisionReason::Expired)
        } else {
            self.pipeline.gate().recheck(
                &decision,
                RiskInput {
                    instrument: &self.instrument,
                    equity: self.equity(),
                    open_positions: self.book.open_positions(),
                    queued: self.book.queued(),
                    patterns: &self.primary.patterns,
                    trades_today: self.trades_today,
                    vix: self.vix,
                },
            )
        };
        match check {
            Ok(()) => {
                decision.status = DecisionStatus::Approved;
                self.book.queue_entry(&decision);
                self.trades_today += 1;
                info!(instrument = %decision.instrument, id = %decision.id, size = decision.size, "manual decision accepted");
            }
            Err(reason) => {
                decision.reject(reason);
                debug!(instrument = %decision.instrument, id = %decision.id, reason = ?decision.reason, "manual acceptance refused");
            }
        }
        decision
    }

    /// Store a newer snapshot; anything else is a data fault.
    pub fn on_open_interest(&mut self, snapshot: OiSnapshot) -> Option<Fault> {
        let fault = self.store_oi(snapshot);
        if let Some(f) = &fault {
            f.log();
        }
        fault
    }

    fn store_oi(&mut self, snapshot: OiSnapshot) -> Option<Fault> {
        if !snapshot.instrument.eq_ignore_ascii_case(self.symbol()) {
            return Some(self.fault(
                FaultKind::Data,
                self.pipeline.config().primary,
                snapshot.timestamp,
                "oi",
                format!("snapshot for {} routed to {}", snapshot.instrument, self.symbol()),
            ));
        }
        match &self.oi {
            Some(current) if current.timestamp >= snapshot.timestamp => Some(self.fault(
                FaultKind::Data,
                self.pipeline.config().primary,
                snapshot.timestamp,
                "oi",
                format!("snapshot not newer than {}", current.timestamp),
            )),
            _ => {
                self.oi = Some(snapshot);
                None
            }
        }
    }

    /// A gap voids the affected feature window until it re-warms.
    pub fn on_gap(&mut self, timeframe: Timeframe, from: NaiveDateTime, to: NaiveDateTime) -> Fault {
        let config = self.pipeline.config();
        if timeframe == config.primary {
            self.primary.reset();
        } else if timeframe == config.cross_check {
            self.cross.reset();
            self.cross_view = CrossCheckView::default();
        }
        let fault = self.fault(FaultKind::Data, timeframe, to, "feed", format!("gap from {from} to {to}"));
        fault.log();
        fault
    }

    pub fn on_candle(&mut self, candle: Candle, model: &dyn PredictionModel, market: &MarketSnapshot) -> LaneOutput {
        let (primary, cross_check) = {
            let config = self.pipeline.config();
            (config.primary, config.cross_check)
        };
        if candle.timeframe == cross_check {
            self.on_cross_candle(candle, market)
        } else if candle.timeframe == primary {
            self.on_primary_candle(candle, model, market)
        } else {
            let fault = self.fault(
                FaultKind::Data,
                candle.timeframe,
                candle.close_time(),
                "feed",
                "candle timeframe is neither primary nor cross-check".to_string(),
            );
            fault.log();
            LaneOutput::fault(fault)
        }
    }

    /// Close anything still open, e.g. at the end of a replay.
    pub fn finish(&mut self, at: NaiveDateTime, price: f64) -> Vec<Position> {
        let pipeline = Arc::clone(&self.pipeline);
        self.book
            .close_all(at, price, ExitReason::EndOfData, &self.instrument, &pipeline.config().fill)
    }

    fn on_cross_candle(&mut self, candle: Candle, market: &MarketSnapshot) -> LaneOutput {
        let pipeline = Arc::clone(&self.pipeline);
        let timeframe = candle.timeframe;
        let anchor = candle.close_time();
        let features = match self.cross.advance(&pipeline, candle, self.oi.as_ref()) {
            Ok(f) => f,
            Err(e) => {
                let fault = self.fault(FaultKind::Data, timeframe, anchor, "feed", e.to_string());
                fault.log();
                return LaneOutput::fault(fault);
            }
        };
        let mut out = LaneOutput::default();
        let oi_fresh = self.oi_fresh(anchor, timeframe, &mut out.faults);
        let patterns = self.cross.patterns.patterns();
        let run = pipeline.strategies().run(
            &StrategyContext {
                features: &features,
                patterns: &patterns,
                prediction: None,
                market,
                oi_fresh,
            },
            &self.disabled,
        );
        out.faults.extend(run.faults);
        self.cross_view = CrossCheckView {
            features: Some(features),
            signals: run.signals,
        };
        log_faults(&out.faults);
        out
    }

    fn on_primary_candle(&mut self, candle: Candle, model: &dyn PredictionModel, market: &MarketSnapshot) -> LaneOutput {
        let pipeline = Arc::clone(&self.pipeline);
        let config = pipeline.config();
        let timeframe = candle.timeframe;
        let anchor = candle.close_time();
        let mut out = LaneOutput::default();

        let day = candle.timestamp.date();
        if self.session_day != Some(day) {
            self.session_day = Some(day);
            self.trades_today = 0;
        }

        if let Err(e) = check_append(self.symbol(), timeframe, self.primary.engine.last(), &candle) {
            let fault = self.fault(FaultKind::Data, timeframe, anchor, "feed", e.to_string());
            fault.log();
            return LaneOutput::fault(fault);
        }
        self.last_cycle = Some(anchor);
        // fills and exits happen inside this candle, before its close reaches the pipeline
        out.closed = self
            .book
            .on_candle(&candle, &self.instrument, &config.fill, &config.session);

        let open = candle.open;
        let features = match self.primary.advance(&pipeline, candle, self.oi.as_ref()) {
            Ok(f) => f,
            Err(e) => {
                out.faults.push(self.fault(FaultKind::Data, timeframe, anchor, "feed", e.to_string()));
                log_faults(&out.faults);
                return out;
            }
        };
        out.view = Some(view_of(&features, open));

        if !self.primary.engine.is_warm() {
            return out;
        }

        let id = DecisionId::new(self.symbol(), self.next_seq);
        self.next_seq += 1;
        let close = features.get(names::CLOSE).unwrap_or(open);

        if !self.cross.engine.is_warm() {
            let decision = Aggregate {
                direction: Direction::Flat,
                confidence: 0.0,
                contributing: Vec::new(),
                rejection: Some(DecisionReason::NotWarm),
                stop_loss: None,
                take_profit: None,
                model_version: Some(model.version()),
                model_fallback: false,
            }
            .into_decision(id, self.symbol(), timeframe, anchor, close, config.mode);
            out.decision = Some(decision);
            return out;
        }

        let oi_fresh = self.oi_fresh(anchor, timeframe, &mut out.faults);

        let prediction = PredictionOutcome::from_model(model, &features);
        if let PredictionOutcome::Failed(e) = &prediction {
            out.faults.push(self.fault(FaultKind::Model, timeframe, anchor, "model", e.to_string()));
        }

        let patterns = self.primary.patterns.patterns();
        let run = pipeline.strategies().run(
            &StrategyContext {
                features: &features,
                patterns: &patterns,
                prediction: prediction.prediction(),
                market,
                oi_fresh,
            },
            &self.disabled,
        );
        out.faults.extend(run.faults);

        let empty = CrossCheckView::default();
        let cross_view = if self.cross_view_is_current(anchor) {
            &self.cross_view
        } else {
            &empty
        };
        let aggregate = pipeline.aggregator().aggregate(AggregationInput {
            primary: &run.signals,
            cross_check: cross_view,
            prediction: &prediction,
        });
        let decision = aggregate.into_decision(id, self.symbol(), timeframe, anchor, close, config.mode);

        let decision = pipeline.gate().evaluate(
            decision,
            RiskInput {
                instrument: &self.instrument,
                equity: self.equity(),
                open_positions: self.book.open_positions(),
                queued: self.book.queued(),
                patterns: &self.primary.patterns,
                trades_today: self.trades_today,
                vix: self.vix,
            },
        );

        if decision.is_approved() {
            self.book.queue_entry(&decision);
            self.trades_today += 1;
            info!(
                instrument = %decision.instrument,
                id = %decision.id,
                direction = %decision.direction,
                confidence = decision.confidence,
                size = decision.size,
                mode = ?decision.mode,
                "decision approved"
            );
        } else {
            debug!(
                instrument = %decision.instrument,
                id = %decision.id,
                status = ?decision.status,
                reason = ?decision.reason,
                "decision"
            );
        }
        log_faults(&out.faults);
        out.decision = Some(decision);
        out
    }

    /// Cross-check state must end at the primary anchor or one cross bar
    /// before it; anything later would be lookahead.
    fn cross_view_is_current(&self, anchor: NaiveDateTime) -> bool {
        let lag = self.pipeline.config().cross_check.duration();
        match self.cross_view.features.as_ref() {
            Some(f) => f.anchor <= anchor && anchor - f.anchor <= lag,
            None => false,
        }
    }

    fn oi_fresh(&self, anchor: NaiveDateTime, timeframe: Timeframe, faults: &mut Vec<Fault>) -> bool {
        let Some(snapshot) = &self.oi else {
            return false;
        };
        let max_age = chrono::Duration::minutes(self.pipeline.config().oi_max_age_minutes);
        if snapshot.timestamp > anchor {
            // only reachable if the feed delivered it early; detectors ignore it too
            faults.push(self.fault(FaultKind::Data, timeframe, anchor, "oi", format!("snapshot stamped {} after anchor", snapshot.timestamp)));
            false
        } else if anchor - snapshot.timestamp > max_age {
            faults.push(self.fault(FaultKind::Data, timeframe, anchor, "oi", format!("snapshot from {} is stale", snapshot.timestamp)));
            false
        } else {
            true
        }
    }

    fn fault(&self, kind: FaultKind, timeframe: Timeframe, at: NaiveDateTime, source: &str, detail: String) -> Fault {
        Fault::new(kind, self.symbol(), timeframe, at, source, detail)
    }
}

fn log_faults(faults: &[Fault]) {
    for fault in faults {
        fault.log();
    }
}

fn view_of(features: &FeatureSet, open: f64) -> InstrumentView {
    let close = features.get(names::CLOSE).unwrap_or(open);
    let change_pct = if open > 0.0 { (close - open) / open * 100.0 } else { 0.0 };
    let trend = match features.get(names::EMA_SPREAD) {
        Some(s) if s > 0.0 => Direction::Long,
        Some(s) if s < 0.0 => Direction::Short,
        _ => Direction::Flat,
    };
    InstrumentView {
        instrument: features.instrument.clone(),
        anchor: features.anchor,
        close,
        change_pct,
        trend,
    }
}
