//! Historical feeds: the merged event stream a replay walks, and a
//! clock-driven source that plays the same history through the live engine.
//!
//! Ordering is by the time an event becomes known (candle close, OI
//! snapshot time). At equal times OI comes first, then gaps, then the
//! cross-check candle, then the primary candle, so a primary cycle always
//! sees the cross-check bar that closed with it.

use std::collections::{BTreeMap, VecDeque};

use chrono::NaiveDateTime;

use neurosniper_core::domain::{Candle, CandleEvent, OiSnapshot, Timeframe};
use neurosniper_core::engine::{CandleSource, FeedEvent, OpenInterestSource, SourceError};

use crate::data_loader::MarketData;

/// Candle events for one series, with a `Gap` ahead of any candle that does
/// not follow its predecessor within the same session day.
pub fn series_events(candles: &[Candle]) -> Vec<CandleEvent> {
    let mut events = Vec::with_capacity(candles.len());
    let mut prev: Option<&Candle> = None;
    for candle in candles {
        if let Some(p) = prev {
            let expected = p.close_time();
            if p.timestamp.date() == candle.timestamp.date() && candle.timestamp != expected {
                events.push(CandleEvent::Gap {
                    instrument: candle.instrument.clone(),
                    timeframe: candle.timeframe,
                    from: expected,
                    to: candle.timestamp,
                });
            }
        }
        events.push(CandleEvent::Candle(candle.clone()));
        prev = Some(candle);
    }
    events
}

/// Fully merged, time-ordered replay input for one instrument.
#[derive(Debug, Clone, Default)]
pub struct HistoricalFeed {
    events: Vec<FeedEvent>,
    primary_candles: usize,
}

impl HistoricalFeed {
    pub fn new(data: &MarketData, primary: Timeframe, cross_check: Timeframe) -> Self {
        let mut keyed: Vec<((NaiveDateTime, u8), FeedEvent)> = Vec::new();
        for snapshot in &data.oi {
            keyed.push(((snapshot.timestamp, 0), FeedEvent::OpenInterest(snapshot.clone())));
        }
        let mut primary_candles = 0;
        for (timeframe, rank) in [(cross_check, 2), (primary, 3)] {
            for event in series_events(&data.series(timeframe)) {
                let Some(event) = FeedEvent::from_candle_event(event) else {
                    continue;
                };
                let rank = match &event {
                    FeedEvent::Gap { .. } => 1,
                    _ => {
                        if timeframe == primary {
                            primary_candles += 1;
                        }
                        rank
                    }
                };
                keyed.push(((event.available_at(), rank), event));
            }
        }
        // stable: equal keys keep series order
        keyed.sort_by_key(|(key, _)| *key);
        Self {
            events: keyed.into_iter().map(|(_, e)| e).collect(),
            primary_candles,
        }
    }

    pub fn events(&self) -> &[FeedEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<FeedEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn primary_candles(&self) -> usize {
        self.primary_candles
    }
}

/// Pull-style playback of history behind a movable clock.
///
/// A candle is only handed out once its close time is at or before the
/// clock; before that `next` answers `Timeout`, as a live source would.
/// `latest` returns the newest OI snapshot not yet delivered. Drivers
/// advance the clock one cross-check bar at a time and poll until nothing
/// more is submitted.
#[derive(Debug, Clone)]
pub struct HistoricalSource {
    series: BTreeMap<(String, Timeframe), VecDeque<CandleEvent>>,
    oi: BTreeMap<String, VecDeque<OiSnapshot>>,
    clock: NaiveDateTime,
}

impl HistoricalSource {
    pub fn new(data: &[MarketData], primary: Timeframe, cross_check: Timeframe) -> Self {
        let mut series = BTreeMap::new();
        let mut oi = BTreeMap::new();
        let mut clock: Option<NaiveDateTime> = None;
        for d in data {
            for timeframe in [cross_check, primary] {
                let events: VecDeque<CandleEvent> = series_events(&d.series(timeframe)).into();
                series.insert((d.instrument.clone(), timeframe), events);
            }
            oi.insert(d.instrument.clone(), d.oi.iter().cloned().collect());
            if let Some(first) = d.candles.first() {
                clock = Some(clock.map_or(first.timestamp, |c| c.min(first.timestamp)));
            }
        }
        Self {
            series,
            oi,
            clock: clock.unwrap_or_default(),
        }
    }

    pub fn clock(&self) -> NaiveDateTime {
        self.clock
    }

    /// Move the clock forward; it never goes back.
    pub fn advance_to(&mut self, at: NaiveDateTime) {
        if at > self.clock {
            self.clock = at;
        }
    }

    /// True once every candle and snapshot has been handed out.
    pub fn is_exhausted(&self) -> bool {
        self.series.values().all(VecDeque::is_empty) && self.oi.values().all(VecDeque::is_empty)
    }
}

fn event_time(event: &CandleEvent) -> Option<NaiveDateTime> {
    match event {
        CandleEvent::Candle(c) => Some(c.close_time()),
        CandleEvent::Gap { to, .. } => Some(*to),
        CandleEvent::EndOfStream => None,
    }
}

impl CandleSource for HistoricalSource {
    fn next(&mut self, instrument: &str, timeframe: Timeframe) -> Result<CandleEvent, SourceError> {
        let key = (instrument.to_string(), timeframe);
        let Some(queue) = self.series.get_mut(&key) else {
            return Err(SourceError::Disconnected(format!("no history for {instrument} {timeframe}")));
        };
        match queue.front().and_then(event_time) {
            None => Ok(CandleEvent::EndOfStream),
            Some(at) if at > self.clock => Err(SourceError::Timeout),
            Some(_) => Ok(queue.pop_front().unwrap_or(CandleEvent::EndOfStream)),
        }
    }
}

impl OpenInterestSource for HistoricalSource {
    fn latest(&mut self, instrument: &str) -> Result<Option<OiSnapshot>, SourceError> {
        let Some(queue) = self.oi.get_mut(instrument) else {
            return Ok(None);
        };
        let mut newest = None;
        while queue.front().is_some_and(|s| s.timestamp <= self.clock) {
            newest = queue.pop_front();
        }
        Ok(newest)
    }
}
