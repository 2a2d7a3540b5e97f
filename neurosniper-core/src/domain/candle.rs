//! Candle, the fundamental market data unit.

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timeframe::Timeframe;

/// OHLCV bar for one instrument on one timeframe.
///
/// `timestamp` is the bar open in exchange-local time. A candle is immutable
/// once closed; the close time is `timestamp + timeframe.duration()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

impl Candle {
    pub fn close_time(&self) -> NaiveDateTime {
        self.timestamp + self.timeframe.duration()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Basic OHLC sanity check: high >= low, high >= open/close, positive prices.
    pub fn is_sane(&self) -> bool {
        if self.is_void() || self.volume.is_nan() || self.volume < 0.0 {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// One pull from a candle source.
///
/// Gaps are surfaced explicitly so feature windows spanning them can be invalidated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CandleEvent {
    Candle(Candle),
    Gap {
        instrument: String,
        timeframe: Timeframe,
        from: NaiveDateTime,
        to: NaiveDateTime,
    },
    EndOfStream,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("{instrument} {timeframe}: candle at {got} is not after last candle at {last}")]
    OutOfOrder {
        instrument: String,
        timeframe: Timeframe,
        last: NaiveDateTime,
        got: NaiveDateTime,
    },

    #[error("candle for {got_instrument}/{got_timeframe} pushed into {instrument}/{timeframe} series")]
    WrongSeries {
        instrument: String,
        timeframe: Timeframe,
        got_instrument: String,
        got_timeframe: Timeframe,
    },

    #[error("{instrument} {timeframe}: malformed candle at {timestamp}")]
    Malformed {
        instrument: String,
        timeframe: Timeframe,
        timestamp: NaiveDateTime,
    },
}

/// Append-only, strictly time-ordered candle sequence for one (instrument, timeframe).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    instrument: String,
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            candles: Vec::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    pub fn push(&mut self, candle: Candle) -> Result<(), SeriesError> {
        check_append(&self.instrument, self.timeframe, self.candles.last(), &candle)?;
        self.candles.push(candle);
        Ok(())
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn into_vec(self) -> Vec<Candle> {
        self.candles
    }
}

/// Validate that `next` may follow `last` in the (instrument, timeframe) series.
pub fn check_append(
    instrument: &str,
    timeframe: Timeframe,
    last: Option<&Candle>,
    next: &Candle,
) -> Result<(), SeriesError> {
    if next.instrument != instrument || next.timeframe != timeframe {
        return Err(SeriesError::WrongSeries {
            instrument: instrument.to_string(),
            timeframe,
            got_instrument: next.instrument.clone(),
            got_timeframe: next.timeframe,
        });
    }
    if !next.is_sane() {
        return Err(SeriesError::Malformed {
            instrument: instrument.to_string(),
            timeframe,
            timestamp: next.timestamp,
        });
    }
    if let Some(prev) = last {
        if next.timestamp <= prev.timestamp {
            return Err(SeriesError::OutOfOrder {
                instrument: instrument.to_string(),
                timeframe,
                last: prev.timestamp,
                got: next.timestamp,
            });
        }
    }
    Ok(())
}

/// Build coarser candles from a finer, time-ordered series.
///
/// Buckets are aligned to the session open (09:15) so 15m bars start at
/// 09:15, 09:30, ... Only complete buckets are emitted: a trailing partial
/// bucket, or one with missing constituent bars, is dropped rather than
/// emitted as if it had closed.
pub fn resample(candles: &[Candle], target: Timeframe) -> Vec<Candle> {
    let Some(first) = candles.first() else {
        return Vec::new();
    };
    let source = first.timeframe;
    if !target.is_multiple_of(source) {
        return Vec::new();
    }
    let per_bucket = (target.minutes() / source.minutes()) as usize;

    let mut out = Vec::new();
    let mut bucket: Vec<&Candle> = Vec::with_capacity(per_bucket);
    let mut bucket_start: Option<NaiveDateTime> = None;

    for candle in candles {
        let start = bucket_start_for(candle.timestamp, target);
        if bucket_start != Some(start) {
            if let Some(done) = merge_bucket(&bucket, per_bucket, target) {
                out.push(done);
            }
            bucket.clear();
            bucket_start = Some(start);
        }
        bucket.push(candle);
    }
    if let Some(done) = merge_bucket(&bucket, per_bucket, target) {
        out.push(done);
    }
    out
}

const SESSION_OPEN_MINUTE: i64 = 9 * 60 + 15;

fn bucket_start_for(ts: NaiveDateTime, target: Timeframe) -> NaiveDateTime {
    let minute_of_day = (ts.hour() * 60 + ts.minute()) as i64;
    let since_open = minute_of_day - SESSION_OPEN_MINUTE;
    let offset = since_open.rem_euclid(target.minutes());
    let trimmed = ts.with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(ts);
    trimmed - chrono::Duration::minutes(offset)
}

fn merge_bucket(bucket: &[&Candle], per_bucket: usize, target: Timeframe) -> Option<Candle> {
    if bucket.len() != per_bucket {
        return None;
    }
    let first = bucket.first()?;
    let last = bucket.last()?;
    let high = bucket.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = bucket.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let volume = bucket.iter().map(|c| c.volume).sum();
    Some(Candle {
        instrument: first.instrument.clone(),
        timeframe: target,
        timestamp: bucket_start_for(first.timestamp, target),
        open: first.open,
        high,
        low,
        close: last.close,
        volume,
        open_interest: last.open_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn candle(h: u32, m: u32, close: f64) -> Candle {
        Candle {
            instrument: "NIFTY".into(),
            timeframe: Timeframe::M5,
            timestamp: ts(h, m),
            open: close - 1.0,
            high: close + 2.0,
            low: close - 3.0,
            close,
            volume: 1000.0,
            open_interest: None,
        }
    }

    #[test]
    fn candle_is_sane() {
        assert!(candle(9, 15, 100.0).is_sane());
        let mut bad = candle(9, 15, 100.0);
        bad.high = 90.0;
        assert!(!bad.is_sane());
        bad = candle(9, 15, 100.0);
        bad.close = f64::NAN;
        assert!(bad.is_void());
    }

    #[test]
    fn close_time_adds_duration() {
        assert_eq!(candle(9, 15, 100.0).close_time(), ts(9, 20));
    }

    #[test]
    fn series_rejects_out_of_order() {
        let mut series = CandleSeries::new("NIFTY", Timeframe::M5);
        series.push(candle(9, 20, 100.0)).unwrap();
        let err = series.push(candle(9, 15, 101.0)).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { .. }));
        let err = series.push(candle(9, 20, 101.0)).unwrap_err();
        assert!(matches!(err, SeriesError::OutOfOrder { .. }));
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn series_rejects_foreign_candles() {
        let mut series = CandleSeries::new("BANKNIFTY", Timeframe::M5);
        let err = series.push(candle(9, 15, 100.0)).unwrap_err();
        assert!(matches!(err, SeriesError::WrongSeries { .. }));
    }

    #[test]
    fn resample_builds_complete_buckets_only() {
        let five: Vec<Candle> = [(9, 15), (9, 20), (9, 25), (9, 30), (9, 35)]
            .iter()
            .enumerate()
            .map(|(i, &(h, m))| candle(h, m, 100.0 + i as f64))
            .collect();
        let fifteen = resample(&five, Timeframe::M15);
        assert_eq!(fifteen.len(), 1);
        let bar = &fifteen[0];
        assert_eq!(bar.timestamp, ts(9, 15));
        assert_eq!(bar.open, five[0].open);
        assert_eq!(bar.close, five[2].close);
        assert_eq!(bar.high, five[2].high);
        assert_eq!(bar.low, five[0].low);
        assert_eq!(bar.volume, 3000.0);
        assert_eq!(bar.timeframe, Timeframe::M15);
    }

    #[test]
    fn resample_drops_bucket_with_missing_bar() {
        let five = vec![candle(9, 15, 100.0), candle(9, 25, 101.0)];
        assert!(resample(&five, Timeframe::M15).is_empty());
    }
}
