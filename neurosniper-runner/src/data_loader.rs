//! Historical candles and OI chains for replay and retraining.
//!
//! Two sources:
//! 1. CSV files (candles, optional OI chain rows)
//! 2. Deterministic synthetic sessions, seeded from the instrument name
//!
//! Both produce a [`MarketData`] at a single base timeframe; coarser series
//! are resampled from it by the feed. Synthetic results are tagged.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use neurosniper_core::domain::{resample, Candle, DatasetHash, OiSnapshot, StrikeOi, Timeframe};

use crate::config::DataConfig;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} line {line}: unparseable timestamp '{value}'")]
    BadTimestamp { path: PathBuf, line: u64, value: String },

    #[error("{path}: timeframe {file} cannot be resampled to {target}")]
    Timeframe {
        path: PathBuf,
        file: Timeframe,
        target: Timeframe,
    },

    #[error("no candles for {instrument} between {start} and {end}")]
    Empty {
        instrument: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

/// One instrument's history at the base timeframe.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketData {
    pub instrument: String,
    pub timeframe: Timeframe,
    /// Time-ordered, unique timestamps.
    pub candles: Vec<Candle>,
    /// Time-ordered OI chain snapshots.
    pub oi: Vec<OiSnapshot>,
    pub synthetic: bool,
}

impl MarketData {
    /// Candles at `target`, resampled from the base series when coarser.
    pub fn series(&self, target: Timeframe) -> Vec<Candle> {
        if target == self.timeframe {
            self.candles.clone()
        } else {
            resample(&self.candles, target)
        }
    }

    /// Restrict to `[start, end]` by candle date.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> MarketData {
        MarketData {
            instrument: self.instrument.clone(),
            timeframe: self.timeframe,
            candles: self
                .candles
                .iter()
                .filter(|c| (start..=end).contains(&c.timestamp.date()))
                .cloned()
                .collect(),
            oi: self
                .oi
                .iter()
                .filter(|s| (start..=end).contains(&s.timestamp.date()))
                .cloned()
                .collect(),
            synthetic: self.synthetic,
        }
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.candles.first().map(|c| c.timestamp.date())
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.candles.last().map(|c| c.timestamp.date())
    }
}

/// Load `instrument` between `start` and `end` (inclusive) at `base`.
pub fn load_market_data(
    instrument: &str,
    start: NaiveDate,
    end: NaiveDate,
    data: &DataConfig,
    base: Timeframe,
) -> Result<MarketData, LoadError> {
    let loaded = match data {
        DataConfig::Synthetic { seed } => {
            let seed = seed.as_deref().unwrap_or(instrument);
            generate_synthetic(instrument, seed, start, end, base)
        }
        DataConfig::Csv { candles, oi, timeframe } => {
            let mut rows = read_candles_csv(candles, instrument, *timeframe)?;
            if *timeframe != base {
                if !base.is_multiple_of(*timeframe) {
                    return Err(LoadError::Timeframe {
                        path: candles.clone(),
                        file: *timeframe,
                        target: base,
                    });
                }
                rows = resample(&rows, base);
            }
            let snapshots = match oi {
                Some(path) => read_oi_csv(path, instrument)?,
                None => Vec::new(),
            };
            MarketData {
                instrument: instrument.to_string(),
                timeframe: base,
                candles: rows,
                oi: snapshots,
                synthetic: false,
            }
            .between(start, end)
        }
    };
    if loaded.candles.is_empty() {
        return Err(LoadError::Empty {
            instrument: instrument.to_string(),
            start,
            end,
        });
    }
    debug!(
        instrument,
        candles = loaded.candles.len(),
        oi_snapshots = loaded.oi.len(),
        synthetic = loaded.synthetic,
        "market data loaded"
    );
    Ok(loaded)
}

/// Deterministic BLAKE3 hash over candles and OI snapshots.
///
/// Covers timestamps, OHLCV, candle OI and every strike in ascending order,
/// so equal data always hashes equal.
pub fn compute_dataset_hash(data: &MarketData) -> DatasetHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(data.instrument.as_bytes());
    hasher.update(data.timeframe.label().as_bytes());
    for c in &data.candles {
        hasher.update(c.timestamp.to_string().as_bytes());
        hasher.update(&c.open.to_le_bytes());
        hasher.update(&c.high.to_le_bytes());
        hasher.update(&c.low.to_le_bytes());
        hasher.update(&c.close.to_le_bytes());
        hasher.update(&c.volume.to_le_bytes());
        hasher.update(&c.open_interest.unwrap_or(f64::NAN).to_le_bytes());
    }
    for snapshot in &data.oi {
        hasher.update(snapshot.timestamp.to_string().as_bytes());
        for (strike, oi) in &snapshot.strikes {
            hasher.update(&strike.to_le_bytes());
            hasher.update(&oi.call_oi.to_le_bytes());
            hasher.update(&oi.put_oi.to_le_bytes());
            hasher.update(&oi.call_oi_change.to_le_bytes());
            hasher.update(&oi.put_oi_change.to_le_bytes());
        }
    }
    DatasetHash(hasher.finalize().to_hex().to_string())
}

// ─── CSV ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CandleRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    #[serde(default)]
    open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OiRow {
    timestamp: String,
    strike: i64,
    call_oi: f64,
    put_oi: f64,
    #[serde(default)]
    call_oi_change: Option<f64>,
    #[serde(default)]
    put_oi_change: Option<f64>,
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

fn open_csv(path: &Path) -> Result<csv::Reader<std::fs::File>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(file))
}

/// Candle CSV: `timestamp,open,high,low,close,volume[,open_interest]`,
/// timestamp is the bar open. Rows are sorted; repeated timestamps keep the
/// first row.
pub fn read_candles_csv(path: &Path, instrument: &str, timeframe: Timeframe) -> Result<Vec<Candle>, LoadError> {
    let mut reader = open_csv(path)?;
    let mut candles = Vec::new();
    for (i, row) in reader.deserialize::<CandleRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadTimestamp {
            path: path.to_path_buf(),
            line: i as u64 + 2,
            value: row.timestamp.clone(),
        })?;
        candles.push(Candle {
            instrument: instrument.to_string(),
            timeframe,
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
            open_interest: row.open_interest,
        });
    }
    candles.sort_by_key(|c| c.timestamp);
    let before = candles.len();
    candles.dedup_by_key(|c| c.timestamp);
    if candles.len() != before {
        warn!(
            path = %path.display(),
            dropped = before - candles.len(),
            "duplicate candle timestamps dropped"
        );
    }
    Ok(candles)
}

/// OI CSV: one row per (timestamp, strike), grouped into snapshots.
pub fn read_oi_csv(path: &Path, instrument: &str) -> Result<Vec<OiSnapshot>, LoadError> {
    let mut reader = open_csv(path)?;
    let mut grouped: BTreeMap<NaiveDateTime, OiSnapshot> = BTreeMap::new();
    for (i, row) in reader.deserialize::<OiRow>().enumerate() {
        let row = row.map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadTimestamp {
            path: path.to_path_buf(),
            line: i as u64 + 2,
            value: row.timestamp.clone(),
        })?;
        grouped
            .entry(timestamp)
            .or_insert_with(|| OiSnapshot::new(instrument, timestamp))
            .strikes
            .insert(
                row.strike,
                StrikeOi {
                    call_oi: row.call_oi,
                    put_oi: row.put_oi,
                    call_oi_change: row.call_oi_change.unwrap_or(0.0),
                    put_oi_change: row.put_oi_change.unwrap_or(0.0),
                },
            );
    }
    Ok(grouped.into_values().collect())
}

// ─── Synthetic sessions ─────────────────────────────────────────────

fn session_open() -> NaiveTime {
    NaiveTime::from_hms_opt(9, 15, 0).unwrap_or(NaiveTime::MIN)
}

const SESSION_MINUTES: i64 = 375;
const OI_EVERY_MINUTES: i64 = 15;
const OI_STRIKES_EACH_SIDE: i64 = 10;

fn base_price(instrument: &str) -> f64 {
    match instrument.to_ascii_uppercase().as_str() {
        "NIFTY" => 22_000.0,
        "BANKNIFTY" => 48_000.0,
        "FINNIFTY" => 21_500.0,
        "MIDCPNIFTY" => 11_000.0,
        _ => 10_000.0,
    }
}

fn strike_step(instrument: &str) -> i64 {
    match instrument.to_ascii_uppercase().as_str() {
        "BANKNIFTY" => 100,
        "MIDCPNIFTY" => 25,
        _ => 50,
    }
}

/// Generate weekday sessions (09:15 to 15:30) of `timeframe` bars plus an OI
/// chain every 15 minutes.
///
/// Each day draws a drift regime; OI put writing follows an up drift and
/// call writing a down drift. The same seed always yields the same data.
pub fn generate_synthetic(
    instrument: &str,
    seed: &str,
    start: NaiveDate,
    end: NaiveDate,
    timeframe: Timeframe,
) -> MarketData {
    let mut rng = StdRng::from_seed(*blake3::hash(seed.as_bytes()).as_bytes());
    let symbol = instrument.to_ascii_uppercase();
    let step = strike_step(&symbol);
    let bars_per_day = SESSION_MINUTES / timeframe.minutes();

    let mut candles = Vec::new();
    let mut oi: Vec<OiSnapshot> = Vec::new();
    let mut price = base_price(&symbol);
    let mut day = start;

    while day <= end {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            day += Duration::days(1);
            continue;
        }
        let drift: f64 = rng.gen_range(-0.0006..0.0006);
        let vol: f64 = rng.gen_range(0.0006..0.0016);
        price *= 1.0 + rng.gen_range(-0.004_f64..0.004);
        let open_at = day.and_time(session_open());

        for i in 0..bars_per_day {
            let timestamp = open_at + Duration::minutes(i * timeframe.minutes());
            let noise = rng.gen_range(-1.0_f64..1.0) + rng.gen_range(-1.0_f64..1.0);
            let open = price;
            let close = (open * (1.0 + drift + vol * noise)).max(1.0);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol));
            let edge = i < 3 || i >= bars_per_day - 3;
            let volume = rng.gen_range(50_000.0_f64..150_000.0) * if edge { 1.6 } else { 1.0 };
            let candle = Candle {
                instrument: symbol.clone(),
                timeframe,
                timestamp,
                open,
                high,
                low,
                close,
                volume: volume.round(),
                open_interest: None,
            };
            let close_time = candle.close_time();
            candles.push(candle);
            price = close;

            if (close_time - open_at).num_minutes() % OI_EVERY_MINUTES == 0 {
                let snapshot = synthetic_chain(&mut rng, &symbol, close_time, close, step, drift, oi.last());
                oi.push(snapshot);
            }
        }
        day += Duration::days(1);
    }

    MarketData {
        instrument: symbol,
        timeframe,
        candles,
        oi,
        synthetic: true,
    }
}

fn synthetic_chain(
    rng: &mut StdRng,
    instrument: &str,
    timestamp: NaiveDateTime,
    spot: f64,
    step: i64,
    drift: f64,
    previous: Option<&OiSnapshot>,
) -> OiSnapshot {
    let atm = (spot / step as f64).round() as i64 * step;
    // >1 tilts writing towards puts (support below), <1 towards calls
    let tilt = 1.0 + drift * 800.0;
    let mut snapshot = OiSnapshot::new(instrument, timestamp);
    for k in -OI_STRIKES_EACH_SIDE..=OI_STRIKES_EACH_SIDE {
        let strike = atm + k * step;
        let distance = (k.abs() as f64) / 4.0;
        let base = 1_000_000.0 * (-distance).exp();
        let call_weight = if k >= 0 { 1.2 } else { 0.6 };
        let put_weight = if k <= 0 { 1.2 } else { 0.6 };
        let call_oi = (base * call_weight * rng.gen_range(0.8_f64..1.2) / tilt).round();
        let put_oi = (base * put_weight * rng.gen_range(0.8_f64..1.2) * tilt).round();
        let prior = previous.and_then(|p| p.strikes.get(&strike));
        snapshot.strikes.insert(
            strike,
            StrikeOi {
                call_oi,
                put_oi,
                call_oi_change: prior.map_or(0.0, |p| call_oi - p.call_oi),
                put_oi_change: prior.map_or(0.0, |p| put_oi - p.put_oi),
            },
        );
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn synthetic_is_deterministic_and_session_shaped() {
        // 2025-05-02 is a Friday, 05-03/04 the weekend
        let a = generate_synthetic("NIFTY", "NIFTY", date(2025, 5, 2), date(2025, 5, 5), Timeframe::M5);
        let b = generate_synthetic("NIFTY", "NIFTY", date(2025, 5, 2), date(2025, 5, 5), Timeframe::M5);
        assert_eq!(a, b);
        assert_eq!(compute_dataset_hash(&a), compute_dataset_hash(&b));
        assert!(a.synthetic);
        assert_eq!(a.candles.len(), 2 * 75);
        assert_eq!(a.candles[0].timestamp, date(2025, 5, 2).and_hms_opt(9, 15, 0).unwrap());
        assert_eq!(a.candles[74].close_time(), date(2025, 5, 2).and_hms_opt(15, 30, 0).unwrap());
        assert!(a.candles.iter().all(|c| c.is_sane()));
        assert!(a.candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        // 375 minutes / 15 = 25 chains a day
        assert_eq!(a.oi.len(), 50);
        assert_eq!(a.oi[0].timestamp, date(2025, 5, 2).and_hms_opt(9, 30, 0).unwrap());
        assert_eq!(a.oi[0].strikes.len(), 21);
    }

    #[test]
    fn synthetic_seed_changes_data() {
        let a = generate_synthetic("NIFTY", "NIFTY", date(2025, 5, 5), date(2025, 5, 5), Timeframe::M5);
        let b = generate_synthetic("NIFTY", "other", date(2025, 5, 5), date(2025, 5, 5), Timeframe::M5);
        assert_ne!(compute_dataset_hash(&a), compute_dataset_hash(&b));
    }

    #[test]
    fn primary_series_resamples_full_sessions() {
        let data = generate_synthetic("BANKNIFTY", "x", date(2025, 5, 5), date(2025, 5, 6), Timeframe::M5);
        let fifteen = data.series(Timeframe::M15);
        assert_eq!(fifteen.len(), 2 * 25);
        assert!(fifteen.iter().all(|c| c.timeframe == Timeframe::M15));
        assert_eq!(fifteen[0].open, data.candles[0].open);
        assert_eq!(fifteen[0].close, data.candles[2].close);
    }

    #[test]
    fn empty_range_is_an_error() {
        // a weekend only
        let err = load_market_data(
            "NIFTY",
            date(2025, 5, 3),
            date(2025, 5, 4),
            &DataConfig::default(),
            Timeframe::M5,
        )
        .unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[test]
    fn csv_candles_and_oi() {
        let dir = tempfile::tempdir().unwrap();
        let candles = dir.path().join("nifty.csv");
        let mut f = std::fs::File::create(&candles).unwrap();
        writeln!(f, "timestamp,open,high,low,close,volume").unwrap();
        // out of order and one duplicate
        writeln!(f, "2025-05-05 09:20:00,101,103,100,102,1100").unwrap();
        writeln!(f, "2025-05-05 09:15:00,100,102,99,101,1000").unwrap();
        writeln!(f, "2025-05-05 09:20:00,1,1,1,1,1").unwrap();
        writeln!(f, "2025-05-05 09:25:00,102,104,101,103,1200").unwrap();
        writeln!(f, "2025-05-06 09:15:00,103,104,102,103.5,900").unwrap();
        drop(f);

        let oi = dir.path().join("oi.csv");
        let mut f = std::fs::File::create(&oi).unwrap();
        writeln!(f, "timestamp,strike,call_oi,put_oi").unwrap();
        writeln!(f, "2025-05-05 09:30:00,22000,100,150").unwrap();
        writeln!(f, "2025-05-05 09:30:00,22050,120,80").unwrap();
        writeln!(f, "2025-05-05 09:45:00,22000,110,160").unwrap();
        drop(f);

        let config = DataConfig::Csv {
            candles: candles.clone(),
            oi: Some(oi),
            timeframe: Timeframe::M5,
        };
        let data = load_market_data("NIFTY", date(2025, 5, 5), date(2025, 5, 5), &config, Timeframe::M5).unwrap();
        assert!(!data.synthetic);
        assert_eq!(data.candles.len(), 3);
        assert_eq!(data.candles[1].close, 102.0);
        assert_eq!(data.oi.len(), 2);
        assert_eq!(data.oi[0].strikes.len(), 2);
        assert_eq!(data.oi[1].strikes[&22000].put_oi, 160.0);

        let whole = read_candles_csv(&candles, "NIFTY", Timeframe::M5).unwrap();
        assert_eq!(whole.len(), 4);
    }

    #[test]
    fn csv_bad_timestamp_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(
            &path,
            "timestamp,open,high,low,close,volume\n2025-05-05 09:15:00,1,1,1,1,1\nyesterday,1,1,1,1,1\n",
        )
        .unwrap();
        let err = read_candles_csv(&path, "NIFTY", Timeframe::M5).unwrap_err();
        match err {
            LoadError::BadTimestamp { line, value, .. } => {
                assert_eq!(line, 3);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = read_candles_csv(Path::new("/nonexistent/candles.csv"), "NIFTY", Timeframe::M5).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
