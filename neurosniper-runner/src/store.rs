//! Run store: JSONL append-only persistence of replays and their positions.
//!
//! Two files in one directory:
//! - `runs.jsonl`: one [`RunRecord`] per replay (fingerprint, digest, metrics)
//! - `positions.jsonl`: one [`PositionRecord`] per closed position, keyed by
//!   (instrument, entry time)
//!
//! Each line is an independent JSON object; malformed lines are skipped on
//! read so a torn write never poisons the store.

use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use neurosniper_core::domain::{Position, RunFingerprint};

use crate::metrics::PerformanceMetrics;
use crate::runner::{BacktestRun, SCHEMA_VERSION};

const RUNS_FILE: &str = "runs.jsonl";
const POSITIONS_FILE: &str = "positions.jsonl";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("run store I/O: {0}")]
    Io(#[from] io::Error),

    #[error("run store serialization: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary of one stored replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub instrument: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub fingerprint: RunFingerprint,
    pub fingerprint_hash: String,
    pub decision_digest: String,
    pub decision_count: usize,
    pub approved_count: usize,
    pub metrics: PerformanceMetrics,
    pub synthetic: bool,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunRecord {
    pub fn from_run(run: &BacktestRun) -> Self {
        Self {
            schema_version: run.schema_version,
            instrument: run.instrument.clone(),
            start: run.start,
            end: run.end,
            fingerprint: run.fingerprint.clone(),
            fingerprint_hash: run.fingerprint_hash.clone(),
            decision_digest: run.decision_digest.clone(),
            decision_count: run.decisions.len(),
            approved_count: run.decisions.iter().filter(|d| d.is_approved()).count(),
            metrics: run.metrics.clone(),
            synthetic: run.synthetic,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    /// Fingerprint hash of the run that produced the position.
    pub run: String,
    #[serde(flatten)]
    pub position: Position,
}

/// Instrument and inclusive date-range filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunQuery {
    pub instrument: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl RunQuery {
    pub fn instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    fn instrument_matches(&self, instrument: &str) -> bool {
        self.instrument
            .as_deref()
            .map_or(true, |want| want.eq_ignore_ascii_case(instrument))
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }

    /// Runs whose [start, end] overlaps the query range.
    pub fn matches_run(&self, run: &RunRecord) -> bool {
        self.instrument_matches(&run.instrument)
            && self.from.map_or(true, |f| run.end >= f)
            && self.to.map_or(true, |t| run.start <= t)
    }

    /// Positions entered inside the query range.
    pub fn matches_position(&self, record: &PositionRecord) -> bool {
        self.instrument_matches(&record.position.instrument) && self.date_matches(record.position.entry_time.date())
    }
}

pub struct RunStore {
    dir: PathBuf,
}

impl RunStore {
    /// Open (creating if needed) a store directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append a run summary and its closed positions.
    pub fn append(&self, run: &BacktestRun) -> Result<(), StoreError> {
        let record = RunRecord::from_run(run);
        let mut runs = self.open_append(RUNS_FILE)?;
        writeln!(runs, "{}", serde_json::to_string(&record)?)?;
        runs.flush()?;

        let mut positions = self.open_append(POSITIONS_FILE)?;
        for position in run.positions.iter().filter(|p| !p.is_open()) {
            let line = serde_json::to_string(&PositionRecord {
                run: run.fingerprint_hash.clone(),
                position: position.clone(),
            })?;
            writeln!(positions, "{line}")?;
        }
        positions.flush()?;
        debug!(
            instrument = %run.instrument,
            fingerprint = %run.fingerprint_hash,
            positions = run.positions.len(),
            "run stored"
        );
        Ok(())
    }

    fn open_append(&self, name: &str) -> io::Result<fs::File> {
        OpenOptions::new().create(true).append(true).open(self.dir.join(name))
    }

    /// Every readable run, in append order.
    pub fn runs(&self) -> Result<Vec<RunRecord>, StoreError> {
        read_jsonl(&self.dir.join(RUNS_FILE))
    }

    pub fn query_runs(&self, query: &RunQuery) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self.runs()?.into_iter().filter(|r| query.matches_run(r)).collect())
    }

    /// Runs recorded with the given input fingerprint hash.
    pub fn runs_with_fingerprint(&self, fingerprint_hash: &str) -> Result<Vec<RunRecord>, StoreError> {
        Ok(self
            .runs()?
            .into_iter()
            .filter(|r| r.fingerprint_hash == fingerprint_hash)
            .collect())
    }

    /// Closed positions ordered by (instrument, entry time).
    pub fn query_positions(&self, query: &RunQuery) -> Result<Vec<PositionRecord>, StoreError> {
        let mut positions: Vec<PositionRecord> = read_jsonl(&self.dir.join(POSITIONS_FILE))?
            .into_iter()
            .filter(|p| query.matches_position(p))
            .collect();
        positions.sort_by(|a, b| {
            (&a.position.instrument, a.position.entry_time, &a.position.decision_id).cmp(&(
                &b.position.instrument,
                b.position.entry_time,
                &b.position.decision_id,
            ))
        });
        Ok(positions)
    }
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = io::BufReader::new(fs::File::open(path)?);
    let mut entries = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(&line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(path = %path.display(), line = i + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(entries)
}
