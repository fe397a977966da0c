// src/history/failures.rs

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use super::write_atomic;
use crate::error::FetchError;
use crate::fetch::RequestKey;

/// One request triple that produced no data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub year: i32,
    pub state_fips: String,
    pub group: String,
    pub kind: String,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(key: &RequestKey, err: &FetchError) -> Self {
        Self {
            year: key.year,
            state_fips: key.state_fips.clone(),
            group: key.group.clone(),
            kind: err.kind().to_string(),
            message: err.to_string(),
            recorded_at: Utc::now(),
        }
    }
}

/// Request outcomes for one state of one year, saved next to the state
/// checkpoint so a resumed run reports the same counts as the run that
/// fetched the state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateLedger {
    pub succeeded: usize,
    pub failures: Vec<FailureRecord>,
}

impl StateLedger {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self, key: &RequestKey, err: &FetchError) -> &FailureRecord {
        self.failures.push(FailureRecord::new(key, err));
        &self.failures[self.failures.len() - 1]
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(self).context("serializing state ledger")?;
        json.push(b'\n');
        write_atomic(path, &json)
    }

    /// `None` when the file is missing.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&text)
            .map(Some)
            .with_context(|| format!("parsing {}", path.display()))
    }
}

/// Outcome counts for one `collect_year` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct YearReport {
    pub year: i32,
    pub succeeded: usize,
    pub failures: Vec<FailureRecord>,
    /// States loaded from a checkpoint instead of fetched.
    pub resumed_states: Vec<String>,
    pub fetched_states: Vec<String>,
    /// States for which every group failed.
    pub empty_states: Vec<String>,
    pub places: usize,
    pub variables: usize,
}

impl YearReport {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            ..Default::default()
        }
    }

    pub fn absorb(&mut self, state: StateLedger) {
        self.succeeded += state.succeeded;
        self.failures.extend(state.failures);
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// Rewrite the failure ledger at `path` as pretty JSON.
pub fn write_failures(path: &Path, records: &[FailureRecord]) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(records).context("serializing failure ledger")?;
    json.push(b'\n');
    write_atomic(path, &json)
}

/// Read a ledger written by `write_failures`; a missing file is an empty ledger.
pub fn read_failures(path: &Path) -> Result<Vec<FailureRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}
