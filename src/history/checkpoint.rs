// src/history/checkpoint.rs

use anyhow::{anyhow, bail, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Int32Array, StringArray},
    csv::WriterBuilder,
    datatypes::DataType,
    record_batch::RecordBatch,
};
use glob::{glob, Pattern};
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, warn};

use super::failures::StateLedger;
use super::{read_parquet, tmp_path, write_parquet};
use crate::process::merge::{PLACE_COLUMN, STATE_COLUMN};
use crate::process::StateTable;
use crate::schema::arrow::YEAR;
use crate::schema::{checkpoint_schema, ID_COLUMNS};

/// Locations of every persisted artefact under the data directory, plus the
/// resume checks for each unit of work.
///
/// ```text
/// <root>/checkpoints/<year>/state_<fips>.parquet   merged, uncleaned
/// <root>/checkpoints/<year>/failures_<fips>.json    that state's request outcomes
/// <root>/acs_<year>.parquet (+ .csv)               cleaned year slice
/// <root>/acs_<year>_dictionary.json
/// <root>/failures_<year>.json
/// <root>/acs_panel_partial.parquet                 range in progress
/// <root>/acs_panel_<start>_<end>.parquet (+ _dictionary.json)
/// ```
#[derive(Debug, Clone)]
pub struct Checkpoints {
    root: PathBuf,
}

impl Checkpoints {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("creating data directory {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn state_dir(&self, year: i32) -> PathBuf {
        self.root.join("checkpoints").join(year.to_string())
    }

    pub fn state_path(&self, year: i32, state_fips: &str) -> PathBuf {
        self.state_dir(year)
            .join(format!("state_{}.parquet", state_fips))
    }

    pub fn state_ledger_path(&self, year: i32, state_fips: &str) -> PathBuf {
        self.state_dir(year)
            .join(format!("failures_{}.json", state_fips))
    }

    pub fn year_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("acs_{}.parquet", year))
    }

    pub fn year_csv_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("acs_{}.csv", year))
    }

    pub fn year_dictionary_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("acs_{}_dictionary.json", year))
    }

    pub fn failures_path(&self, year: i32) -> PathBuf {
        self.root.join(format!("failures_{}.json", year))
    }

    pub fn partial_panel_path(&self) -> PathBuf {
        self.root.join("acs_panel_partial.parquet")
    }

    pub fn panel_path(&self, start: i32, end: i32) -> PathBuf {
        self.root.join(format!("acs_panel_{}_{}.parquet", start, end))
    }

    pub fn panel_dictionary_path(&self, start: i32, end: i32) -> PathBuf {
        self.root
            .join(format!("acs_panel_{}_{}_dictionary.json", start, end))
    }

    /// State codes with a per-state checkpoint file for `year`, well-formed or not.
    pub fn completed_states(&self, year: i32) -> Result<BTreeSet<String>> {
        let dir = Pattern::escape(&self.state_dir(year).display().to_string());
        let pattern = format!("{}/state_*.parquet", dir);
        let mut set = BTreeSet::new();
        for entry in glob(&pattern)? {
            let path = match entry {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "cannot read checkpoint entry");
                    continue;
                }
            };
            if let Some(fips) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix("state_"))
            {
                set.insert(fips.to_string());
            }
        }
        Ok(set)
    }

    /// Persist the merged table of one (year, state) with its request
    /// outcomes. The ledger lands first; the Parquet file marks the state done.
    pub fn save_state(&self, table: &StateTable, ledger: &StateLedger) -> Result<PathBuf> {
        ledger.write(&self.state_ledger_path(table.year(), table.state_fips()))?;
        let path = self.state_path(table.year(), table.state_fips());
        let batch = state_to_batch(table)?;
        write_parquet(&path, &batch)?;
        debug!(
            path = %path.display(),
            rows = table.num_rows(),
            failed = ledger.failures.len(),
            "wrote state checkpoint"
        );
        Ok(path)
    }

    /// Request outcomes saved with the (year, state) checkpoint. A missing or
    /// unreadable ledger is logged and counts as empty.
    pub fn load_state_ledger(&self, year: i32, state_fips: &str) -> StateLedger {
        let path = self.state_ledger_path(year, state_fips);
        match StateLedger::load(&path) {
            Ok(Some(ledger)) => ledger,
            Ok(None) => {
                warn!(path = %path.display(), "state checkpoint has no ledger");
                StateLedger::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable state ledger");
                StateLedger::default()
            }
        }
    }

    /// The checkpointed table for (year, state), or `None` when there is no
    /// checkpoint or it is not usable. Unusable files are logged and left for
    /// the next save to overwrite.
    pub fn load_state(&self, year: i32, state_fips: &str) -> Option<StateTable> {
        let path = self.state_path(year, state_fips);
        if !path.is_file() {
            return None;
        }
        match read_parquet(&path).and_then(|batch| batch_to_state(year, state_fips, &batch)) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed state checkpoint");
                None
            }
        }
    }

    /// Write the cleaned year slice as Parquet and CSV.
    pub fn save_year(&self, year: i32, batch: &RecordBatch) -> Result<()> {
        write_parquet(&self.year_path(year), batch)?;
        write_csv(&self.year_csv_path(year), batch)
    }

    /// The cleaned slice for `year` if present and stamped with that year.
    pub fn load_year(&self, year: i32) -> Option<RecordBatch> {
        let path = self.year_path(year);
        if !path.is_file() {
            return None;
        }
        match read_parquet(&path).and_then(|batch| check_year_batch(year, batch)) {
            Ok(batch) => Some(batch),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring malformed year checkpoint");
                None
            }
        }
    }

    pub fn save_partial_panel(&self, batch: &RecordBatch) -> Result<()> {
        write_parquet(&self.partial_panel_path(), batch)
    }
}

fn state_to_batch(table: &StateTable) -> Result<RecordBatch> {
    let schema = checkpoint_schema(table.columns());
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.columns().len() + 1);
    for c in 0..table.columns().len() {
        let values: StringArray = table.rows().iter().map(|row| row[c].as_deref()).collect();
        columns.push(Arc::new(values));
    }
    columns.push(Arc::new(Int32Array::from(vec![
        table.year();
        table.num_rows()
    ])));
    RecordBatch::try_new(schema, columns).context("building state checkpoint batch")
}

fn batch_to_state(year: i32, state_fips: &str, batch: &RecordBatch) -> Result<StateTable> {
    let schema = batch.schema();
    let mut names = Vec::with_capacity(schema.fields().len());
    let mut text_columns = Vec::with_capacity(schema.fields().len());
    let mut year_column = None;
    for (i, field) in schema.fields().iter().enumerate() {
        if field.name() == YEAR {
            year_column = batch.column(i).as_any().downcast_ref::<Int32Array>();
            continue;
        }
        let values = batch
            .column(i)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| anyhow!("column {} is not text", field.name()))?;
        names.push(field.name().clone());
        text_columns.push(values);
    }

    let years = year_column.context("checkpoint has no Int32 year column")?;
    check_years(year, years)?;
    for key in [STATE_COLUMN, PLACE_COLUMN] {
        if !names.iter().any(|n| n == key) {
            bail!("checkpoint has no `{}` column", key);
        }
    }

    let rows = (0..batch.num_rows())
        .map(|r| {
            text_columns
                .iter()
                .map(|col| col.is_valid(r).then(|| col.value(r).to_string()))
                .collect()
        })
        .collect();
    StateTable::from_parts(year, state_fips, names, rows).map_err(Into::into)
}

fn check_year_batch(year: i32, batch: RecordBatch) -> Result<RecordBatch> {
    if batch.num_columns() < ID_COLUMNS.len() {
        bail!("only {} columns", batch.num_columns());
    }
    for (i, name) in ID_COLUMNS.iter().enumerate() {
        let field = batch.schema().field(i).clone();
        if field.name() != name {
            bail!("column {} is `{}`, expected `{}`", i, field.name(), name);
        }
    }
    if let Some(field) = batch
        .schema()
        .fields()
        .iter()
        .skip(ID_COLUMNS.len())
        .find(|f| f.data_type() != &DataType::Float64)
    {
        bail!("variable column {} is not Float64", field.name());
    }
    let years = batch
        .column(3)
        .as_any()
        .downcast_ref::<Int32Array>()
        .context("year column is not Int32")?;
    check_years(year, years)?;
    Ok(batch)
}

fn check_years(year: i32, years: &Int32Array) -> Result<()> {
    if years.null_count() > 0 || years.values().iter().any(|y| *y != year) {
        bail!("checkpoint holds rows for a year other than {}", year);
    }
    Ok(())
}

fn write_csv(path: &Path, batch: &RecordBatch) -> Result<()> {
    let tmp = tmp_path(path);
    let file = File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
    let mut writer = WriterBuilder::new()
        .with_header(true)
        .build(BufWriter::new(file));
    writer
        .write(batch)
        .with_context(|| format!("writing CSV {}", tmp.display()))?;
    writer
        .into_inner()
        .flush()
        .with_context(|| format!("flushing {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("renaming {} -> {}", tmp.display(), path.display()))
}
