// src/process/merge.rs
use std::collections::HashMap;

use tracing::trace;

use super::RawTable;
use crate::error::ParseError;

pub const STATE_COLUMN: &str = "state";
pub const PLACE_COLUMN: &str = "place";
pub const NAME_COLUMN: &str = "NAME";
pub const GEO_ID_COLUMN: &str = "GEO_ID";

/// All groups fetched so far for one (year, state), one row per place.
///
/// Rows are keyed by the 7-character state+place code. The first two columns
/// are always `state` and `place`; every other column is appended the first
/// time a group supplies it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTable {
    year: i32,
    state_fips: String,
    columns: Vec<String>,
    rows: Vec<Vec<Option<String>>>,
    index: HashMap<String, usize>,
}

impl StateTable {
    pub fn new(year: i32, state_fips: impl Into<String>) -> Self {
        Self {
            year,
            state_fips: state_fips.into(),
            columns: vec![STATE_COLUMN.to_string(), PLACE_COLUMN.to_string()],
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuild a table from checkpointed columns and rows.
    pub fn from_parts(
        year: i32,
        state_fips: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    ) -> Result<Self, ParseError> {
        let mut table = Self {
            year,
            state_fips: state_fips.into(),
            columns,
            rows: Vec::with_capacity(rows.len()),
            index: HashMap::new(),
        };
        let state_col = table.require(STATE_COLUMN)?;
        let place_col = table.require(PLACE_COLUMN)?;
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != table.columns.len() {
                return Err(ParseError::RowLength {
                    row: i,
                    expected: table.columns.len(),
                    found: row.len(),
                });
            }
            let key = place_key(row[state_col].as_deref(), row[place_col].as_deref())
                .ok_or_else(|| ParseError::MissingKey(PLACE_COLUMN.to_string()))?;
            table.index.insert(key, table.rows.len());
            table.rows.push(row);
        }
        Ok(table)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn state_fips(&self) -> &str {
        &self.state_fips
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<String>>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn value(&self, place_fips: &str, column: &str) -> Option<&str> {
        let row = *self.index.get(place_fips)?;
        let col = self.column_index(column)?;
        self.rows[row][col].as_deref()
    }

    /// Outer-merge one group's response into the table.
    ///
    /// Places new to the table get a fresh row with every earlier column
    /// absent. Columns already present (`NAME`, `GEO_ID`) are only filled
    /// where still empty. Returns the number of columns added.
    pub fn merge(&mut self, raw: RawTable) -> Result<usize, ParseError> {
        let state_col = raw
            .column_index(STATE_COLUMN)
            .ok_or_else(|| ParseError::MissingKey(STATE_COLUMN.to_string()))?;
        let place_col = raw
            .column_index(PLACE_COLUMN)
            .ok_or_else(|| ParseError::MissingKey(PLACE_COLUMN.to_string()))?;

        let keys = raw
            .rows
            .iter()
            .enumerate()
            .map(|(i, values)| {
                place_key(values[state_col].as_deref(), values[place_col].as_deref()).ok_or(
                    ParseError::NonScalar {
                        row: i + 1,
                        col: place_col,
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        // raw column position → table column position
        let mut targets = Vec::with_capacity(raw.headers.len());
        let mut added = 0;
        for header in &raw.headers {
            let target = match self.column_index(header) {
                Some(i) => i,
                None => {
                    self.columns.push(header.clone());
                    for row in &mut self.rows {
                        row.push(None);
                    }
                    added += 1;
                    self.columns.len() - 1
                }
            };
            targets.push(target);
        }

        let width = self.columns.len();
        for (key, values) in keys.into_iter().zip(raw.rows) {
            let row_idx = match self.index.get(&key) {
                Some(&idx) => idx,
                None => {
                    self.rows.push(vec![None; width]);
                    self.index.insert(key, self.rows.len() - 1);
                    self.rows.len() - 1
                }
            };
            let row = &mut self.rows[row_idx];
            for (value, &target) in values.into_iter().zip(&targets) {
                if row[target].is_none() {
                    row[target] = value;
                }
            }
        }

        trace!(
            state = %self.state_fips,
            added,
            rows = self.rows.len(),
            "merged group"
        );
        Ok(added)
    }

    fn require(&self, name: &str) -> Result<usize, ParseError> {
        self.column_index(name)
            .ok_or_else(|| ParseError::MissingKey(name.to_string()))
    }
}

/// State FIPS followed by place FIPS, e.g. `06` + `44000` → `0644000`.
pub fn place_key(state: Option<&str>, place: Option<&str>) -> Option<String> {
    match (state, place) {
        (Some(s), Some(p)) if !s.is_empty() && !p.is_empty() => Some(format!("{s}{p}")),
        _ => None,
    }
}
