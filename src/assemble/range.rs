// src/assemble/range.rs
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use tracing::{error, info, instrument, warn};

use super::Collector;
use crate::error::CollectError;
use crate::history::write_parquet;
use crate::process::{concat_union, ensure_unique_keys};
use crate::schema::{VariableDictionary, ID_COLUMNS};

#[derive(Debug)]
pub struct RangeOutcome {
    pub panel: RecordBatch,
    pub dictionary: VariableDictionary,
    pub path: PathBuf,
    /// Years collected by this run.
    pub completed: Vec<i32>,
    /// Years whose `acs_{year}.parquet` already existed.
    pub reused: Vec<i32>,
    /// Years that produced no data, with the reason.
    pub failed: Vec<(i32, String)>,
    /// Panel variables absent from some years, with those years.
    pub missing: BTreeMap<String, Vec<i32>>,
    pub succeeded_requests: usize,
    pub failed_requests: usize,
}

impl<'a> Collector<'a> {
    /// Collect `start..=end` and stack the years into one long panel.
    ///
    /// Years with a finished `acs_{year}.parquet` are reused. A year without
    /// any data is recorded and skipped. `acs_panel_partial.parquet` is
    /// rewritten after every year; the final panel goes to
    /// `acs_panel_{start}_{end}.parquet`.
    #[instrument(skip(self))]
    pub async fn collect_range(&self, start: i32, end: i32) -> Result<RangeOutcome> {
        self.config.check_year_range(start, end)?;
        let cp = &self.checkpoints;

        let mut slices = Vec::new();
        let mut slice_years = Vec::new();
        let mut dictionary = VariableDictionary::new();
        let mut completed = Vec::new();
        let mut reused = Vec::new();
        let mut failed = Vec::new();
        let mut succeeded_requests = 0;
        let mut failed_requests = 0;

        for year in start..=end {
            if let Some(batch) = cp.load_year(year) {
                info!(year, places = batch.num_rows(), "year already collected; reusing");
                dictionary.merge(&self.saved_dictionary(year, &batch));
                slices.push(batch);
                slice_years.push(year);
                reused.push(year);
            } else {
                match self.collect_year(year).await {
                    Ok(outcome) => {
                        succeeded_requests += outcome.report.succeeded;
                        failed_requests += outcome.report.failed();
                        dictionary.merge(&outcome.dictionary);
                        slices.push(outcome.batch);
                        slice_years.push(year);
                        completed.push(year);
                    }
                    Err(e) => match e.downcast_ref::<CollectError>() {
                        Some(CollectError::NoData { failed: n, .. }) => {
                            error!(year, error = %e, "year failed; skipping");
                            failed_requests += n;
                            failed.push((year, e.to_string()));
                            continue;
                        }
                        _ => return Err(e),
                    },
                }
            }

            let partial = concat_union(&slices, &self.config.groups)?;
            cp.save_partial_panel(&partial)?;
            info!(year, rows = partial.num_rows(), "partial panel saved");
        }

        if slices.is_empty() {
            return Err(CollectError::EmptyRange { start, end }.into());
        }
        let panel = concat_union(&slices, &self.config.groups)?;
        ensure_unique_keys(&panel)?;
        let missing = missing_years(&panel, &slice_years, &slices);
        for (variable, years) in &missing {
            warn!(variable = %variable, years = ?years, "variable absent from some years");
        }

        let path = cp.panel_path(start, end);
        write_parquet(&path, &panel)?;
        dictionary.write(&cp.panel_dictionary_path(start, end))?;
        info!(
            path = %path.display(),
            rows = panel.num_rows(),
            columns = panel.num_columns(),
            years = slices.len(),
            failed_years = failed.len(),
            partial_variables = missing.len(),
            "panel written"
        );

        Ok(RangeOutcome {
            panel,
            dictionary,
            path,
            completed,
            reused,
            failed,
            missing,
            succeeded_requests,
            failed_requests,
        })
    }

    /// The dictionary written next to a finished year, topped up with bare
    /// codes for any variable it does not cover.
    fn saved_dictionary(&self, year: i32, batch: &RecordBatch) -> VariableDictionary {
        let path = self.checkpoints.year_dictionary_path(year);
        let mut dictionary = if path.is_file() {
            VariableDictionary::load(&path).unwrap_or_else(|e| {
                warn!(year, error = %e, "ignoring unreadable dictionary");
                VariableDictionary::new()
            })
        } else {
            VariableDictionary::new()
        };
        for field in batch.schema().fields().iter().skip(ID_COLUMNS.len()) {
            dictionary.insert(field.name().clone(), field.name().clone());
        }
        dictionary
    }
}

/// For every variable column of `panel`, the years whose slice lacks it.
/// Variables present in every year are left out.
fn missing_years(
    panel: &RecordBatch,
    years: &[i32],
    slices: &[RecordBatch],
) -> BTreeMap<String, Vec<i32>> {
    let present: Vec<HashSet<String>> = slices
        .iter()
        .map(|b| b.schema().fields().iter().map(|f| f.name().clone()).collect())
        .collect();
    let mut missing = BTreeMap::new();
    for field in panel.schema().fields().iter().skip(ID_COLUMNS.len()) {
        let absent: Vec<i32> = years
            .iter()
            .zip(&present)
            .filter(|(_, names)| !names.contains(field.name()))
            .map(|(year, _)| *year)
            .collect();
        if !absent.is_empty() {
            missing.insert(field.name().clone(), absent);
        }
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::panel_schema;
    use arrow::array::new_empty_array;

    fn empty(variables: &[&str]) -> RecordBatch {
        let names: Vec<String> = variables.iter().map(|v| v.to_string()).collect();
        let schema = panel_schema(&names);
        let columns = schema
            .fields()
            .iter()
            .map(|f| new_empty_array(f.data_type()))
            .collect();
        RecordBatch::try_new(schema, columns).unwrap()
    }

    #[test]
    fn lists_years_lacking_each_variable() {
        let slices = vec![
            empty(&["B01003_001E"]),
            empty(&["B01003_001E", "B19083_001E"]),
            empty(&["B01003_001E"]),
        ];
        let panel = empty(&["B01003_001E", "B19083_001E"]);
        let missing = missing_years(&panel, &[2009, 2010, 2011], &slices);
        assert_eq!(
            missing,
            BTreeMap::from([("B19083_001E".to_string(), vec![2009, 2011])])
        );
    }
}
