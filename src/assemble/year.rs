// src/assemble/year.rs
use anyhow::Result;
use arrow::record_batch::RecordBatch;
use std::collections::BTreeMap;
use tracing::{debug, error, info, instrument, warn};

use super::Collector;
use crate::config::StateInfo;
use crate::error::{CollectError, FetchError};
use crate::fetch::{describe, RequestKey};
use crate::history::failures::{write_failures, StateLedger};
use crate::history::YearReport;
use crate::process::{clean_year, StateTable};
use crate::schema::arrow::group_of;
use crate::schema::dictionary::describe as describe_variable;
use crate::schema::{VariableDictionary, ID_COLUMNS};

/// Everything `collect_year` produced.
#[derive(Debug)]
pub struct YearOutcome {
    pub batch: RecordBatch,
    pub report: YearReport,
    pub dictionary: VariableDictionary,
}

impl<'a> Collector<'a> {
    /// Collect every configured (state, group) triple of `year` into the
    /// cleaned year table and write `acs_{year}.parquet`.
    ///
    /// States with a usable checkpoint are loaded instead of fetched, along
    /// with the request outcomes saved beside them. Failed triples are logged,
    /// recorded in `failures_{year}.json` and leave their columns absent. Errors only when nothing at all could be collected or
    /// local I/O fails.
    #[instrument(skip(self), fields(states = self.config.states.len(), groups = self.config.groups.len()))]
    pub async fn collect_year(&self, year: i32) -> Result<YearOutcome> {
        self.config.check_year_range(year, year)?;
        let cp = &self.checkpoints;
        let done = cp.completed_states(year)?;
        if !done.is_empty() {
            info!(checkpointed = done.len(), "found state checkpoints");
        }

        let mut report = YearReport::new(year);
        let mut tables = Vec::with_capacity(self.config.states.len());
        let total = self.config.states.len();

        for (i, state) in self.config.states.iter().enumerate() {
            let resumed = if done.contains(&state.fips) {
                cp.load_state(year, &state.fips)
            } else {
                None
            };
            if let Some(table) = resumed {
                let ledger = cp.load_state_ledger(year, &state.fips);
                info!(
                    state = %state.fips,
                    name = %state.name,
                    places = table.num_rows(),
                    failed = ledger.failures.len(),
                    "resuming from checkpoint"
                );
                report.absorb(ledger);
                report.resumed_states.push(state.fips.clone());
                tables.push(table);
                continue;
            }

            let (table, ledger) = self.collect_state(year, state).await;
            if table.is_empty() {
                warn!(state = %state.fips, name = %state.name, "no data for any group; not checkpointed");
                report.absorb(ledger);
                report.empty_states.push(state.fips.clone());
                continue;
            }
            cp.save_state(&table, &ledger)?;
            info!(
                state = %state.fips,
                name = %state.name,
                places = table.num_rows(),
                columns = table.columns().len(),
                progress = %format!("{}/{}", i + 1, total),
                "state complete"
            );
            report.absorb(ledger);
            report.fetched_states.push(state.fips.clone());
            tables.push(table);
        }

        write_failures(&cp.failures_path(year), &report.failures)?;
        if tables.is_empty() {
            return Err(CollectError::NoData {
                year,
                failed: report.failed(),
            }
            .into());
        }

        let batch = clean_year(year, &tables, self.config)?;
        let dictionary = self.describe_year(year, &batch).await;
        cp.save_year(year, &batch)?;
        dictionary.write(&cp.year_dictionary_path(year))?;

        report.places = batch.num_rows();
        report.variables = batch.num_columns() - ID_COLUMNS.len();
        info!(
            places = report.places,
            variables = report.variables,
            states = tables.len(),
            resumed = report.resumed_states.len(),
            succeeded = report.succeeded,
            failed = report.failed(),
            "year complete"
        );
        Ok(YearOutcome {
            batch,
            report,
            dictionary,
        })
    }

    /// Fetch every group for one state and merge them. Failures are recorded
    /// in the returned ledger and skipped.
    async fn collect_state(&self, year: i32, state: &StateInfo) -> (StateTable, StateLedger) {
        let mut table = StateTable::new(year, &state.fips);
        let mut ledger = StateLedger::default();
        for group in &self.config.groups {
            let key = RequestKey::new(year, group, &state.fips);
            let result = match self.fetcher.fetch(&key).await {
                Ok(raw) => table.merge(raw).map_err(FetchError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(added) => {
                    ledger.record_success();
                    debug!(state = %state.fips, group = %group, added, "merged");
                }
                Err(FetchError::Unavailable) => {
                    warn!(state = %state.fips, group = %group, "group not published this year");
                    ledger.record_failure(&key, &FetchError::Unavailable);
                }
                Err(e) => {
                    error!(state = %state.fips, group = %group, error = %e, "request failed");
                    ledger.record_failure(&key, &e);
                }
            }
        }
        (table, ledger)
    }

    /// Dictionary entries for every variable column of `batch`. Label lookups
    /// that fail fall back to the variable code.
    async fn describe_year(&self, year: i32, batch: &RecordBatch) -> VariableDictionary {
        let schema = batch.schema();
        let variables: Vec<&str> = schema
            .fields()
            .iter()
            .skip(ID_COLUMNS.len())
            .map(|f| f.name().as_str())
            .collect();

        let mut descriptions = BTreeMap::new();
        let mut labels = BTreeMap::new();
        if self.config.describe_variables && !variables.is_empty() {
            descriptions = describe::group_descriptions(&self.fetcher, year).await;
            let mut groups: Vec<&str> = variables.iter().map(|v| group_of(v)).collect();
            groups.sort_unstable();
            groups.dedup();
            for group in groups {
                labels.extend(describe::variable_labels(&self.fetcher, year, group).await);
            }
        }

        let mut dictionary = VariableDictionary::new();
        for var in variables {
            let group = group_of(var);
            dictionary.insert(
                var,
                describe_variable(
                    var,
                    group,
                    descriptions.get(group).map(String::as_str),
                    labels.get(var).map(String::as_str),
                ),
            );
        }
        dictionary
    }
}
