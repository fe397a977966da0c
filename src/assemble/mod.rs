// src/assemble/mod.rs
pub mod range;
pub mod year;

use anyhow::Result;
use tracing::instrument;

use crate::config::{is_group_code, lookup_state, Config};
use crate::error::ConfigError;
use crate::fetch::{Fetcher, RequestKey, Transport};
use crate::history::Checkpoints;
use crate::process::RawTable;

pub use range::RangeOutcome;
pub use year::YearOutcome;

/// Drives fetches and checkpoints for the three CLI operations.
pub struct Collector<'a> {
    config: &'a Config,
    fetcher: Fetcher<'a>,
    checkpoints: Checkpoints,
}

impl<'a> Collector<'a> {
    /// Creates the data directory if needed.
    pub fn new(config: &'a Config, transport: &'a dyn Transport) -> Result<Self> {
        Ok(Self {
            config,
            fetcher: Fetcher::new(config, transport),
            checkpoints: Checkpoints::new(&config.data_dir)?,
        })
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    /// Fetch and parse a single triple. Nothing is written.
    #[instrument(skip(self))]
    pub async fn fetch_one(&self, year: i32, group: &str, state_fips: &str) -> Result<RawTable> {
        if !is_group_code(group) {
            return Err(ConfigError::InvalidGroup(group.to_string()).into());
        }
        if lookup_state(state_fips).is_none() {
            return Err(ConfigError::UnknownState(state_fips.to_string()).into());
        }
        self.config.check_year_range(year, year)?;
        let table = self
            .fetcher
            .fetch(&RequestKey::new(year, group, state_fips))
            .await?;
        Ok(table)
    }
}
