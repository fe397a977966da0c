// src/config.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::debug;

use crate::error::ConfigError;

pub const API_KEY_ENV: &str = "CENSUS_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.census.gov/data";
pub const DEFAULT_DATA_DIR: &str = "data/acs_raw";

/// 50 states, DC and Puerto Rico.
static STATE_FIPS: &[(&str, &str)] = &[
    ("01", "Alabama"),
    ("02", "Alaska"),
    ("04", "Arizona"),
    ("05", "Arkansas"),
    ("06", "California"),
    ("08", "Colorado"),
    ("09", "Connecticut"),
    ("10", "Delaware"),
    ("11", "District of Columbia"),
    ("12", "Florida"),
    ("13", "Georgia"),
    ("15", "Hawaii"),
    ("16", "Idaho"),
    ("17", "Illinois"),
    ("18", "Indiana"),
    ("19", "Iowa"),
    ("20", "Kansas"),
    ("21", "Kentucky"),
    ("22", "Louisiana"),
    ("23", "Maine"),
    ("24", "Maryland"),
    ("25", "Massachusetts"),
    ("26", "Michigan"),
    ("27", "Minnesota"),
    ("28", "Mississippi"),
    ("29", "Missouri"),
    ("30", "Montana"),
    ("31", "Nebraska"),
    ("32", "Nevada"),
    ("33", "New Hampshire"),
    ("34", "New Jersey"),
    ("35", "New Mexico"),
    ("36", "New York"),
    ("37", "North Carolina"),
    ("38", "North Dakota"),
    ("39", "Ohio"),
    ("40", "Oklahoma"),
    ("41", "Oregon"),
    ("42", "Pennsylvania"),
    ("44", "Rhode Island"),
    ("45", "South Carolina"),
    ("46", "South Dakota"),
    ("47", "Tennessee"),
    ("48", "Texas"),
    ("49", "Utah"),
    ("50", "Vermont"),
    ("51", "Virginia"),
    ("53", "Washington"),
    ("54", "West Virginia"),
    ("55", "Wisconsin"),
    ("56", "Wyoming"),
    ("72", "Puerto Rico"),
];

static DEFAULT_GROUPS: &[&str] = &[
    "B01001", "B01003", "B02003", "B00001", "B08101", "B07409", "B08303", "B14007", "B15012",
    "B17026", "B19081", "B19083", "B23020", "B25070", "B25104",
];

/// Census "jam values": suppressed, not applicable, or too few sample cases.
static DEFAULT_MISSING_MARKERS: &[i64] = &[-666666666, -999999999, -888888888];

static GROUP_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]\d{5}[A-Z]?$").expect("group code pattern should compile"));

/// The first year the ACS 1-year product was published.
pub const FIRST_ACS1_YEAR: i32 = 2005;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateInfo {
    pub fips: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per request, the first one included.
    pub max_attempts: u32,
    /// Wait before the second attempt; doubled for each one after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Everything a run needs, built once at startup and passed down by reference.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    pub states: Vec<StateInfo>,
    pub groups: Vec<String>,
    pub data_dir: PathBuf,
    pub rate_limit_delay: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub missing_markers: Vec<i64>,
    /// Fetch group and variable labels for the data dictionary.
    pub describe_variables: bool,
}

/// Optional YAML overrides. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    base_url: Option<String>,
    data_dir: Option<PathBuf>,
    groups: Option<Vec<String>>,
    states: Option<Vec<String>>,
    rate_limit_ms: Option<u64>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
    describe_variables: Option<bool>,
}

impl Config {
    /// Defaults for every setting except the credential.
    pub fn new(api_key: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            states: all_states(),
            groups: DEFAULT_GROUPS.iter().map(|g| g.to_string()).collect(),
            data_dir: data_dir.into(),
            rate_limit_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            missing_markers: DEFAULT_MISSING_MARKERS.to_vec(),
            describe_variables: true,
        }
    }

    /// Build the run configuration from `.env`/the environment, an optional
    /// YAML file and an optional data directory override (which wins over the
    /// file's `data_dir`).
    pub fn load(data_dir: Option<PathBuf>, file: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::resolve(std::env::var(API_KEY_ENV).ok(), data_dir, file)
    }

    fn resolve(
        api_key: Option<String>,
        data_dir: Option<PathBuf>,
        file: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingApiKey(API_KEY_ENV))?;

        let mut config = Config::new(api_key, DEFAULT_DATA_DIR);
        if let Some(path) = file {
            let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let overrides: ConfigFile =
                serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                    path: path.to_path_buf(),
                    source,
                })?;
            config.apply(overrides)?;
            debug!(path = %path.display(), "applied config file");
        }
        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, file: ConfigFile) -> Result<(), ConfigError> {
        if let Some(base_url) = file.base_url {
            self.base_url = base_url;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        if let Some(groups) = file.groups {
            self.groups = groups;
        }
        if let Some(codes) = file.states {
            self.states = select_states(&codes)?;
        }
        if let Some(ms) = file.rate_limit_ms {
            self.rate_limit_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = file.timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.max_attempts {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = file.backoff_ms {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(describe) = file.describe_variables {
            self.describe_variables = describe;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups.is_empty() {
            return Err(ConfigError::Invalid("no groups configured".into()));
        }
        if let Some(bad) = self.groups.iter().find(|g| !is_group_code(g)) {
            return Err(ConfigError::InvalidGroup(bad.clone()));
        }
        if self.states.is_empty() {
            return Err(ConfigError::Invalid("no states configured".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        url::Url::parse(&self.base_url)
            .map_err(|e| ConfigError::Invalid(format!("base_url `{}`: {}", self.base_url, e)))?;
        Ok(())
    }

    pub fn check_year_range(&self, start: i32, end: i32) -> Result<(), ConfigError> {
        if start > end || start < FIRST_ACS1_YEAR {
            return Err(ConfigError::YearRange { start, end });
        }
        Ok(())
    }

    pub fn is_missing(&self, value: f64) -> bool {
        self.missing_markers.iter().any(|m| *m as f64 == value)
    }
}

/// `B01001`, `C24010A`, …
pub fn is_group_code(code: &str) -> bool {
    GROUP_CODE.is_match(code)
}

/// Look a state up in the full FIPS table, not just the configured subset.
pub fn lookup_state(fips: &str) -> Option<StateInfo> {
    all_states().into_iter().find(|s| s.fips == fips)
}

pub fn all_states() -> Vec<StateInfo> {
    STATE_FIPS
        .iter()
        .map(|(fips, name)| StateInfo {
            fips: fips.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Restrict the state list to `codes`, keeping the canonical order.
pub fn select_states(codes: &[String]) -> Result<Vec<StateInfo>, ConfigError> {
    if let Some(bad) = codes
        .iter()
        .find(|c| !STATE_FIPS.iter().any(|(fips, _)| fips == c))
    {
        return Err(ConfigError::UnknownState(bad.clone()));
    }
    Ok(all_states()
        .into_iter()
        .filter(|s| codes.contains(&s.fips))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_cover_all_states() {
        let cfg = Config::new("k", "out");
        assert_eq!(cfg.states.len(), 52);
        assert_eq!(cfg.groups.len(), 15);
        assert!(cfg.states.iter().any(|s| s.fips == "72" && s.name == "Puerto Rico"));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.rate_limit_delay, Duration::from_millis(500));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn yaml_overrides_apply() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "groups: [B01003, C24010A]\nstates: ['36', '06']\nrate_limit_ms: 0\nmax_attempts: 5"
        )
        .unwrap();
        let text = fs::read_to_string(file.path()).unwrap();
        let overrides: ConfigFile = serde_yaml::from_str(&text).unwrap();

        let mut cfg = Config::new("k", "out");
        cfg.apply(overrides).unwrap();
        cfg.validate().unwrap();

        assert_eq!(cfg.groups, vec!["B01003", "C24010A"]);
        // canonical order, not file order
        let fips: Vec<_> = cfg.states.iter().map(|s| s.fips.as_str()).collect();
        assert_eq!(fips, vec!["06", "36"]);
        assert!(cfg.rate_limit_delay.is_zero());
        assert_eq!(cfg.retry.max_attempts, 5);
    }

    #[test]
    fn missing_api_key_is_fatal() {
        std::env::remove_var(API_KEY_ENV);
        assert!(matches!(
            Config::load(None, None),
            Err(ConfigError::MissingApiKey(API_KEY_ENV))
        ));
        assert!(matches!(
            Config::resolve(Some("  \n".into()), None, None),
            Err(ConfigError::MissingApiKey(_))
        ));
    }

    #[test]
    fn data_dir_argument_wins_over_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "data_dir: from_file\ngroups: [B01003]").unwrap();

        let cfg = Config::resolve(Some(" key ".into()), None, Some(file.path())).unwrap();
        assert_eq!(cfg.api_key, "key");
        assert_eq!(cfg.data_dir, PathBuf::from("from_file"));

        let cfg = Config::resolve(
            Some("key".into()),
            Some(PathBuf::from("from_cli")),
            Some(file.path()),
        )
        .unwrap();
        assert_eq!(cfg.data_dir, PathBuf::from("from_cli"));
        assert_eq!(cfg.groups, vec!["B01003"]);
    }

    #[test]
    fn rejects_unknown_state_and_bad_group() {
        assert!(matches!(
            select_states(&["03".to_string()]),
            Err(ConfigError::UnknownState(code)) if code == "03"
        ));

        let mut cfg = Config::new("k", "out");
        cfg.groups = vec!["group(B01001)".into()];
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidGroup(_))));
    }

    #[test]
    fn year_range_must_be_ordered() {
        let cfg = Config::new("k", "out");
        assert!(cfg.check_year_range(2009, 2024).is_ok());
        assert!(cfg.check_year_range(2011, 2011).is_ok());
        assert!(cfg.check_year_range(2012, 2010).is_err());
        assert!(cfg.check_year_range(1999, 2010).is_err());
    }

    #[test]
    fn missing_markers_match_numerically() {
        let cfg = Config::new("k", "out");
        assert!(cfg.is_missing(-666666666.0));
        assert!(cfg.is_missing(-888888888.0));
        assert!(!cfg.is_missing(0.0));
        assert!(!cfg.is_missing(-666666.0));
    }
}
