use std::path::PathBuf;

use thiserror::Error;

/// Why a Census response body could not be turned into a table.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("response body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("response is not an array of rows")]
    NotAnArray,

    #[error("response has no header row")]
    Empty,

    #[error("row {row} is not an array")]
    NotARow { row: usize },

    #[error("row {row}, column {col} is not a scalar value")]
    NonScalar { row: usize, col: usize },

    #[error("row {row} has {found} values but the header has {expected}")]
    RowLength {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("response is missing key column `{0}`")]
    MissingKey(String),
}

/// Failure of a single request triple.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("group not available for this year (HTTP 404)")]
    Unavailable,

    #[error("no rows for this query (HTTP 204)")]
    NoContent,

    #[error("malformed response: {0}")]
    Malformed(#[from] ParseError),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Timeouts, connection errors, non-404 error statuses and bodies that are
    /// not JSON at all are worth another attempt. Everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(_) | FetchError::Status { .. } => true,
            FetchError::Malformed(ParseError::Json(_)) => true,
            _ => false,
        }
    }

    /// Short label used in the failure ledger.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Status { .. } => "status",
            FetchError::Unavailable => "unavailable",
            FetchError::NoContent => "no_content",
            FetchError::Malformed(_) => "malformed",
            FetchError::Exhausted { .. } => "exhausted",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set; export it or add it to .env")]
    MissingApiKey(&'static str),

    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("unknown state FIPS code `{0}`")]
    UnknownState(String),

    #[error("invalid group code `{0}`")]
    InvalidGroup(String),

    #[error("invalid year range {start}..={end}")]
    YearRange { start: i32, end: i32 },

    #[error("{0}")]
    Invalid(String),
}

/// Year and range level outcomes the range assembler reacts to.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("no data collected for {year}: all {failed} requests failed")]
    NoData { year: i32, failed: usize },

    #[error("no year in {start}..={end} produced data")]
    EmptyRange { start: i32, end: i32 },
}
