// src/fetch/mod.rs
pub mod describe;
pub mod retry;
pub mod urls;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::{fmt, time::Duration};
use tokio::time::sleep;
use tracing::{debug, trace, warn};
use url::Url;

use crate::config::Config;
use crate::error::{FetchError, ParseError};
use crate::process::merge::{PLACE_COLUMN, STATE_COLUMN};
use crate::process::{parse_response, RawTable};
use retry::next_retry;

/// Longest error body kept in a `FetchError::Status`.
const MAX_ERROR_BODY: usize = 200;

/// One unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestKey {
    pub year: i32,
    pub group: String,
    pub state_fips: String,
}

impl RequestKey {
    pub fn new(year: i32, group: impl Into<String>, state_fips: impl Into<String>) -> Self {
        Self {
            year,
            group: group.into(),
            state_fips: state_fips.into(),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} state:{}", self.year, self.group, self.state_fips)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// The single network seam. Production uses `HttpTransport`; tests script
/// responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError>;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("acspanel/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        // `without_url` keeps the API key out of error messages and logs
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.without_url().to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

/// Rate-limited, retrying access to the Census API.
pub struct Fetcher<'a> {
    config: &'a Config,
    transport: &'a dyn Transport,
}

impl<'a> Fetcher<'a> {
    pub fn new(config: &'a Config, transport: &'a dyn Transport) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        self.config
    }

    /// Every place of one state for every variable of one group.
    pub async fn fetch(&self, key: &RequestKey) -> Result<RawTable, FetchError> {
        let url = urls::data_url(self.config, key.year, &key.group, &key.state_fips)
            .map_err(|e| FetchError::Transport(format!("building request URL: {}", e)))?;
        let table = self.request(&url, parse_place_table).await?;
        debug!(
            year = key.year,
            group = %key.group,
            state = %key.state_fips,
            rows = table.num_rows(),
            cols = table.num_columns(),
            "fetched"
        );
        Ok(table)
    }

    /// Any other JSON document under the same retry and rate limit rules.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, FetchError> {
        self.request(url, |body| {
            serde_json::from_str(body).map_err(ParseError::from)
        })
        .await
    }

    async fn request<T, F>(&self, url: &Url, decode: F) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let policy = &self.config.retry;
        let mut attempt = 0u32;
        let mut delay = None;
        loop {
            attempt += 1;
            let result = self.attempt(url, &decode).await;
            if !self.config.rate_limit_delay.is_zero() {
                sleep(self.config.rate_limit_delay).await;
            }

            let err = match result {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };
            let decision = next_retry(policy, attempt, delay);
            if !decision.retry {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            warn!(
                path = url.path(),
                attempt,
                delay_ms = decision.next_delay.as_millis() as u64,
                error = %err,
                "Retrying"
            );
            sleep(decision.next_delay).await;
            delay = Some(decision.next_delay);
        }
    }

    async fn attempt<T, F>(&self, url: &Url, decode: &F) -> Result<T, FetchError>
    where
        F: Fn(&str) -> Result<T, ParseError>,
    {
        let resp = self.transport.get(url).await?;
        trace!(status = resp.status, bytes = resp.body.len(), "response");
        match resp.status {
            204 => Err(FetchError::NoContent),
            404 => Err(FetchError::Unavailable),
            200..=299 => Ok(decode(&resp.body)?),
            status => Err(FetchError::Status {
                status,
                body: truncate(resp.body.trim(), MAX_ERROR_BODY),
            }),
        }
    }
}

/// A data response must carry the geography columns rows are keyed on.
fn parse_place_table(body: &str) -> Result<RawTable, ParseError> {
    let table = parse_response(body)?;
    for key in [STATE_COLUMN, PLACE_COLUMN] {
        if table.column_index(key).is_none() {
            return Err(ParseError::MissingKey(key.to_string()));
        }
    }
    Ok(table)
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
