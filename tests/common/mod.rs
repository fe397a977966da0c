#![allow(dead_code)]

use acspanel::config::{select_states, Config};
use acspanel::error::FetchError;
use acspanel::fetch::{urls::request_parts, HttpResponse, Transport};
use arrow::array::{Float64Array, StringArray};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use url::Url;

pub const STATES: [&str; 3] = ["06", "36", "48"];
pub const GROUPS: [&str; 2] = ["B01003", "B19083"];

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,acspanel=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

/// Zero delays, no label lookups, three states and two groups.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::new("test-key", dir);
    cfg.rate_limit_delay = Duration::ZERO;
    cfg.retry.base_delay = Duration::ZERO;
    cfg.describe_variables = false;
    cfg.groups = GROUPS.iter().map(|g| g.to_string()).collect();
    cfg.states = select_states(&STATES.iter().map(|s| s.to_string()).collect::<Vec<_>>())
        .expect("test states are known");
    cfg
}

/// Scripted stand-in for the Census API.
///
/// Every state has two places. Values depend only on (year, group, state,
/// place) so repeated runs see identical data. The first place's margin of
/// error is the `-666666666` marker.
#[derive(Default)]
pub struct FakeCensus {
    calls: Mutex<Vec<(i32, String, String)>>,
    describe_calls: Mutex<usize>,
    /// (year, group, state) answered with HTTP 500.
    failing: HashSet<(i32, String, String)>,
    /// (year, group) answered with HTTP 404.
    unpublished: HashSet<(i32, String)>,
    /// Years where every request is HTTP 500.
    dead_years: HashSet<i32>,
}

impl FakeCensus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, year: i32, group: &str, state: &str) -> Self {
        self.failing
            .insert((year, group.to_string(), state.to_string()));
        self
    }

    pub fn unpublished(mut self, year: i32, group: &str) -> Self {
        self.unpublished.insert((year, group.to_string()));
        self
    }

    pub fn dead_year(mut self, year: i32) -> Self {
        self.dead_years.insert(year);
        self
    }

    /// Data requests seen so far, as (year, group, state).
    pub fn calls(&self) -> Vec<(i32, String, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn describe_calls(&self) -> usize {
        *self.describe_calls.lock().unwrap()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
        *self.describe_calls.lock().unwrap() = 0;
    }

    fn data(year: i32, group: &str, state: &str) -> String {
        let header = format!(
            r#"["GEO_ID","NAME","{g}_001E","{g}_001M","state","place"]"#,
            g = group
        );
        let mut rows = vec![header];
        for i in 0..2 {
            let place = format!("{:05}", 10000 + i * 1111);
            let estimate = (year - 2000) * 1000 + i as i32 * 10 + group.len() as i32;
            let moe = if i == 0 { "-666666666".to_string() } else { "12".to_string() };
            rows.push(format!(
                r#"["1600000US{s}{p}","Place {p}, State {s}","{e}","{m}","{s}","{p}"]"#,
                s = state,
                p = place,
                e = estimate,
                m = moe
            ));
        }
        format!("[{}]", rows.join(","))
    }

    fn describe(url: &Url) -> HttpResponse {
        let path = url.path();
        if path.ends_with("/groups.json") {
            return HttpResponse::new(
                200,
                r#"{"groups":[{"name":"B01003","description":"TOTAL POPULATION"},
                              {"name":"B19083","description":"GINI INDEX OF INCOME INEQUALITY"}]}"#,
            );
        }
        match path.rsplit('/').next().and_then(|f| f.strip_suffix(".json")) {
            Some(group) => HttpResponse::new(
                200,
                format!(
                    r#"{{"variables":{{"{g}_001E":{{"label":"Estimate!!Total"}},"{g}_001M":{{"label":"Margin of Error!!Total"}}}}}}"#,
                    g = group
                ),
            ),
            None => HttpResponse::new(404, ""),
        }
    }
}

#[async_trait]
impl Transport for FakeCensus {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        let Some((year, group, state)) = request_parts(url) else {
            *self.describe_calls.lock().unwrap() += 1;
            return Ok(Self::describe(url));
        };
        self.calls
            .lock()
            .unwrap()
            .push((year, group.clone(), state.clone()));

        if self.dead_years.contains(&year)
            || self
                .failing
                .contains(&(year, group.clone(), state.clone()))
        {
            return Ok(HttpResponse::new(500, "Internal Server Error"));
        }
        if self.unpublished.contains(&(year, group.clone())) {
            return Ok(HttpResponse::new(404, "error: unknown variable"));
        }
        Ok(HttpResponse::new(200, Self::data(year, &group, &state)))
    }
}

pub fn strings<'a>(batch: &'a RecordBatch, name: &str) -> &'a StringArray {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("no column {name}"))
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
}

pub fn floats<'a>(batch: &'a RecordBatch, name: &str) -> &'a Float64Array {
    batch
        .column_by_name(name)
        .unwrap_or_else(|| panic!("no column {name}"))
        .as_any()
        .downcast_ref::<Float64Array>()
        .unwrap()
}

pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}
