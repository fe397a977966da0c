mod common;

use acspanel::assemble::Collector;
use acspanel::error::{ConfigError, FetchError};
use acspanel::fetch::{urls::request_parts, HttpResponse, Transport};
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::tempdir;
use url::Url;

use common::{init_test_logging, test_config};

/// Always answers with the same body and remembers what was asked.
struct Fixed {
    status: u16,
    body: &'static str,
    seen: Mutex<Vec<Url>>,
}

impl Fixed {
    fn new(status: u16, body: &'static str) -> Self {
        Self {
            status,
            body,
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transport for Fixed {
    async fn get(&self, url: &Url) -> Result<HttpResponse, FetchError> {
        self.seen.lock().unwrap().push(url.clone());
        Ok(HttpResponse::new(self.status, self.body))
    }
}

#[tokio::test]
async fn los_angeles_single_row() {
    init_test_logging();
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let transport = Fixed::new(
        200,
        r#"[["GROUP","place","state","NAME"],["B01001_001E_value","0644000","06","Los Angeles city, California"]]"#,
    );
    let collector = Collector::new(&cfg, &transport).unwrap();

    let table = collector.fetch_one(2023, "B01001", "06").await.unwrap();
    assert_eq!(table.headers, vec!["GROUP", "place", "state", "NAME"]);
    assert_eq!(
        table.rows,
        vec![vec![
            Some("B01001_001E_value".to_string()),
            Some("0644000".to_string()),
            Some("06".to_string()),
            Some("Los Angeles city, California".to_string()),
        ]]
    );

    let seen = transport.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        request_parts(&seen[0]),
        Some((2023, "B01001".to_string(), "06".to_string()))
    );
    assert!(seen[0].query_pairs().any(|(k, v)| k == "key" && v == "test-key"));
}

#[tokio::test]
async fn fetch_one_writes_nothing() {
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let transport = Fixed::new(200, r#"[["NAME","state","place"],["x","06","44000"]]"#);
    let collector = Collector::new(&cfg, &transport).unwrap();
    collector.fetch_one(2019, "B01003", "06").await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert!(entries.is_empty());
}

#[tokio::test]
async fn bad_arguments_fail_before_any_request() {
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let transport = Fixed::new(200, "[]");
    let collector = Collector::new(&cfg, &transport).unwrap();

    let err = collector.fetch_one(2023, "B01001", "99").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::UnknownState(_))
    ));
    let err = collector.fetch_one(2023, "group(B01001)", "06").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::InvalidGroup(_))
    ));
    let err = collector.fetch_one(1990, "B01001", "06").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::YearRange { .. })
    ));
    assert!(transport.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn unpublished_group_is_reported() {
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let transport = Fixed::new(404, "error: unknown variable 'group(B99999)'");
    let collector = Collector::new(&cfg, &transport).unwrap();

    let err = collector.fetch_one(2009, "B99999", "06").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<FetchError>(),
        Some(FetchError::Unavailable)
    ));
    assert_eq!(transport.seen.lock().unwrap().len(), 1);
}
