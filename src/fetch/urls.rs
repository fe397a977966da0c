// src/fetch/urls.rs
use url::Url;

use crate::config::Config;

fn dataset_url(config: &Config, year: i32, suffix: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}/acs/acs1{}",
        config.base_url.trim_end_matches('/'),
        year,
        suffix
    ))
}

/// Every place in one state, every variable of one group.
///
/// `{base}/{year}/acs/acs1?get=group(B01001)&for=place:*&in=state:06&key=…`
pub fn data_url(config: &Config, year: i32, group: &str, state_fips: &str) -> Result<Url, url::ParseError> {
    let mut url = dataset_url(config, year, "")?;
    url.query_pairs_mut()
        .append_pair("get", &format!("group({})", group))
        .append_pair("for", "place:*")
        .append_pair("in", &format!("state:{}", state_fips))
        .append_pair("key", &config.api_key);
    Ok(url)
}

/// Catalogue of every group published for `year`.
pub fn groups_url(config: &Config, year: i32) -> Result<Url, url::ParseError> {
    dataset_url(config, year, "/groups.json")
}

/// Variable labels of one group.
pub fn group_variables_url(config: &Config, year: i32, group: &str) -> Result<Url, url::ParseError> {
    dataset_url(config, year, &format!("/groups/{}.json", group))
}

/// Query parameters of a data URL as `(year, group, state)`.
pub fn request_parts(url: &Url) -> Option<(i32, String, String)> {
    let year = url
        .path_segments()?
        .find_map(|segment| segment.parse::<i32>().ok())?;
    let mut group = None;
    let mut state = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "get" => {
                group = v
                    .strip_prefix("group(")
                    .and_then(|g| g.strip_suffix(')'))
                    .map(str::to_string)
            }
            "in" => state = v.strip_prefix("state:").map(str::to_string),
            _ => {}
        }
    }
    Some((year, group?, state?))
}
