// src/fetch/describe.rs
//! Group descriptions and variable labels for the data dictionary.

use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::{urls, Fetcher};

#[derive(Debug, Deserialize)]
struct GroupList {
    groups: Vec<GroupEntry>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct VariableList {
    variables: BTreeMap<String, VariableEntry>,
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    #[serde(default)]
    label: String,
}

/// Group code → description for every group published in `year`.
/// Any failure yields an empty map.
pub async fn group_descriptions(fetcher: &Fetcher<'_>, year: i32) -> BTreeMap<String, String> {
    let url = match urls::groups_url(fetcher.config(), year) {
        Ok(u) => u,
        Err(e) => {
            warn!(year, error = %e, "bad groups URL");
            return BTreeMap::new();
        }
    };
    match fetcher.get_json::<GroupList>(&url).await {
        Ok(list) => {
            debug!(year, groups = list.groups.len(), "group descriptions");
            list.groups
                .into_iter()
                .filter(|g| !g.description.is_empty())
                .map(|g| (g.name, g.description))
                .collect()
        }
        Err(e) => {
            warn!(year, error = %e, "group descriptions unavailable");
            BTreeMap::new()
        }
    }
}

/// Variable code → label for one group in `year`.
/// Any failure yields an empty map.
pub async fn variable_labels(
    fetcher: &Fetcher<'_>,
    year: i32,
    group: &str,
) -> BTreeMap<String, String> {
    let url = match urls::group_variables_url(fetcher.config(), year, group) {
        Ok(u) => u,
        Err(e) => {
            warn!(year, group, error = %e, "bad variables URL");
            return BTreeMap::new();
        }
    };
    match fetcher.get_json::<VariableList>(&url).await {
        Ok(list) => list
            .variables
            .into_iter()
            .filter(|(_, v)| !v.label.is_empty())
            .map(|(code, v)| (code, v.label))
            .collect(),
        Err(e) => {
            warn!(year, group, error = %e, "variable labels unavailable");
            BTreeMap::new()
        }
    }
}
