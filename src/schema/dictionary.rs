// src/schema/dictionary.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

use crate::history::write_atomic;

/// Variable code → human-readable description, e.g.
/// `B01001_001E` → `SEX BY AGE__Estimate!!Total:`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableDictionary {
    entries: BTreeMap<String, String>,
}

impl VariableDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry unless the code is already described. Returns whether it
    /// was added.
    pub fn insert(&mut self, code: impl Into<String>, description: impl Into<String>) -> bool {
        let code = code.into();
        if self.entries.contains_key(&code) {
            return false;
        }
        self.entries.insert(code, description.into());
        true
    }

    /// Take every entry of `other` this dictionary does not have yet.
    pub fn merge(&mut self, other: &VariableDictionary) {
        for (code, description) in &other.entries {
            self.insert(code.clone(), description.clone());
        }
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON with a trailing newline, written atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_vec_pretty(self).context("serializing dictionary")?;
        json.push(b'\n');
        write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
        serde_json::from_reader(f).with_context(|| format!("parsing {}", path.display()))
    }
}

/// `"{group description}__{label}"`; the group code stands in for a missing
/// description and the variable code for a missing label.
pub fn describe(code: &str, group: &str, group_description: Option<&str>, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{}__{}", group_description.unwrap_or(group), label),
        None => code.to_string(),
    }
}
