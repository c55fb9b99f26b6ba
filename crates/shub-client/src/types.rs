//! Request and response types for the Scrapinghub client

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ShubClientError};

// =============================================================================
// Identifiers
// =============================================================================

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric project identifier, e.g. `123`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ProjectId {
    type Err = ShubClientError;

    fn from_str(s: &str) -> Result<Self> {
        if is_digits(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ShubClientError::invalid_identifier(
                s,
                "project ID must be a non-empty sequence of digits (e.g. 123)",
            ))
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Job identifier in the form `<project>/<spider-seq>/<run-seq>`, e.g. `123/1/2`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobId {
    raw: String,
    project_len: usize,
}

impl JobId {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The project this job belongs to
    pub fn project_id(&self) -> ProjectId {
        ProjectId(self.raw[..self.project_len].to_string())
    }
}

impl FromStr for JobId {
    type Err = ShubClientError;

    fn from_str(s: &str) -> Result<Self> {
        let segments: Vec<&str> = s.split('/').collect();
        if segments.len() != 3 || !segments.iter().all(|seg| is_digits(seg)) {
            return Err(ShubClientError::invalid_identifier(
                s,
                "job ID must be in the form <project>/<spider>/<job> (e.g. 123/1/2)",
            ));
        }
        Ok(Self {
            raw: s.to_string(),
            project_len: segments[0].len(),
        })
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Query Parameters
// =============================================================================

/// Ordered query parameters for an API call
///
/// Keys set through [`QueryParams::set`] stay unique; [`QueryParams::append`]
/// allows repeated keys where the API accepts them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every value of `key` with `value`, keeping the first position
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        let value = value.into();
        match self.0.iter().position(|(k, _)| *k == key) {
            Some(pos) => {
                self.0[pos].1 = value;
                let mut idx = 0;
                self.0.retain(|(k, _)| {
                    let keep = idx <= pos || *k != key;
                    idx += 1;
                    keep
                });
            }
            None => self.0.push((key, value)),
        }
        self
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.push((key.into(), value.into()));
        self
    }

    /// First value for `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[(String, String)] {
        &self.0
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (k, v) in iter {
            params.set(k, v);
        }
        params
    }
}

// =============================================================================
// Stream Window
// =============================================================================

/// Starting offset and requested count for a line stream
///
/// A `count` of zero or less requests every record until the server runs out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamWindow {
    pub offset: u64,
    pub count: i64,
}

impl StreamWindow {
    pub fn new(offset: u64, count: i64) -> Self {
        Self { offset, count }
    }

    /// Every record from the beginning
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_offset(offset: u64) -> Self {
        Self { offset, count: 0 }
    }
}

// =============================================================================
// Job Types
// =============================================================================

/// A job document as returned by the jobs API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub spider: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub close_reason: Option<String>,
    #[serde(default)]
    pub items_scraped: u64,
    #[serde(default)]
    pub errors_count: u64,
    #[serde(default)]
    pub responses_received: u64,
    #[serde(default)]
    pub logs: u64,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub spider_args: HashMap<String, String>,
    #[serde(default)]
    pub spider_type: Option<String>,
    #[serde(default)]
    pub started_time: Option<String>,
    #[serde(default)]
    pub updated_time: Option<String>,
    /// Milliseconds since the job last changed
    #[serde(default)]
    pub elapsed: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Response of `jobs/list.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobList {
    pub status: String,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub jobs: Vec<Job>,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobList {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}
