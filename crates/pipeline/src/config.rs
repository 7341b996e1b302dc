//! Pipeline configuration model
//!
//! The config file is a YAML list of segment entries:
//!
//! ```yaml
//! - segment: netflow
//!   config:
//!     listen: netflow://:2055
//! - segment: branch
//!   config:
//!     condition: proto 6
//!   then:
//!     - segment: protomap
//!   else:
//!     - segment: drop
//! - segment: lumberjack
//!   config:
//!     servers: tcp://collector.example.com:5044
//! ```
//!
//! Option values may be written as any YAML scalar; they are normalized to
//! strings at load time so segment factories uniformly see a string map and
//! apply their own typing conventions (unsigned integers, durations,
//! booleans, URL lists).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{PipelineError, Result};

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

/// One entry in the pipeline definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentEntry {
    /// Registered segment name.
    pub segment: String,

    /// Segment options (string map, typed by convention per segment).
    #[serde(default)]
    pub config: SegmentConfig,

    /// Nested segment list for the matching side of a `branch` entry.
    #[serde(default, rename = "then")]
    pub then_branch: Vec<SegmentEntry>,

    /// Nested segment list for the non-matching side of a `branch` entry.
    #[serde(default, rename = "else")]
    pub else_branch: Vec<SegmentEntry>,
}

/// Parse a YAML pipeline definition into segment entries.
pub fn parse_config(yaml: &str) -> Result<Vec<SegmentEntry>> {
    let entries: Vec<SegmentEntry> = serde_yaml::from_str(yaml)?;
    Ok(entries)
}

/// String-typed option map handed to segment factories.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentConfig(#[serde(deserialize_with = "scalar_map")] HashMap<String, String>);

impl SegmentConfig {
    /// Build a config from key/value pairs (tests, synthetic pipelines).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        SegmentConfig(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Raw option value, if present and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    /// Raw option value, or a missing-option error.
    pub fn require(&self, segment: &'static str, option: &'static str) -> Result<&str> {
        self.get(option)
            .ok_or(PipelineError::MissingOption { segment, option })
    }

    /// Unsigned integer option. Underscore digit separators are accepted
    /// (`queuesize: 65_536`).
    pub fn get_u64(&self, segment: &'static str, option: &'static str) -> Result<Option<u64>> {
        match self.get(option) {
            None => Ok(None),
            Some(value) => value
                .replace('_', "")
                .parse::<u64>()
                .map(Some)
                .map_err(|e| PipelineError::invalid_option(segment, option, e.to_string())),
        }
    }

    /// Floating point option.
    pub fn get_f64(&self, segment: &'static str, option: &'static str) -> Result<Option<f64>> {
        match self.get(option) {
            None => Ok(None),
            Some(value) => value
                .parse::<f64>()
                .map(Some)
                .map_err(|e| PipelineError::invalid_option(segment, option, e.to_string())),
        }
    }

    /// Boolean option (`true`/`false`, `yes`/`no`, `1`/`0`, `t`/`f`).
    pub fn get_bool(&self, segment: &'static str, option: &'static str) -> Result<Option<bool>> {
        let Some(value) = self.get(option) else {
            return Ok(None);
        };
        match value.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "yes" => Ok(Some(true)),
            "0" | "f" | "false" | "no" => Ok(Some(false)),
            other => Err(PipelineError::invalid_option(
                segment,
                option,
                format!("'{other}' is not a boolean"),
            )),
        }
    }

    /// Duration option in human-readable form (`50ms`, `5s`, `1m`).
    pub fn get_duration(
        &self,
        segment: &'static str,
        option: &'static str,
    ) -> Result<Option<Duration>> {
        match self.get(option) {
            None => Ok(None),
            Some(value) => humantime::parse_duration(value)
                .map(Some)
                .map_err(|e| PipelineError::invalid_option(segment, option, e.to_string())),
        }
    }
}

/// Accept any YAML scalar as an option value and normalize it to a string.
fn scalar_map<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Bool(bool),
        UInt(u64),
        Int(i64),
        Float(f64),
        String(String),
        Null,
    }

    let raw: HashMap<String, Scalar> = HashMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Scalar::Bool(b) => b.to_string(),
                Scalar::UInt(u) => u.to_string(),
                Scalar::Int(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
                Scalar::String(s) => s,
                Scalar::Null => String::new(),
            };
            (key, value)
        })
        .collect())
}
