//! Track configuration as it appears in JSON config files.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::timestamp::TimestampUnit;
use crate::track::TrackKind;

fn default_ts_field() -> String {
    "collect_time".to_string()
}

fn default_timezone() -> String {
    "+0800".to_string()
}

fn default_category() -> String {
    "default".to_string()
}

/// Slice duration in milliseconds, either literal or a template such as
/// `"$(total_duration)"`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationMs {
    Millis(f64),
    Template(String),
}

/// Describes one output track fed from one input field.
///
/// Every string field may contain `$(path)` placeholders, resolved against
/// the record being mapped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackConfig {
    /// Dot path of the value field. Also the event name.
    pub field: String,
    /// Track display name, `field` when absent.
    #[serde(default)]
    pub tname: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    /// Dot path of the timestamp field.
    #[serde(default = "default_ts_field")]
    pub ts: String,
    #[serde(default)]
    pub unit: TimestampUnit,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub offset: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub duration_ms: Option<DurationMs>,
    /// Flow label shared by correlated instants and slices.
    #[serde(default)]
    pub flow: Option<String>,
    /// Dot paths copied into the event's `args` annotation.
    #[serde(default)]
    pub args: Vec<String>,
}

impl TrackConfig {
    /// A config with defaults for everything but the field and kind.
    pub fn new(field: &str, kind: TrackKind) -> Self {
        TrackConfig {
            field: field.to_string(),
            tname: None,
            kind: kind.as_str().to_string(),
            ts: default_ts_field(),
            unit: TimestampUnit::Auto,
            timezone: default_timezone(),
            offset: None,
            category: default_category(),
            duration_ms: None,
            flow: None,
            args: Vec::new(),
        }
    }

    pub fn track_kind(&self) -> std::result::Result<TrackKind, TraceError> {
        self.kind.parse()
    }

    pub fn validate(&self) -> std::result::Result<(), TraceError> {
        self.track_kind().map(|_| ())
    }
}

/// The two accepted config file shapes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigFile {
    /// `{"process": [TrackConfig, ...], ...}`
    ByProcess(BTreeMap<String, Vec<TrackConfig>>),
    /// `[TrackConfig, ...]`, for a process named elsewhere.
    List(Vec<TrackConfig>),
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: ConfigFile = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> std::result::Result<(), TraceError> {
        match self {
            ConfigFile::ByProcess(map) => map.values().flatten().try_for_each(TrackConfig::validate),
            ConfigFile::List(list) => list.iter().try_for_each(TrackConfig::validate),
        }
    }

    /// Normalize to the map form. A bare list is attached to `process`.
    pub fn into_map(self, process: &str) -> BTreeMap<String, Vec<TrackConfig>> {
        match self {
            ConfigFile::ByProcess(map) => map,
            ConfigFile::List(list) => BTreeMap::from([(process.to_string(), list)]),
        }
    }
}
