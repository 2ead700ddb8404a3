//! Standard intermediate records and their ingestion.
//!
//! Adapters turn raw subsystem data into `StandardRecord`s; the builder
//! dispatches each one by its event type.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::annotation::{AnnotationValue, Annotations};
use crate::builder::TraceBuilder;
use crate::error::{Result, TraceError};
use crate::timestamp::{normalize, RawTimestamp, TimestampUnit, NANOS_PER_MILLI};
use crate::track::TrackKind;

fn default_unit() -> TimestampUnit {
    TimestampUnit::Millis
}

fn default_category() -> String {
    "default".to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardRecord {
    /// `counter`, `instant`, `slice` or `log`.
    pub event_type: String,
    pub process_name: String,
    pub track_name: String,
    pub timestamp: i64,
    /// Unit of `timestamp`, epoch milliseconds unless stated.
    #[serde(default = "default_unit")]
    pub unit: TimestampUnit,
    /// Counter sample, or the log line(s) of a log record.
    #[serde(default)]
    pub value: Value,
    #[serde(default = "default_category")]
    pub category: String,
    /// Event name, `track_name` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
}

impl StandardRecord {
    pub fn counter(process: &str, track: &str, timestamp_ms: i64, value: f64, category: &str) -> Self {
        StandardRecord {
            event_type: TrackKind::Counter.as_str().to_string(),
            process_name: process.to_string(),
            track_name: track.to_string(),
            timestamp: timestamp_ms,
            unit: TimestampUnit::Millis,
            value: Value::from(value),
            category: category.to_string(),
            name: None,
            duration_ms: None,
            flow: None,
            args: None,
            pid: None,
        }
    }

    pub fn slice(
        process: &str,
        track: &str,
        timestamp_ms: i64,
        duration_ms: f64,
        category: &str,
    ) -> Self {
        StandardRecord {
            event_type: TrackKind::Slice.as_str().to_string(),
            duration_ms: Some(duration_ms),
            value: Value::from(duration_ms),
            ..Self::counter(process, track, timestamp_ms, 0.0, category)
        }
    }

    fn event_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.track_name)
    }

    fn annotations(&self) -> Annotations {
        self.args
            .iter()
            .flatten()
            .map(|(k, v)| (k.clone(), AnnotationValue::from_json(v)))
            .collect()
    }
}

/// Input and converted counts for one event type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TypeCounts {
    pub input: usize,
    pub converted: usize,
}

impl TypeCounts {
    pub fn failed(&self) -> usize {
        self.input - self.converted
    }
}

/// Per-type tally of one conversion run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversionReport {
    counts: BTreeMap<String, TypeCounts>,
}

impl ConversionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event_type: &str, converted: bool) {
        let counts = self.counts.entry(event_type.to_string()).or_default();
        counts.input += 1;
        if converted {
            counts.converted += 1;
        }
    }

    pub fn merge(&mut self, other: &ConversionReport) {
        for (event_type, c) in &other.counts {
            let counts = self.counts.entry(event_type.clone()).or_default();
            counts.input += c.input;
            counts.converted += c.converted;
        }
    }

    pub fn get(&self, event_type: &str) -> TypeCounts {
        self.counts.get(event_type).copied().unwrap_or_default()
    }

    pub fn total_input(&self) -> usize {
        self.counts.values().map(|c| c.input).sum()
    }

    pub fn total_converted(&self) -> usize {
        self.counts.values().map(|c| c.converted).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.counts.is_empty() {
            return write!(f, "no records");
        }
        for (i, (event_type, c)) in self.counts.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}/{} converted", event_type, c.converted, c.input)?;
            if c.failed() > 0 {
                write!(f, " ({} failed)", c.failed())?;
            }
        }
        Ok(())
    }
}

/// Coerce a record value to a counter sample. Numbers, numeric strings and
/// bools convert; anything else is 0.0.
pub fn coerce_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Collect log lines from a string or an array of strings.
pub fn log_lines(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s.lines().map(str::to_string).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Slice duration in nanoseconds. Fractional milliseconds are truncated.
pub fn duration_ms_to_ns(ms: f64) -> i64 {
    (ms.trunc() as i64).saturating_mul(NANOS_PER_MILLI)
}

impl TraceBuilder {
    /// Ingest a batch of standard records.
    ///
    /// Records that fail are logged and counted; only document-level errors
    /// abort the batch.
    pub fn ingest_standard(&mut self, records: &[StandardRecord]) -> Result<ConversionReport> {
        let mut report = ConversionReport::new();
        for record in records {
            match self.ingest_one(record) {
                Ok(()) => report.record(&record.event_type, true),
                Err(e) if e.is_per_event() || matches!(e, TraceError::UnsupportedTrackKind(_)) => {
                    tracing::warn!(
                        "{}/{}: skipping {} record: {}",
                        record.process_name,
                        record.track_name,
                        record.event_type,
                        e
                    );
                    report.record(&record.event_type, false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn ingest_one(&mut self, record: &StandardRecord) -> Result<()> {
        let kind: TrackKind = record.event_type.parse()?;
        let ts = normalize(
            &RawTimestamp::Int(record.timestamp),
            record.unit,
            "+0000",
            None,
        )?;
        let process = record.process_name.as_str();
        let track = record.track_name.as_str();

        match kind {
            TrackKind::Counter => self.emit_counter(
                process,
                track,
                record.event_name(),
                ts,
                coerce_f64(&record.value),
                &record.category,
                record.pid,
            ),
            TrackKind::Instant => self.emit_instant(
                process,
                track,
                record.event_name(),
                ts,
                &record.category,
                record.flow.as_deref(),
                &record.annotations(),
                record.pid,
            ),
            TrackKind::Slice => self.emit_span(
                process,
                track,
                record.event_name(),
                ts,
                duration_ms_to_ns(record.duration_ms.unwrap_or(0.0)),
                &record.category,
                record.flow.as_deref(),
                &record.annotations(),
                record.pid,
            ),
            TrackKind::Log => {
                let lines = log_lines(&record.value);
                let batch = self.emit_log(process, track, &lines, record.pid)?;
                if batch.parsed == 0 {
                    return Err(TraceError::LogLineParse(format!(
                        "no parsable line among {}",
                        batch.skipped
                    )));
                }
                Ok(())
            }
        }
    }
}
