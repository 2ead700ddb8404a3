//! Declarative field mapper.
//!
//! Drives the builder from `TrackConfig`s: for every record and every
//! config, the config's templates are resolved against the record, the
//! value and timestamp are pulled out, and one event is emitted.

pub mod config;
pub mod template;

use std::collections::BTreeMap;

use serde_json::Value;

pub use config::{ConfigFile, DurationMs, TrackConfig};
pub use template::{get_nested_value, substitute};

use crate::annotation::{AnnotationValue, Annotations};
use crate::builder::TraceBuilder;
use crate::error::{Result, TraceError};
use crate::record::{coerce_f64, duration_ms_to_ns, log_lines, ConversionReport};
use crate::timestamp::{normalize, RawTimestamp, TimestampUnit};
use crate::track::TrackKind;

/// A `TrackConfig` with every template resolved against one record.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedTrack {
    pub kind: TrackKind,
    pub field: String,
    pub track_name: String,
    pub ts_field: String,
    pub unit: TimestampUnit,
    pub timezone: String,
    pub offset: Option<String>,
    pub category: String,
    pub duration_ms: f64,
    pub flow: Option<String>,
}

impl TrackConfig {
    pub fn resolve(&self, record: &Value) -> Result<ResolvedTrack> {
        let kind = self.track_kind()?;
        let field = substitute(&self.field, record);
        let track_name = match &self.tname {
            Some(tname) => substitute(tname, record),
            None => field.clone(),
        };

        let duration_ms = match &self.duration_ms {
            None => 0.0,
            Some(DurationMs::Millis(ms)) => *ms,
            Some(DurationMs::Template(t)) => {
                let text = substitute(t, record);
                match text.trim() {
                    "" => 0.0,
                    s => s.parse().unwrap_or_else(|_| {
                        tracing::warn!("duration_ms {:?} is not a number, using 0", s);
                        0.0
                    }),
                }
            }
        };

        Ok(ResolvedTrack {
            kind,
            field,
            track_name,
            ts_field: substitute(&self.ts, record),
            unit: self.unit,
            timezone: substitute(&self.timezone, record),
            offset: self.offset.as_ref().map(|o| substitute(o, record)),
            category: substitute(&self.category, record),
            duration_ms,
            flow: self.flow.as_ref().map(|f| substitute(f, record)),
        })
    }
}

/// Look up the timestamp of `record`. A missing field is timestamp 0.
fn record_timestamp(record: &Value, track: &ResolvedTrack) -> Result<i64> {
    let raw = get_nested_value(record, &track.ts_field).and_then(RawTimestamp::from_json);
    match raw {
        Some(raw) => normalize(&raw, track.unit, &track.timezone, track.offset.as_deref()),
        None => {
            tracing::warn!(
                "{}: {}, using timestamp 0",
                track.track_name,
                TraceError::FieldNotFound(track.ts_field.clone())
            );
            Ok(0)
        }
    }
}

fn record_value<'a>(record: &'a Value, track: &ResolvedTrack) -> Option<&'a Value> {
    let value = get_nested_value(record, &track.field);
    if value.is_none() {
        tracing::warn!(
            "{}: {}",
            track.track_name,
            TraceError::FieldNotFound(track.field.clone())
        );
    }
    value
}

fn record_annotations(record: &Value, paths: &[String]) -> Annotations {
    paths
        .iter()
        .filter_map(|path| {
            get_nested_value(record, path).map(|v| (path.clone(), AnnotationValue::from_json(v)))
        })
        .collect()
}

impl TraceBuilder {
    /// Map `records` onto tracks of `process_name`, one event per record and
    /// config.
    ///
    /// Every config is validated up front; an unknown kind fails the whole
    /// call before anything is emitted. Per-record failures are logged and
    /// counted in the report.
    pub fn apply(
        &mut self,
        process_name: &str,
        records: &[Value],
        configs: &[TrackConfig],
    ) -> Result<ConversionReport> {
        configs.iter().try_for_each(TrackConfig::validate)?;

        let mut report = ConversionReport::new();
        for config in configs {
            let kind = config.track_kind()?;
            for record in records {
                match self.apply_one(process_name, record, config) {
                    Ok(()) => report.record(kind.as_str(), true),
                    Err(e) if e.is_per_event() => {
                        tracing::warn!("{}/{}: skipping record: {}", process_name, config.field, e);
                        report.record(kind.as_str(), false);
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(report)
    }

    /// `apply` for the `{process_name: [TrackConfig...]}` form.
    pub fn apply_all(
        &mut self,
        records: &[Value],
        configs: &BTreeMap<String, Vec<TrackConfig>>,
    ) -> Result<ConversionReport> {
        configs
            .values()
            .flatten()
            .try_for_each(TrackConfig::validate)?;

        let mut report = ConversionReport::new();
        for (process_name, track_configs) in configs {
            report.merge(&self.apply(process_name, records, track_configs)?);
        }
        Ok(report)
    }

    fn apply_one(&mut self, process_name: &str, record: &Value, config: &TrackConfig) -> Result<()> {
        let track = config.resolve(record)?;
        let ts = record_timestamp(record, &track)?;

        match track.kind {
            TrackKind::Counter => {
                let value = record_value(record, &track).map_or(0.0, coerce_f64);
                self.emit_counter(
                    process_name,
                    &track.track_name,
                    &track.field,
                    ts,
                    value,
                    &track.category,
                    None,
                )
            }
            TrackKind::Instant => self.emit_instant(
                process_name,
                &track.track_name,
                &track.field,
                ts,
                &track.category,
                track.flow.as_deref(),
                &record_annotations(record, &config.args),
                None,
            ),
            TrackKind::Slice => self.emit_span(
                process_name,
                &track.track_name,
                &track.field,
                ts,
                duration_ms_to_ns(track.duration_ms),
                &track.category,
                track.flow.as_deref(),
                &record_annotations(record, &config.args),
                None,
            ),
            TrackKind::Log => {
                let lines = record_value(record, &track).map(log_lines).unwrap_or_default();
                let batch = self.emit_log(process_name, &track.track_name, &lines, None)?;
                if batch.parsed == 0 {
                    return Err(TraceError::LogLineParse(format!(
                        "{}: no parsable log line",
                        track.field
                    )));
                }
                Ok(())
            }
        }
    }
}
