//! Column-oriented "merge" input.
//!
//! A merge document is a JSON list of tracks. Each track holds parallel
//! arrays, one element per event, with timestamps in epoch seconds:
//!
//! ```json
//! [
//!   {"type": "COUNTER", "name": "fps", "group": "display",
//!    "value": [60, 58], "timestamp": [1717243200.0, 1717243201.0]},
//!   {"type": "EVENT", "name": "looper", "event": ["a", "b"], "flow": ["", "f1"],
//!    "value": [1, 2], "timestamp": [1717243200.5, 1717243200.7]},
//!   {"type": "SLICE", "name": "frames", "event": ["draw"], "value": [0],
//!    "timestamp": [1717243200.0], "timestamp_end": [1717243200.016]},
//!   {"type": "LOG", "name": "logcat",
//!    "value": ["2024-06-01 12:00:00.000 1234 5 I Tag: hello"], "timestamp": []}
//! ]
//! ```
//!
//! Tracks with a `group` live under a process of that name, the rest under
//! [`DEFAULT_PROCESS`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::annotation::{AnnotationValue, Annotations};
use crate::builder::{BuilderOptions, LogBatchReport, TraceBuilder};
use crate::document::TraceDocument;
use crate::error::{self, TraceError};
use crate::record::{coerce_f64, ConversionReport};
use crate::timestamp::{normalize, RawTimestamp, TimestampUnit};
use crate::track::TrackKind;

/// Process that ungrouped tracks are attached to.
pub const DEFAULT_PROCESS: &str = "perf_data_merge";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MergeTrackType {
    Counter,
    Event,
    Slice,
    Log,
}

impl MergeTrackType {
    fn kind(&self) -> TrackKind {
        match self {
            MergeTrackType::Counter => TrackKind::Counter,
            MergeTrackType::Event => TrackKind::Instant,
            MergeTrackType::Slice => TrackKind::Slice,
            MergeTrackType::Log => TrackKind::Log,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeTrack {
    #[serde(rename = "type")]
    pub track_type: MergeTrackType,
    pub name: String,
    #[serde(default)]
    pub group: Option<String>,
    /// Counter samples, per-event values, or log lines for LOG tracks.
    #[serde(default)]
    pub value: Vec<Value>,
    #[serde(default)]
    pub timestamp: Vec<f64>,
    #[serde(default)]
    pub timestamp_end: Vec<f64>,
    /// Event names of EVENT and SLICE tracks.
    #[serde(default)]
    pub event: Vec<String>,
    #[serde(default)]
    pub flow: Option<Vec<String>>,
    #[serde(default)]
    pub log: Option<Vec<Value>>,
}

impl MergeTrack {
    fn process(&self) -> &str {
        self.group.as_deref().unwrap_or(DEFAULT_PROCESS)
    }

    fn flow_at(&self, index: usize) -> Option<&str> {
        self.flow
            .as_ref()
            .and_then(|flows| flows.get(index))
            .map(String::as_str)
    }

    fn annotations_at(&self, index: usize) -> Annotations {
        let mut annotations = Annotations::new();
        if let Some(value) = self.value.get(index) {
            annotations.push(("values".to_string(), AnnotationValue::from_json(value)));
        }
        if let Some(log) = self.log.as_ref().and_then(|logs| logs.get(index)) {
            annotations.push(("logs".to_string(), AnnotationValue::from_json(log)));
        }
        annotations
    }
}

fn seconds_to_ns(seconds: f64) -> error::Result<i64> {
    normalize(
        &RawTimestamp::Float(seconds),
        TimestampUnit::Seconds,
        "+0000",
        None,
    )
}

impl TraceBuilder {
    /// Emit every event of the given merge tracks.
    pub fn merge_tracks(&mut self, tracks: &[MergeTrack]) -> error::Result<ConversionReport> {
        let mut report = ConversionReport::new();
        let mut logs = LogBatchReport::default();

        for track in tracks {
            let kind = track.track_type.kind();
            if track.track_type == MergeTrackType::Log {
                let lines: Vec<&str> = track.value.iter().filter_map(Value::as_str).collect();
                let batch = self.emit_log(track.process(), &track.name, &lines, None)?;
                for _ in 0..batch.parsed {
                    report.record(kind.as_str(), true);
                }
                for _ in 0..batch.skipped {
                    report.record(kind.as_str(), false);
                }
                logs.parsed += batch.parsed;
                logs.skipped += batch.skipped;
                logs.last_timestamp = logs.last_timestamp.max(batch.last_timestamp);
                continue;
            }

            for index in 0..track.timestamp.len() {
                match self.merge_event(track, index) {
                    Ok(()) => report.record(kind.as_str(), true),
                    Err(e) if e.is_per_event() => {
                        tracing::warn!("{}[{}]: skipping event: {}", track.name, index, e);
                        report.record(kind.as_str(), false);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(ts) = logs.last_timestamp {
            self.emit_log_stats(ts, &logs)?;
        }
        Ok(report)
    }

    fn merge_event(&mut self, track: &MergeTrack, index: usize) -> error::Result<()> {
        let process = track.process();
        let ts = seconds_to_ns(track.timestamp[index])?;
        let event_name = || {
            track.event.get(index).map(String::as_str).ok_or_else(|| {
                TraceError::FieldNotFound(format!("{}.event[{}]", track.name, index))
            })
        };

        match track.track_type {
            MergeTrackType::Counter => {
                let value = track.value.get(index).ok_or_else(|| {
                    TraceError::FieldNotFound(format!("{}.value[{}]", track.name, index))
                })?;
                self.emit_counter(
                    process,
                    &track.name,
                    &track.name,
                    ts,
                    coerce_f64(value),
                    &track.name,
                    None,
                )
            }
            MergeTrackType::Event => self.emit_instant(
                process,
                &track.name,
                event_name()?,
                ts,
                &track.name,
                track.flow_at(index),
                &track.annotations_at(index),
                None,
            ),
            MergeTrackType::Slice => {
                // A missing or zero end marks a slice without duration.
                let end = match track.timestamp_end.get(index) {
                    Some(end) if *end != 0.0 => seconds_to_ns(*end)?,
                    _ => ts,
                };
                self.emit_span(
                    process,
                    &track.name,
                    event_name()?,
                    ts,
                    end.saturating_sub(ts),
                    &track.name,
                    track.flow_at(index),
                    &track.annotations_at(index),
                    None,
                )
            }
            MergeTrackType::Log => Ok(()),
        }
    }
}

/// Build a complete, sealed document from merge JSON.
pub fn merge_json(text: &str, options: BuilderOptions) -> Result<(TraceDocument, ConversionReport)> {
    let tracks: Vec<MergeTrack> =
        serde_json::from_str(text).context("Failed to parse merge input")?;
    tracing::info!("Merging {} tracks", tracks.len());

    let mut builder = TraceBuilder::with_options(options);
    builder.ensure_process(DEFAULT_PROCESS, None)?;
    let report = builder.merge_tracks(&tracks)?;
    let doc = builder.finish()?;
    Ok((doc, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use perfetto_protos::trace_packet::trace_packet::Data;
    use perfetto_protos::track_event::track_event::Type;
    use perfetto_protos::track_event::TrackEvent;

    fn options() -> BuilderOptions {
        BuilderOptions {
            seed: Some(99),
            ..Default::default()
        }
    }

    const INPUT: &str = r#"[
        {"type": "COUNTER", "name": "fps", "group": "display",
         "value": [60, 58], "timestamp": [100.0, 101.0]},
        {"type": "EVENT", "name": "looper", "event": ["a", "b"], "flow": ["", "f1"],
         "value": [1, "x"], "log": ["first", "second"], "timestamp": [100.5, 100.7]},
        {"type": "SLICE", "name": "frames", "event": ["draw", "open"], "flow": ["f1", ""],
         "value": [0, 0], "timestamp": [100.0, 102.0], "timestamp_end": [100.25, 0]},
        {"type": "LOG", "name": "logcat",
         "value": ["2024-06-01 12:00:00.000 1234 5 I Tag: hello", "bad line"], "timestamp": []}
    ]"#;

    #[test]
    fn test_merge_document() {
        let (doc, report) = merge_json(INPUT, options()).unwrap();
        assert!(doc.is_sealed());
        assert_eq!(report.get("counter").converted, 2);
        assert_eq!(report.get("instant").converted, 2);
        assert_eq!(report.get("slice").converted, 2);
        assert_eq!(report.get("log").input, 2);
        assert_eq!(report.get("log").converted, 1);

        let events: Vec<(u64, TrackEvent)> = doc
            .packets()
            .iter()
            .filter_map(|p| match p.data {
                Some(Data::TrackEvent(ref e)) => Some((p.timestamp(), e.clone())),
                _ => None,
            })
            .collect();
        // 2 counters, 2 instants, 2 begin/end pairs
        assert_eq!(events.len(), 8);
        assert_eq!(events[0].0, 100_000_000_000);
        assert_eq!(events[0].1.double_counter_value(), 60.0);

        let instant_b = &events[3].1;
        assert_eq!(instant_b.name(), "b");
        let draw_begin = &events[4].1;
        assert_eq!(draw_begin.type_(), Type::TYPE_SLICE_BEGIN);
        assert_eq!(instant_b.flow_ids, draw_begin.flow_ids);
        assert!(events[2].1.flow_ids.is_empty());
        assert_eq!(events[5].0, 100_250_000_000);

        let args = &events[2].1.debug_annotations[0];
        assert_eq!(args.dict_entries.len(), 2);
        assert_eq!(args.dict_entries[0].name(), "values");
        assert_eq!(args.dict_entries[1].name(), "logs");
        assert_eq!(args.dict_entries[1].string_value(), "first");

        // open-ended slice collapses to zero duration
        assert_eq!(events[6].0, events[7].0);
    }

    #[test]
    fn test_grouping() {
        let mut builder = TraceBuilder::with_options(options());
        let tracks: Vec<MergeTrack> = serde_json::from_str(INPUT).unwrap();
        builder.merge_tracks(&tracks).unwrap();
        assert!(builder.registry().process("display").is_some());
        assert!(builder.registry().process(DEFAULT_PROCESS).is_some());
    }

    #[test]
    fn test_log_stats_and_snapshot() {
        let (doc, _) = merge_json(INPUT, options()).unwrap();
        let stats = doc
            .packets()
            .iter()
            .find_map(|p| match p.data {
                Some(Data::AndroidLog(ref log)) if log.events.is_empty() => Some(log.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(stats.stats.num_total(), 2);
        assert_eq!(stats.stats.num_failed(), 1);

        // earliest event is the counter at 100s
        assert_eq!(doc.packets().last().unwrap().timestamp(), 100_000_000_000);
    }

    #[test]
    fn test_missing_event_name_skips_event() {
        let input = r#"[{"type": "EVENT", "name": "e", "event": ["only"], "timestamp": [1.0, 2.0]}]"#;
        let (_, report) = merge_json(input, options()).unwrap();
        assert_eq!(report.get("instant").input, 2);
        assert_eq!(report.get("instant").converted, 1);
    }

    #[test]
    fn test_extreme_slice_bounds_do_not_overflow() {
        let input = r#"[
            {"type": "SLICE", "name": "s", "event": ["wide", "reversed"],
             "timestamp": [-1e300, 1e300], "timestamp_end": [1e300, -1e300]}
        ]"#;
        let (doc, report) = merge_json(input, options()).unwrap();
        assert_eq!(report.get("slice").input, 2);
        assert_eq!(report.get("slice").converted, 1);
        let ends: Vec<u64> = doc
            .packets()
            .iter()
            .filter_map(|p| match p.data {
                Some(Data::TrackEvent(ref e)) if e.type_() == Type::TYPE_SLICE_END => {
                    Some(p.timestamp())
                }
                _ => None,
            })
            .collect();
        assert_eq!(ends, vec![0]);
    }

    #[test]
    fn test_bad_json_is_an_error() {
        assert!(merge_json("{not json", options()).is_err());
        assert!(merge_json(r#"[{"type": "HISTOGRAM", "name": "x"}]"#, options()).is_err());
    }
}
