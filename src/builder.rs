//! Event packet builder.
//!
//! `TraceBuilder` owns every piece of per-document state: the packet
//! sequence, the track registry, the id allocator and the flow table. Each
//! `emit_*` call resolves its track, builds the packet(s) for one event and
//! appends them to the document in one step.

use std::fmt;
use std::path::Path;

use chrono::FixedOffset;
use perfetto_protos::android_log::android_log_packet::{LogEvent, Stats};
use perfetto_protos::android_log::AndroidLogPacket;
use perfetto_protos::android_log_constants::AndroidLogId;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_event::track_event::Type;
use perfetto_protos::track_event::TrackEvent;

use crate::annotation::{args_annotation, AnnotationValue};
use crate::document::{to_trace_ts, TraceDocument};
use crate::error::{Result, TraceError};
use crate::flow::FlowCorrelator;
use crate::ids::{sequence_id_from_root, IdAllocator};
use crate::logline::parse_log_line;
use crate::timestamp::parse_timezone;
use crate::track::{ProcessTrack, TrackKind, TrackRegistry};

#[derive(Clone, Debug)]
pub struct BuilderOptions {
    /// Timezone log-line dates are written in, as signed `HHMM`.
    pub log_timezone: String,
    /// Seed for the id allocator. `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        BuilderOptions {
            log_timezone: "+0000".to_string(),
            seed: None,
        }
    }
}

/// Outcome of one `emit_log` batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LogBatchReport {
    pub parsed: usize,
    pub skipped: usize,
    /// Timestamp of the last parsed line.
    pub last_timestamp: Option<i64>,
}

impl fmt::Display for LogBatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} parsed, {} skipped", self.parsed, self.skipped)
    }
}

pub struct TraceBuilder {
    doc: TraceDocument,
    registry: TrackRegistry,
    ids: IdAllocator,
    flows: FlowCorrelator,
    log_tz: FixedOffset,
}

fn track_event_packet(event: TrackEvent) -> TracePacket {
    let mut packet = TracePacket::default();
    packet.set_track_event(event);
    packet
}

fn new_track_event(kind: Type, track_uuid: u64, name: &str, category: &str) -> TrackEvent {
    let mut event = TrackEvent::default();
    event.set_type(kind);
    event.set_track_uuid(track_uuid);
    event.set_name(name.to_string());
    if !category.is_empty() {
        event.categories.push(category.to_string());
    }
    event
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::with_options(BuilderOptions::default())
    }

    pub fn with_options(options: BuilderOptions) -> Self {
        let mut ids = match options.seed {
            Some(seed) => IdAllocator::seeded(seed),
            None => IdAllocator::new(),
        };
        // A zero sequence id reads as "unset"; draw roots until the upper
        // half is nonzero.
        let sequence_id = loop {
            let seq = sequence_id_from_root(ids.next_id());
            if seq != 0 {
                break seq;
            }
        };

        TraceBuilder {
            doc: TraceDocument::new(sequence_id),
            registry: TrackRegistry::new(),
            ids,
            flows: FlowCorrelator::new(),
            log_tz: parse_timezone(&options.log_timezone),
        }
    }

    pub fn sequence_id(&self) -> u32 {
        self.doc.sequence_id()
    }

    pub fn document(&self) -> &TraceDocument {
        &self.doc
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn ensure_process(&mut self, name: &str, pid: Option<i32>) -> Result<ProcessTrack> {
        self.registry
            .ensure_process(name, pid, &mut self.ids, &mut self.doc)
    }

    pub fn ensure_track(
        &mut self,
        process_name: &str,
        kind: TrackKind,
        track_name: &str,
        pid: Option<i32>,
    ) -> Result<u64> {
        self.registry.ensure_track(
            process_name,
            kind,
            track_name,
            pid,
            &mut self.ids,
            &mut self.doc,
        )
    }

    /// Resolve a flow label to its id, allocating on first use.
    pub fn flow_id(&mut self, label: Option<&str>) -> Option<u64> {
        self.flows.resolve(label, &mut self.ids)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn emit_counter(
        &mut self,
        process: &str,
        track_name: &str,
        event_name: &str,
        timestamp: i64,
        value: f64,
        category: &str,
        pid: Option<i32>,
    ) -> Result<()> {
        let track_uuid = self.ensure_track(process, TrackKind::Counter, track_name, pid)?;

        let mut event = new_track_event(Type::TYPE_COUNTER, track_uuid, event_name, category);
        event.set_double_counter_value(value);
        self.doc
            .push_event(vec![(timestamp, track_event_packet(event))])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn emit_instant(
        &mut self,
        process: &str,
        track_name: &str,
        event_name: &str,
        timestamp: i64,
        category: &str,
        flow_label: Option<&str>,
        annotations: &[(String, AnnotationValue)],
        pid: Option<i32>,
    ) -> Result<()> {
        let track_uuid = self.ensure_track(process, TrackKind::Instant, track_name, pid)?;

        let mut event = new_track_event(Type::TYPE_INSTANT, track_uuid, event_name, category);
        if let Some(flow) = self.flow_id(flow_label) {
            event.flow_ids.push(flow);
        }
        if !annotations.is_empty() {
            event.debug_annotations.push(args_annotation(annotations));
        }
        self.doc
            .push_event(vec![(timestamp, track_event_packet(event))])
    }

    /// Emit a begin/end pair. The end packet lands at `start + duration_ns`
    /// and always directly follows the begin packet.
    #[allow(clippy::too_many_arguments)]
    pub fn emit_span(
        &mut self,
        process: &str,
        track_name: &str,
        event_name: &str,
        start: i64,
        duration_ns: i64,
        category: &str,
        flow_label: Option<&str>,
        annotations: &[(String, AnnotationValue)],
        pid: Option<i32>,
    ) -> Result<()> {
        if duration_ns < 0 {
            return Err(TraceError::NegativeDuration {
                name: event_name.to_string(),
                duration_ns,
            });
        }
        let track_uuid = self.ensure_track(process, TrackKind::Slice, track_name, pid)?;

        let mut begin = new_track_event(Type::TYPE_SLICE_BEGIN, track_uuid, event_name, category);
        if let Some(flow) = self.flow_id(flow_label) {
            begin.flow_ids.push(flow);
        }
        if !annotations.is_empty() {
            begin.debug_annotations.push(args_annotation(annotations));
        }
        let end = new_track_event(Type::TYPE_SLICE_END, track_uuid, event_name, category);

        self.doc.push_event(vec![
            (start, track_event_packet(begin)),
            (start.saturating_add(duration_ns), track_event_packet(end)),
        ])
    }

    /// Parse and append a batch of log lines. Lines that do not parse are
    /// skipped with a warning; the log track is only created once a line
    /// parses. A sealed document fails the whole batch.
    pub fn emit_log<S: AsRef<str>>(
        &mut self,
        process: &str,
        track_name: &str,
        lines: &[S],
        pid: Option<i32>,
    ) -> Result<LogBatchReport> {
        let mut report = LogBatchReport::default();
        let mut parsed_lines = Vec::with_capacity(lines.len());
        for line in lines {
            match parse_log_line(line.as_ref(), self.log_tz) {
                Ok(parsed) => parsed_lines.push(parsed),
                Err(e) => {
                    tracing::warn!("{}/{}: skipping log line: {}", process, track_name, e);
                    report.skipped += 1;
                }
            }
        }
        if parsed_lines.is_empty() {
            tracing::debug!("{}/{}: {}", process, track_name, report);
            return Ok(report);
        }

        self.ensure_track(process, TrackKind::Log, track_name, pid)?;
        for parsed in parsed_lines {
            let timestamp = parsed.timestamp;
            let mut log_event = LogEvent::default();
            log_event.set_log_id(AndroidLogId::LID_DEFAULT);
            log_event.set_pid(parsed.pid);
            log_event.set_tid(parsed.tid);
            log_event.set_timestamp(to_trace_ts(timestamp));
            log_event.set_prio(parsed.level.priority());
            log_event.set_tag(parsed.tag);
            log_event.set_message(parsed.message);

            let mut log = AndroidLogPacket::default();
            log.events.push(log_event);

            let mut packet = TracePacket::default();
            packet.set_android_log(log);
            self.doc.push_event(vec![(timestamp, packet)])?;
            report.parsed += 1;
            report.last_timestamp = Some(timestamp);
        }

        tracing::debug!("{}/{}: {}", process, track_name, report);
        Ok(report)
    }

    /// Append an AndroidLog stats packet summarizing one or more batches.
    pub fn emit_log_stats(&mut self, timestamp: i64, report: &LogBatchReport) -> Result<()> {
        let mut stats = Stats::default();
        stats.set_num_total((report.parsed + report.skipped) as u64);
        stats.set_num_failed(report.skipped as u64);
        stats.set_num_skipped(0);

        let mut log = AndroidLogPacket::default();
        log.stats = Some(stats).into();

        let mut packet = TracePacket::default();
        packet.set_android_log(log);
        self.doc.push_event(vec![(timestamp, packet)])
    }

    /// Append the clock snapshot, sealing the document.
    pub fn add_clock_snapshot(&mut self, timestamp: Option<i64>) -> Result<()> {
        self.doc.add_clock_snapshot(timestamp)
    }

    /// Seal the document if needed and hand it over.
    pub fn finish(mut self) -> Result<TraceDocument> {
        if !self.doc.is_sealed() {
            self.doc.add_clock_snapshot(None)?;
        }
        Ok(self.doc)
    }

    /// Seal and write the document to `path`.
    pub fn save(self, path: &Path) -> Result<()> {
        self.finish()?.save(path)
    }
}

impl Default for TraceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
