//! Shared helpers for decoding written trace files.

#![allow(dead_code)]

use std::path::Path;

use perfetto_protos::trace::Trace;
use perfetto_protos::trace_packet::trace_packet::Data;
use perfetto_protos::track_event::TrackEvent;
use protobuf::Message;

/// Read and decode a trace file.
pub fn read_trace(path: &Path) -> Trace {
    let bytes = std::fs::read(path).expect("Failed to read trace file");
    Trace::parse_from_bytes(&bytes).expect("Failed to decode trace")
}

/// Track events with their packet timestamps, in document order.
pub fn track_events(trace: &Trace) -> Vec<(u64, TrackEvent)> {
    trace
        .packet
        .iter()
        .filter_map(|p| match p.data {
            Some(Data::TrackEvent(ref e)) => Some((p.timestamp(), e.clone())),
            _ => None,
        })
        .collect()
}

/// Number of TrackDescriptor packets.
pub fn descriptor_count(trace: &Trace) -> usize {
    trace
        .packet
        .iter()
        .filter(|p| matches!(p.data, Some(Data::TrackDescriptor(_))))
        .count()
}

/// Names of all process tracks.
pub fn process_names(trace: &Trace) -> Vec<String> {
    trace
        .packet
        .iter()
        .filter_map(|p| match p.data {
            Some(Data::TrackDescriptor(ref td)) if td.process.is_some() => {
                Some(td.process.process_name().to_string())
            }
            _ => None,
        })
        .collect()
}

/// Assert the trace ends with a clock snapshot and return its timestamp.
pub fn snapshot_timestamp(trace: &Trace) -> u64 {
    let last = trace.packet.last().expect("Trace is empty");
    match last.data {
        Some(Data::ClockSnapshot(_)) => last.timestamp(),
        _ => panic!("Expected trailing ClockSnapshot packet"),
    }
}
