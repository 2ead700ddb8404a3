//! End-to-end tests: build documents through the public API, write them to
//! disk and decode them back.

mod common;

use std::collections::HashSet;

use perfetto_protos::track_event::track_event::Type;
use serde_json::json;
use tempfile::TempDir;

use common::{descriptor_count, process_names, read_trace, snapshot_timestamp, track_events};
use tracegen::adapters::adapter_for;
use tracegen::mapper::ConfigFile;
use tracegen::timestamp::{normalize, RawTimestamp, NANOS_PER_SEC};
use tracegen::{BuilderOptions, TimestampUnit, TraceBuilder, TraceError, TrackConfig, TrackKind};

fn builder() -> TraceBuilder {
    TraceBuilder::with_options(BuilderOptions {
        seed: Some(2024),
        ..Default::default()
    })
}

#[test]
fn test_counter_trace_round_trip() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("counter.perfetto");

    let mut b = builder();
    b.emit_counter("vehicle", "speed", "speed", 1_000, 10.0, "can", None)
        .unwrap();
    b.emit_counter("vehicle", "speed", "speed", 2_000, 20.0, "can", None)
        .unwrap();
    let seq = b.sequence_id();
    b.save(&path).unwrap();

    let trace = read_trace(&path);
    // process + counter track
    assert_eq!(descriptor_count(&trace), 2);
    let events = track_events(&trace);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, 1_000);
    assert_eq!(events[0].1.type_(), Type::TYPE_COUNTER);
    assert_eq!(events[0].1.double_counter_value(), 10.0);
    assert_eq!(events[1].0, 2_000);
    assert_eq!(events[1].1.double_counter_value(), 20.0);
    assert_eq!(snapshot_timestamp(&trace), 1_000);
    assert!(trace
        .packet
        .iter()
        .all(|p| p.trusted_packet_sequence_id() == seq));
}

#[test]
fn test_spans_and_flows_survive_serialization() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("spans.perfetto");

    let mut b = builder();
    b.emit_span("ivi", "boot", "init", 100, 900, "boot", Some("boot-seq"), &[], None)
        .unwrap();
    b.emit_instant("ivi", "marks", "ready", 1_000, "boot", Some("boot-seq"), &[], None)
        .unwrap();
    b.emit_instant("ivi", "marks", "idle", 1_100, "boot", None, &[], None)
        .unwrap();
    b.emit_span("ivi", "boot", "noop", 2_000, 0, "boot", None, &[], None)
        .unwrap();
    b.save(&path).unwrap();

    let events = track_events(&read_trace(&path));
    assert_eq!(events.len(), 6);
    let (begin_ts, begin) = &events[0];
    let (end_ts, end) = &events[1];
    assert_eq!(begin.type_(), Type::TYPE_SLICE_BEGIN);
    assert_eq!(end.type_(), Type::TYPE_SLICE_END);
    assert_eq!(*end_ts, begin_ts + 900);

    assert_eq!(begin.flow_ids.len(), 1);
    assert_eq!(begin.flow_ids, events[2].1.flow_ids);
    assert!(events[3].1.flow_ids.is_empty());

    assert_eq!(events[4].0, events[5].0);
}

#[test]
fn test_track_ids_are_unique() {
    let mut b = builder();
    let mut uuids = HashSet::new();
    for process in ["a", "b"] {
        for kind in [
            TrackKind::Counter,
            TrackKind::Instant,
            TrackKind::Slice,
            TrackKind::Log,
        ] {
            let uuid = b.ensure_track(process, kind, "t", None).unwrap();
            assert!(uuids.insert(uuid));
            assert_eq!(b.ensure_track(process, kind, "t", None).unwrap(), uuid);
        }
    }
    // 2 processes + 8 tracks
    assert_eq!(b.document().len(), 10);
}

#[test]
fn test_sealed_document_rejects_events() {
    let mut b = builder();
    b.emit_counter("p", "t", "t", 1, 1.0, "c", None).unwrap();
    b.add_clock_snapshot(None).unwrap();
    let before = b.document().len();
    let err = b.emit_counter("p", "t", "t", 2, 1.0, "c", None).unwrap_err();
    assert!(matches!(err, TraceError::DocumentSealed));
    assert_eq!(b.document().len(), before);
}

#[test]
fn test_numeric_normalization_is_monotonic() {
    for unit in [
        TimestampUnit::Seconds,
        TimestampUnit::Millis,
        TimestampUnit::Micros,
        TimestampUnit::Nanos,
    ] {
        let mut last = i64::MIN;
        for v in [0i64, 1, 2, 1_000, 1_738_849_184, 1_738_849_185] {
            let ts = normalize(&RawTimestamp::Int(v), unit, "+0000", None).unwrap();
            assert!(ts >= last, "{:?} not monotonic at {}", unit, v);
            last = ts;
        }
    }
}

#[test]
fn test_string_timestamp_with_timezone_and_offset() {
    let ts = normalize(
        &RawTimestamp::from("2025-02-06 21:40:14"),
        TimestampUnit::Auto,
        "+0800",
        Some("-30s"),
    )
    .unwrap();
    // 2025-02-06T13:40:14Z minus 30 seconds
    assert_eq!(ts, 1_738_849_214 * NANOS_PER_SEC - 30 * NANOS_PER_SEC);
}

#[test]
fn test_log_lines_round_trip() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("log.perfetto");

    let mut b = builder();
    let report = b
        .emit_log(
            "ivi",
            "logcat",
            &[
                "2024-06-01 12:00:00.000 1234 5 I Tag: hello",
                "2024-06-01 12:00:00.000 1234 5 Tag: hello",
            ],
            None,
        )
        .unwrap();
    assert_eq!(report.parsed, 1);
    assert_eq!(report.skipped, 1);
    b.save(&path).unwrap();

    let trace = read_trace(&path);
    let logs: Vec<_> = trace
        .packet
        .iter()
        .filter(|p| p.has_android_log())
        .collect();
    assert_eq!(logs.len(), 1);
    let event = &logs[0].android_log().events[0];
    assert_eq!(event.pid(), 1234);
    assert_eq!(event.tid(), 5);
    assert_eq!(event.tag(), "Tag");
    assert_eq!(event.message(), "hello");
}

#[test]
fn test_config_driven_trace() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("tracks.json");
    std::fs::write(
        &config_path,
        json!({
            "cpu_usage_30s": [
                {"field": "total", "type": "counter", "offset": "-30s"},
                {"field": "user", "type": "counter", "offset": "-30s"}
            ],
            "psi_avg10": [
                {"field": "psi_avg10.cpuSome", "type": "counter", "tname": "cpuSome"}
            ]
        })
        .to_string(),
    )
    .unwrap();
    let configs = ConfigFile::load(&config_path).unwrap().into_map("unused");

    let records = vec![
        json!({"collect_time": "2025-02-06 21:40:44", "total": 40, "user": 25, "psi_avg10": {"cpuSome": 1.5}}),
        json!({"collect_time": "2025-02-06 21:41:14", "total": 42, "user": 26, "psi_avg10": {"cpuSome": 1.1}}),
    ];

    let mut b = builder();
    let report = b.apply_all(&records, &configs).unwrap();
    assert_eq!(report.get("counter").input, 6);
    assert_eq!(report.get("counter").converted, 6);

    let path = dir.path().join("mapped.perfetto");
    b.save(&path).unwrap();
    let trace = read_trace(&path);

    let mut names = process_names(&trace);
    names.sort();
    assert_eq!(names, vec!["cpu_usage_30s", "psi_avg10"]);
    // 2 processes + 3 counter tracks
    assert_eq!(descriptor_count(&trace), 5);
    assert_eq!(snapshot_timestamp(&trace), 1_738_849_214 * NANOS_PER_SEC as u64);
}

#[test]
fn test_unknown_track_kind_is_a_config_error() {
    let mut config = TrackConfig::new("total", TrackKind::Counter);
    config.kind = "gauge".into();
    let mut b = builder();
    let err = b.apply("cpu", &[json!({"total": 1})], &[config]).unwrap_err();
    assert!(matches!(err, TraceError::UnsupportedTrackKind(_)));
}

#[test]
fn test_adapters_feed_ingestion() {
    let mut b = builder();
    let cpu = adapter_for("short", "+0800").unwrap();
    let gfx = adapter_for("gfx", "+0800").unwrap();

    let cpu_records = cpu.to_standard(&[json!({
        "collect_time": "2025-02-06 21:40:44",
        "soft_irq": 0.5, "total": 40, "kernel": 10, "irq": 0.1, "nice": 0, "user": 25
    })]);
    let gfx_records = gfx.to_standard(&[json!({
        "current_time_millis": 1_738_849_214_016i64,
        "total_duration": 16
    })]);

    let mut report = b.ingest_standard(&cpu_records).unwrap();
    report.merge(&b.ingest_standard(&gfx_records).unwrap());
    assert_eq!(report.get("counter").converted, 6);
    assert_eq!(report.get("slice").converted, 1);

    let doc = b.finish().unwrap();
    let events: Vec<_> = doc
        .packets()
        .iter()
        .filter(|p| p.has_track_event())
        .map(|p| (p.timestamp(), p.track_event().type_()))
        .collect();
    assert_eq!(events.len(), 8);
    // cpu samples are shifted back by their 30 s window
    assert_eq!(events[0].0, 1_738_849_214 * NANOS_PER_SEC as u64);
    assert_eq!(events[6], (1_738_849_214_000_000_000, Type::TYPE_SLICE_BEGIN));
    assert_eq!(events[7], (1_738_849_214_016_000_000, Type::TYPE_SLICE_END));
}
