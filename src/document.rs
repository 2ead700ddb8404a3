//! The in-memory trace document.
//!
//! Packets are appended in emission order and serialized as a Perfetto
//! `Trace`. Once the clock snapshot is appended the document is sealed and
//! rejects further packets.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;
use perfetto_protos::builtin_clock::BuiltinClock;
use perfetto_protos::clock_snapshot::clock_snapshot::Clock;
use perfetto_protos::clock_snapshot::ClockSnapshot;
use perfetto_protos::trace::Trace;
use perfetto_protos::trace_packet::TracePacket;
use perfetto_protos::track_descriptor::TrackDescriptor;
use protobuf::Message;

use crate::error::{Result, TraceError};

/// Clock ids written into the snapshot. All of them carry the same value;
/// the source time bases are treated as one canonical clock.
const SNAPSHOT_CLOCK_IDS: [BuiltinClock; 6] = [
    BuiltinClock::BUILTIN_CLOCK_REALTIME,
    BuiltinClock::BUILTIN_CLOCK_REALTIME_COARSE,
    BuiltinClock::BUILTIN_CLOCK_MONOTONIC,
    BuiltinClock::BUILTIN_CLOCK_MONOTONIC_COARSE,
    BuiltinClock::BUILTIN_CLOCK_MONOTONIC_RAW,
    BuiltinClock::BUILTIN_CLOCK_BOOTTIME,
];

/// Perfetto timestamps are unsigned; anything before the epoch is pinned to 0.
pub fn to_trace_ts(ts: i64) -> u64 {
    ts.max(0) as u64
}

pub struct TraceDocument {
    trace: Trace,
    sequence_id: u32,
    sealed: bool,
    min_ts: Option<i64>,
}

impl TraceDocument {
    pub fn new(sequence_id: u32) -> Self {
        TraceDocument {
            trace: Trace::default(),
            sequence_id,
            sealed: false,
            min_ts: None,
        }
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn packets(&self) -> &[TracePacket] {
        &self.trace.packet
    }

    pub fn len(&self) -> usize {
        self.trace.packet.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.packet.is_empty()
    }

    /// Earliest event timestamp appended so far.
    pub fn min_timestamp(&self) -> Option<i64> {
        self.min_ts
    }

    fn check_open(&self) -> Result<()> {
        if self.sealed {
            return Err(TraceError::DocumentSealed);
        }
        Ok(())
    }

    pub fn push_descriptor(&mut self, desc: TrackDescriptor) -> Result<()> {
        self.check_open()?;
        let mut packet = TracePacket::default();
        packet.set_track_descriptor(desc);
        packet.set_trusted_packet_sequence_id(self.sequence_id);
        self.trace.packet.push(packet);
        Ok(())
    }

    /// Append the packets of one event. Either all of them are appended or,
    /// if the document is sealed, none.
    pub fn push_event(&mut self, packets: Vec<(i64, TracePacket)>) -> Result<()> {
        self.check_open()?;
        for (ts, mut packet) in packets {
            packet.set_timestamp(to_trace_ts(ts));
            packet.set_trusted_packet_sequence_id(self.sequence_id);
            self.min_ts = Some(self.min_ts.map_or(ts, |min| min.min(ts)));
            self.trace.packet.push(packet);
        }
        Ok(())
    }

    /// Append the clock snapshot and seal the document.
    ///
    /// Without an explicit reference instant the earliest event timestamp is
    /// used, or the current wall-clock time for an empty document.
    pub fn add_clock_snapshot(&mut self, timestamp: Option<i64>) -> Result<()> {
        self.check_open()?;
        let ts = timestamp
            .or(self.min_ts)
            .unwrap_or_else(|| Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let ts = to_trace_ts(ts);

        let mut snapshot = ClockSnapshot::default();
        snapshot.set_primary_trace_clock(BuiltinClock::BUILTIN_CLOCK_BOOTTIME);
        for clock_id in SNAPSHOT_CLOCK_IDS {
            let mut clock = Clock::default();
            clock.set_clock_id(clock_id as u32);
            clock.set_timestamp(ts);
            snapshot.clocks.push(clock);
        }

        let mut packet = TracePacket::default();
        packet.set_timestamp(ts);
        packet.set_trusted_packet_sequence_id(self.sequence_id);
        packet.set_clock_snapshot(snapshot);
        self.trace.packet.push(packet);
        self.sealed = true;
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.trace.write_to_bytes()?)
    }

    pub fn write_to(&self, writer: &mut dyn Write) -> Result<()> {
        self.trace.write_to_writer(writer)?;
        Ok(())
    }

    /// Serialize the whole document to `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        if !self.sealed {
            tracing::warn!(
                "writing {} without a clock snapshot, timestamps may be misinterpreted",
                path.display()
            );
        }
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        tracing::info!("Wrote {} trace packets to {}", self.len(), path.display());
        Ok(())
    }
}
