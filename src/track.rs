//! Track hierarchy: one process track per process name, with typed child
//! tracks underneath it.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use perfetto_protos::counter_descriptor::counter_descriptor::Unit;
use perfetto_protos::counter_descriptor::CounterDescriptor;
use perfetto_protos::process_descriptor::ProcessDescriptor;
use perfetto_protos::track_descriptor::TrackDescriptor;
use serde::{Deserialize, Serialize};

use crate::document::TraceDocument;
use crate::error::{Result, TraceError};
use crate::ids::IdAllocator;

/// First pid handed out to processes that do not bring their own.
pub const AUTO_PID_START: i32 = 10000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Instant,
    Slice,
    Counter,
    Log,
}

impl TrackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackKind::Instant => "instant",
            TrackKind::Slice => "slice",
            TrackKind::Counter => "counter",
            TrackKind::Log => "log",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "instant" | "event" => Ok(TrackKind::Instant),
            "slice" => Ok(TrackKind::Slice),
            "counter" => Ok(TrackKind::Counter),
            "log" => Ok(TrackKind::Log),
            _ => Err(TraceError::UnsupportedTrackKind(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessTrack {
    pub pid: i32,
    pub uuid: u64,
}

/// Memoizing cache of track identifiers.
///
/// The first request for a process or a (process, kind, name) triple appends
/// its `TrackDescriptor` to the document; later requests return the cached
/// uuid and append nothing.
pub struct TrackRegistry {
    processes: HashMap<String, ProcessTrack>,
    tracks: HashMap<(String, TrackKind, String), u64>,
    next_pid: i32,
}

impl TrackRegistry {
    pub fn new() -> Self {
        TrackRegistry {
            processes: HashMap::new(),
            tracks: HashMap::new(),
            next_pid: AUTO_PID_START,
        }
    }

    pub fn ensure_process(
        &mut self,
        name: &str,
        pid: Option<i32>,
        ids: &mut IdAllocator,
        doc: &mut TraceDocument,
    ) -> Result<ProcessTrack> {
        if let Some(process) = self.processes.get(name) {
            return Ok(*process);
        }

        let pid = match pid {
            Some(pid) if pid != 0 => pid,
            _ => {
                let pid = self.next_pid;
                self.next_pid += 1;
                pid
            }
        };
        let uuid = ids.next_id();

        let mut process = ProcessDescriptor::default();
        process.set_pid(pid);
        process.set_process_name(name.to_string());

        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        desc.process = Some(process).into();
        doc.push_descriptor(desc)?;

        tracing::debug!("created process track {} (pid {})", name, pid);
        let track = ProcessTrack { pid, uuid };
        self.processes.insert(name.to_string(), track);
        Ok(track)
    }

    pub fn ensure_track(
        &mut self,
        process_name: &str,
        kind: TrackKind,
        track_name: &str,
        pid: Option<i32>,
        ids: &mut IdAllocator,
        doc: &mut TraceDocument,
    ) -> Result<u64> {
        let key = (process_name.to_string(), kind, track_name.to_string());
        if let Some(uuid) = self.tracks.get(&key) {
            return Ok(*uuid);
        }

        let process = self.ensure_process(process_name, pid, ids, doc)?;
        let uuid = ids.next_id();

        let mut desc = TrackDescriptor::default();
        desc.set_uuid(uuid);
        desc.set_parent_uuid(process.uuid);
        desc.set_name(track_name.to_string());
        if kind == TrackKind::Counter {
            let mut counter = CounterDescriptor::default();
            counter.set_unit(Unit::UNIT_COUNT);
            desc.counter = Some(counter).into();
        }
        doc.push_descriptor(desc)?;

        self.tracks.insert(key, uuid);
        Ok(uuid)
    }

    pub fn process(&self, name: &str) -> Option<ProcessTrack> {
        self.processes.get(name).copied()
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
