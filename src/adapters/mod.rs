//! Subsystem adapters: raw fetched records to `StandardRecord`s.

mod cpu_short;
mod gfx;

use serde_json::Value;

pub use cpu_short::CpuShortAdapter;
pub use gfx::GfxAdapter;

use crate::record::StandardRecord;
use crate::timestamp::{parse_datetime, parse_timezone, NANOS_PER_MILLI};

/// Converts the raw records of one data type.
pub trait Adapter {
    /// Data type name as used by the fetch endpoint.
    fn data_type(&self) -> &'static str;

    fn to_standard(&self, raw: &[Value]) -> Vec<StandardRecord>;
}

/// Data types with an adapter.
pub const SUPPORTED_TYPES: [&str; 2] = ["short", "gfx"];

/// Look up the adapter for `data_type`. `timezone` is the zone wall-clock
/// timestamps in the raw data are written in.
pub fn adapter_for(data_type: &str, timezone: &str) -> Option<Box<dyn Adapter>> {
    match data_type {
        "short" | "cpu_short" => Some(Box::new(CpuShortAdapter::new(timezone))),
        "gfx" => Some(Box::new(GfxAdapter::new(timezone))),
        _ => None,
    }
}

/// Read a timestamp field as epoch milliseconds. Numbers are taken as
/// milliseconds; strings as wall-clock time in `timezone`.
fn field_millis(record: &Value, field: &str, timezone: &str) -> Option<i64> {
    match record.get(field)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => match parse_datetime(s, parse_timezone(timezone)) {
            Ok(ns) => Some(ns / NANOS_PER_MILLI),
            Err(e) => {
                tracing::warn!("{}: {}", field, e);
                None
            }
        },
        _ => None,
    }
}
