//! Timestamp normalization onto the canonical nanosecond clock.
//!
//! Telemetry sources report time in whatever shape they like: epoch seconds,
//! epoch milliseconds, nanoseconds, or naive wall-clock strings. Everything
//! is converted to absolute nanoseconds since the Unix epoch here.
//!
//! Two branches exist and they do not treat timezones the same way:
//!
//! - Numeric values are taken as absolute epoch values. The timezone is
//!   ignored; only the additive offset applies.
//! - Date-time strings are naive wall-clock times. They are interpreted in
//!   the given timezone, then the offset is added.

use chrono::{FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, TraceError};

/// Accepted layouts for string timestamps, tried in order.
const DATETIME_LAYOUTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

pub const NANOS_PER_SEC: i64 = 1_000_000_000;
pub const NANOS_PER_MILLI: i64 = 1_000_000;

/// Unit of a numeric timestamp.
///
/// `Auto` infers the unit from the magnitude of the value:
///
/// | magnitude        | unit         |
/// |------------------|--------------|
/// | `> 1e15`         | picoseconds  |
/// | `(1e12, 1e15]`   | nanoseconds  |
/// | `(1e9, 1e12]`    | microseconds |
/// | `(1e6, 1e9]`     | milliseconds |
/// | otherwise        | seconds      |
///
/// The bands are kept exactly as the upstream tooling has always applied
/// them, even though present-day epoch seconds (~1.7e9) land in the
/// microsecond band and epoch milliseconds (~1.7e12) in the nanosecond band.
/// Sources with a known unit should say so explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimestampUnit {
    #[default]
    Auto,
    #[serde(alias = "s", alias = "sec")]
    Seconds,
    #[serde(alias = "ms")]
    Millis,
    #[serde(alias = "us")]
    Micros,
    #[serde(alias = "ns")]
    Nanos,
    #[serde(alias = "ps")]
    Picos,
}

impl TimestampUnit {
    fn infer_f64(value: f64) -> Self {
        if value > 1e15 {
            TimestampUnit::Picos
        } else if value > 1e12 {
            TimestampUnit::Nanos
        } else if value > 1e9 {
            TimestampUnit::Micros
        } else if value > 1e6 {
            TimestampUnit::Millis
        } else {
            TimestampUnit::Seconds
        }
    }

    fn resolve_f64(self, value: f64) -> Self {
        match self {
            TimestampUnit::Auto => Self::infer_f64(value),
            unit => unit,
        }
    }

    fn resolve_i64(self, value: i64) -> Self {
        match self {
            TimestampUnit::Auto => {
                if value > 1_000_000_000_000_000 {
                    TimestampUnit::Picos
                } else if value > 1_000_000_000_000 {
                    TimestampUnit::Nanos
                } else if value > 1_000_000_000 {
                    TimestampUnit::Micros
                } else if value > 1_000_000 {
                    TimestampUnit::Millis
                } else {
                    TimestampUnit::Seconds
                }
            }
            unit => unit,
        }
    }
}

/// A raw timestamp value as it appears in an input record.
#[derive(Clone, Debug, PartialEq)]
pub enum RawTimestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawTimestamp {
    /// Extract a timestamp from a JSON value. `null`, arrays and objects
    /// yield `None`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(RawTimestamp::Int(i))
                } else {
                    n.as_f64().map(RawTimestamp::Float)
                }
            }
            Value::String(s) => Some(RawTimestamp::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<i64> for RawTimestamp {
    fn from(v: i64) -> Self {
        RawTimestamp::Int(v)
    }
}

impl From<f64> for RawTimestamp {
    fn from(v: f64) -> Self {
        RawTimestamp::Float(v)
    }
}

impl From<&str> for RawTimestamp {
    fn from(v: &str) -> Self {
        RawTimestamp::Text(v.to_string())
    }
}

/// Normalize `raw` to absolute nanoseconds.
///
/// `timezone` is a signed `HHMM` string (e.g. `+0800`) and only affects
/// string timestamps. `offset` is a signed duration such as `-30s` or
/// `+250ms`, added after timezone resolution for both branches.
pub fn normalize(
    raw: &RawTimestamp,
    unit: TimestampUnit,
    timezone: &str,
    offset: Option<&str>,
) -> Result<i64> {
    let ts = match raw {
        RawTimestamp::Int(v) => scale_i64(*v, unit.resolve_i64(*v)),
        RawTimestamp::Float(v) => scale_f64(*v, unit.resolve_f64(*v)),
        RawTimestamp::Text(s) => parse_datetime(s, parse_timezone(timezone))?,
    };

    match offset {
        Some(offset) => Ok(ts.saturating_add(parse_offset(offset)?)),
        None => Ok(ts),
    }
}

fn scale_i64(value: i64, unit: TimestampUnit) -> i64 {
    match unit {
        TimestampUnit::Picos => value / 1_000,
        TimestampUnit::Nanos => value,
        TimestampUnit::Micros => value.saturating_mul(1_000),
        TimestampUnit::Millis => value.saturating_mul(NANOS_PER_MILLI),
        TimestampUnit::Seconds | TimestampUnit::Auto => value.saturating_mul(NANOS_PER_SEC),
    }
}

fn scale_f64(value: f64, unit: TimestampUnit) -> i64 {
    let scaled = match unit {
        TimestampUnit::Picos => value / 1_000.0,
        TimestampUnit::Nanos => value,
        TimestampUnit::Micros => value * 1_000.0,
        TimestampUnit::Millis => value * NANOS_PER_MILLI as f64,
        TimestampUnit::Seconds | TimestampUnit::Auto => value * NANOS_PER_SEC as f64,
    };
    scaled as i64
}

/// Parse a signed `HHMM` timezone. Anything unparsable falls back to UTC.
pub fn parse_timezone(timezone: &str) -> FixedOffset {
    let utc = Utc.fix();

    let sign = match timezone.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return utc,
    };

    let hours = timezone.get(1..3).and_then(|h| h.parse::<i32>().ok());
    let mins = timezone.get(3..5).and_then(|m| m.parse::<i32>().ok());
    match (hours, mins) {
        (Some(h), Some(m)) => {
            FixedOffset::east_opt(sign * (h * 3600 + m * 60)).unwrap_or_else(|| {
                tracing::warn!("timezone {} out of range, using UTC", timezone);
                utc
            })
        }
        _ => {
            tracing::warn!("malformed timezone {}, using UTC", timezone);
            utc
        }
    }
}

/// Parse a naive date-time string as wall-clock time in `tz`.
pub fn parse_datetime(text: &str, tz: FixedOffset) -> Result<i64> {
    let text = text.trim();
    let naive = DATETIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .ok_or_else(|| TraceError::TimestampFormat(text.to_string()))?;

    tz.from_local_datetime(&naive)
        .single()
        .and_then(|dt| dt.timestamp_nanos_opt())
        .ok_or_else(|| TraceError::TimestampFormat(text.to_string()))
}

/// Parse a signed offset like `-30s`, `+1.5s` or `250ms` into nanoseconds.
///
/// An empty string is a zero offset.
pub fn parse_offset(offset: &str) -> Result<i64> {
    let offset = offset.trim();
    if offset.is_empty() {
        return Ok(0);
    }

    let (sign, body) = match offset.as_bytes()[0] {
        b'-' => (-1.0, &offset[1..]),
        b'+' => (1.0, &offset[1..]),
        _ => (1.0, offset),
    };

    let (number, scale) = if let Some(ms) = body.strip_suffix("ms") {
        (ms, NANOS_PER_MILLI as f64)
    } else if let Some(s) = body.strip_suffix('s') {
        (s, NANOS_PER_SEC as f64)
    } else {
        return Err(TraceError::TimestampFormat(format!(
            "offset {offset} has no s/ms unit"
        )));
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| TraceError::TimestampFormat(format!("offset {offset}")))?;
    Ok((sign * value * scale) as i64)
}
