//! Parser for logcat-style text lines.
//!
//! Layout: `YYYY-MM-DD HH:MM:SS.mmm <pid> <tid> <LEVEL> <tag>: <message>`

use std::sync::LazyLock;

use chrono::FixedOffset;
use perfetto_protos::android_log_constants::AndroidLogPriority;
use regex::Regex;

use crate::error::{Result, TraceError};
use crate::timestamp::parse_datetime;

static LOG_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}\.\d{3})\s+(\d+)\s+(\d+)\s+([VDIWEF])\s+(.*?): (.*)$",
    )
    .expect("Invalid log line regex pattern")
});

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Verbose,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "V" => Some(LogLevel::Verbose),
            "D" => Some(LogLevel::Debug),
            "I" => Some(LogLevel::Info),
            "W" => Some(LogLevel::Warn),
            "E" => Some(LogLevel::Error),
            "F" => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    pub fn priority(&self) -> AndroidLogPriority {
        match self {
            LogLevel::Verbose => AndroidLogPriority::PRIO_VERBOSE,
            LogLevel::Debug => AndroidLogPriority::PRIO_DEBUG,
            LogLevel::Info => AndroidLogPriority::PRIO_INFO,
            LogLevel::Warn => AndroidLogPriority::PRIO_WARN,
            LogLevel::Error => AndroidLogPriority::PRIO_ERROR,
            LogLevel::Fatal => AndroidLogPriority::PRIO_FATAL,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogLine {
    pub timestamp: i64,
    pub pid: i32,
    pub tid: i32,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
}

/// Parse one line. The date is wall-clock time in `tz`.
pub fn parse_log_line(line: &str, tz: FixedOffset) -> Result<LogLine> {
    let line = line.trim_end_matches(['\r', '\n']);
    let malformed = || TraceError::LogLineParse(line.to_string());

    let caps = LOG_LINE_RE.captures(line).ok_or_else(malformed)?;
    let timestamp = parse_datetime(&caps[1], tz)?;
    let pid = caps[2].parse::<i32>().map_err(|_| malformed())?;
    let tid = caps[3].parse::<i32>().map_err(|_| malformed())?;
    let level = LogLevel::from_token(&caps[4]).ok_or_else(malformed)?;

    Ok(LogLine {
        timestamp,
        pid,
        tid,
        level,
        tag: caps[5].to_string(),
        message: caps[6].to_string(),
    })
}
