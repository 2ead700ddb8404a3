//! Error types for the trace builder.
//!
//! Per-event errors (`TimestampFormat`, `FieldNotFound`, `LogLineParse`,
//! `NegativeDuration`) are caught by the caller that owns the event, logged,
//! and the event is skipped. Document-level errors (`DocumentSealed`, `Io`,
//! `Encode`) and configuration errors (`UnsupportedTrackKind`) propagate.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TraceError>;

#[derive(Error, Debug)]
pub enum TraceError {
    #[error("unrecognized timestamp: {0}")]
    TimestampFormat(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("malformed log line: {0}")]
    LogLineParse(String),

    #[error("unsupported track kind: {0}")]
    UnsupportedTrackKind(String),

    #[error("negative span duration {duration_ns}ns for {name}")]
    NegativeDuration { name: String, duration_ns: i64 },

    #[error("trace document is sealed, no further packets may be appended")]
    DocumentSealed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode trace: {0}")]
    Encode(#[from] protobuf::Error),
}

impl TraceError {
    /// Returns true for errors that only affect a single event.
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            TraceError::TimestampFormat(_)
                | TraceError::FieldNotFound(_)
                | TraceError::LogLineParse(_)
                | TraceError::NegativeDuration { .. }
        )
    }
}
