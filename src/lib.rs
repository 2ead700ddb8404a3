pub mod adapters;
pub mod annotation;
pub mod builder;
pub mod document;
pub mod error;
pub mod fetch;
pub mod flow;
pub mod ids;
pub mod logline;
pub mod mapper;
pub mod merge;
pub mod output;
pub mod record;
pub mod timestamp;
pub mod track;

pub use annotation::AnnotationValue;
pub use builder::{BuilderOptions, LogBatchReport, TraceBuilder};
pub use document::TraceDocument;
pub use error::{Result, TraceError};
pub use mapper::TrackConfig;
pub use record::{ConversionReport, StandardRecord};
pub use timestamp::TimestampUnit;
pub use track::TrackKind;
