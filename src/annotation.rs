//! Typed key/value annotations attached to instants and span begins.

use std::fmt;

use perfetto_protos::debug_annotation::DebugAnnotation;
use serde_json::Value;

/// Name of the dictionary annotation that holds all entries of one event.
pub const ARGS_ANNOTATION: &str = "args";

/// Annotation value. Anything that is not a string, integer, float or bool
/// is carried as `Other` and written as its string rendering.
#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Other(String),
}

impl AnnotationValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => AnnotationValue::String(s.clone()),
            Value::Bool(b) => AnnotationValue::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AnnotationValue::Int(i)
                } else if n.is_f64() {
                    AnnotationValue::Float(n.as_f64().unwrap_or_default())
                } else {
                    AnnotationValue::Other(n.to_string())
                }
            }
            other => AnnotationValue::Other(other.to_string()),
        }
    }

    fn apply(&self, ann: &mut DebugAnnotation) {
        match self {
            AnnotationValue::String(s) => ann.set_string_value(s.clone()),
            AnnotationValue::Int(i) => ann.set_int_value(*i),
            AnnotationValue::Float(f) => ann.set_double_value(*f),
            AnnotationValue::Bool(b) => ann.set_bool_value(*b),
            AnnotationValue::Other(s) => ann.set_string_value(s.clone()),
        }
    }
}

impl fmt::Display for AnnotationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationValue::String(s) | AnnotationValue::Other(s) => f.write_str(s),
            AnnotationValue::Int(i) => write!(f, "{i}"),
            AnnotationValue::Float(v) => write!(f, "{v}"),
            AnnotationValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for AnnotationValue {
    fn from(v: &str) -> Self {
        AnnotationValue::String(v.to_string())
    }
}

impl From<String> for AnnotationValue {
    fn from(v: String) -> Self {
        AnnotationValue::String(v)
    }
}

impl From<i64> for AnnotationValue {
    fn from(v: i64) -> Self {
        AnnotationValue::Int(v)
    }
}

impl From<f64> for AnnotationValue {
    fn from(v: f64) -> Self {
        AnnotationValue::Float(v)
    }
}

impl From<bool> for AnnotationValue {
    fn from(v: bool) -> Self {
        AnnotationValue::Bool(v)
    }
}

/// Ordered annotation entries of one event.
pub type Annotations = Vec<(String, AnnotationValue)>;

/// Build the `args` dictionary annotation holding every entry.
pub fn args_annotation(entries: &[(String, AnnotationValue)]) -> DebugAnnotation {
    let mut args = DebugAnnotation::default();
    args.set_name(ARGS_ANNOTATION.to_string());
    for (key, value) in entries {
        let mut entry = DebugAnnotation::default();
        entry.set_name(key.clone());
        value.apply(&mut entry);
        args.dict_entries.push(entry);
    }
    args
}
