//! `$(path)` substitution and dot-path lookup against JSON records.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::error::TraceError;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\(([^)]+)\)").expect("Invalid placeholder regex pattern"));

/// Walk a dot-separated path (`psi_avg10.cpuSome`) through nested objects.
/// A `null` at the end of the path counts as missing.
pub fn get_nested_value<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Render a JSON value the way it should appear inside a substituted string:
/// strings without quotes, everything else in its JSON form.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replace every `$(path)` in `template` with the value found at `path` in
/// `record`. Missing paths are replaced by an empty string.
pub fn substitute(template: &str, record: &Value) -> String {
    if !template.contains("$(") {
        return template.to_string();
    }
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| {
            let path = &caps[1];
            match get_nested_value(record, path) {
                Some(value) => render_value(value),
                None => {
                    tracing::warn!(
                        "template {}: {}",
                        template,
                        TraceError::FieldNotFound(path.to_string())
                    );
                    String::new()
                }
            }
        })
        .into_owned()
}
