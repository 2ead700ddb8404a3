use serde_json::Value;

use super::{field_millis, Adapter};
use crate::record::{coerce_f64, StandardRecord};

const PROCESS_NAME: &str = "gfx";
const TRACK_NAME: &str = "total_duration";
const CATEGORY: &str = "gfx";

/// Frame timing: one slice per frame, ending at the report time.
pub struct GfxAdapter {
    timezone: String,
}

impl GfxAdapter {
    pub fn new(timezone: &str) -> Self {
        GfxAdapter {
            timezone: timezone.to_string(),
        }
    }
}

impl Adapter for GfxAdapter {
    fn data_type(&self) -> &'static str {
        "gfx"
    }

    fn to_standard(&self, raw: &[Value]) -> Vec<StandardRecord> {
        raw.iter()
            .filter_map(|item| {
                let end_ms = field_millis(item, "current_time_millis", &self.timezone);
                if end_ms.is_none() {
                    tracing::warn!("gfx frame without usable current_time_millis, skipping");
                }
                let duration_ms = item.get(TRACK_NAME).map_or(0.0, coerce_f64).max(0.0);
                let start_ms = end_ms?.saturating_sub(duration_ms as i64);
                Some(StandardRecord::slice(
                    PROCESS_NAME,
                    TRACK_NAME,
                    start_ms,
                    duration_ms,
                    CATEGORY,
                ))
            })
            .collect()
    }
}
