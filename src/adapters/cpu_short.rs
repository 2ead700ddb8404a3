use serde_json::Value;

use super::{field_millis, Adapter};
use crate::record::{coerce_f64, StandardRecord};

const PROCESS_NAME: &str = "cpu_short_30s";
const CATEGORY: &str = "cpu_short";
const FIELDS: [&str; 6] = ["soft_irq", "total", "kernel", "irq", "nice", "user"];

/// Each sample covers the 30 seconds before its collect time.
const SAMPLE_WINDOW_MS: i64 = 30_000;

/// Short-interval CPU usage: one counter per usage field.
pub struct CpuShortAdapter {
    timezone: String,
}

impl CpuShortAdapter {
    pub fn new(timezone: &str) -> Self {
        CpuShortAdapter {
            timezone: timezone.to_string(),
        }
    }
}

impl Adapter for CpuShortAdapter {
    fn data_type(&self) -> &'static str {
        "short"
    }

    fn to_standard(&self, raw: &[Value]) -> Vec<StandardRecord> {
        let mut records = Vec::with_capacity(raw.len() * FIELDS.len());
        for item in raw {
            let Some(collect_ms) = field_millis(item, "collect_time", &self.timezone) else {
                tracing::warn!("cpu_short sample without usable collect_time, skipping");
                continue;
            };
            let ts = collect_ms.saturating_sub(SAMPLE_WINDOW_MS);
            for field in FIELDS {
                let value = item.get(field).map_or(0.0, coerce_f64);
                records.push(StandardRecord::counter(PROCESS_NAME, field, ts, value, CATEGORY));
            }
        }
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_one_counter_per_field() {
        let adapter = CpuShortAdapter::new("+0800");
        let raw = vec![json!({
            "collect_time": "2025-02-06 21:40:44",
            "soft_irq": 1.0, "total": 42.5, "kernel": "3", "irq": 0, "user": 30
        })];
        let records = adapter.to_standard(&raw);
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.process_name == PROCESS_NAME));
        assert!(records.iter().all(|r| r.category == CATEGORY));
        assert!(records.iter().all(|r| r.timestamp == 1_738_849_214_000));

        let by_track: Vec<(&str, f64)> = records
            .iter()
            .map(|r| (r.track_name.as_str(), coerce_f64(&r.value)))
            .collect();
        assert_eq!(
            by_track,
            vec![
                ("soft_irq", 1.0),
                ("total", 42.5),
                ("kernel", 3.0),
                ("irq", 0.0),
                ("nice", 0.0),
                ("user", 30.0),
            ]
        );
    }

    #[test]
    fn test_sample_without_time_is_dropped() {
        let adapter = CpuShortAdapter::new("+0800");
        let records = adapter.to_standard(&[json!({"total": 1}), json!({"collect_time": 60_000})]);
        assert_eq!(records.len(), 6);
        assert_eq!(records[0].timestamp, 30_000);
    }

    #[test]
    fn test_extreme_collect_time_saturates() {
        let adapter = CpuShortAdapter::new("+0800");
        let records = adapter.to_standard(&[json!({"collect_time": i64::MIN, "total": 1})]);
        assert_eq!(records.len(), 6);
        assert!(records.iter().all(|r| r.timestamp == i64::MIN));
    }
}
