//! Record filters applied before enrichment and writing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Record;

/// Keeps records whose numeric field has at least `threshold` magnitude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnitudeFilter {
    pub field: String,
    pub threshold: f64,
}

/// Keeps records whose string field is one of `values`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListFilter {
    pub field: String,
    pub values: Vec<String>,
}

/// Per-job record filter.
///
/// # Example
///
/// ```toml
/// [filter.min_magnitude]
/// field = "cost_impact"
/// threshold = 100.0
///
/// [filter.allow]
/// field = "anomaly_type"
/// values = ["SPIKE", "DROP"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    #[serde(default)]
    pub min_magnitude: Option<MagnitudeFilter>,
    #[serde(default)]
    pub allow: Option<AllowListFilter>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.min_magnitude.is_none() && self.allow.is_none()
    }

    /// Returns true if the record passes every configured predicate.
    ///
    /// A missing or non-numeric magnitude field counts as 0.
    pub fn matches(&self, record: &Record) -> bool {
        if let Some(min) = &self.min_magnitude {
            let value = record.get(&min.field).map(numeric).unwrap_or(0.0);
            if value.abs() < min.threshold {
                return false;
            }
        }

        if let Some(allow) = &self.allow {
            let Some(Value::String(value)) = record.get(&allow.field) else {
                return false;
            };
            if !allow.values.iter().any(|v| v == value) {
                return false;
            }
        }

        true
    }

    /// Splits records into kept records and the number filtered out.
    pub fn apply(&self, records: Vec<Record>) -> (Vec<Record>, usize) {
        if self.is_empty() {
            return (records, 0);
        }
        let total = records.len();
        let kept: Vec<Record> = records.into_iter().filter(|r| self.matches(r)).collect();
        let dropped = total - kept.len();
        (kept, dropped)
    }
}

fn numeric(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
