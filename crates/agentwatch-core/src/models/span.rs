//! Performance span data model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::elapsed_ms;

/// A named, timed operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSpan {
    /// Trace id handed out by `start_trace`
    pub trace_id: String,

    /// Name of the operation
    pub name: String,

    /// Grouping key for thresholds and statistics
    pub category: String,

    /// When the operation started
    pub start_time: DateTime<Utc>,

    /// When the operation ended (if completed)
    pub end_time: Option<DateTime<Utc>>,

    /// Duration in milliseconds
    pub duration_ms: Option<f64>,

    /// Free-form attributes; carries `request_id` and, once ended, `success`
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Trace id of the enclosing span (informational only)
    pub parent: Option<String>,
}

impl PerformanceSpan {
    /// Stamp the end time and derive the duration
    pub fn complete(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration_ms = Some(elapsed_ms(self.start_time, end_time));
    }

    /// Correlated request id, if one was given
    pub fn request_id(&self) -> Option<&str> {
        self.metadata.get("request_id").and_then(|v| v.as_str())
    }

    /// Outcome recorded by `end_trace`
    pub fn success(&self) -> Option<bool> {
        self.metadata.get("success").and_then(|v| v.as_bool())
    }
}

/// Aggregated latency statistics for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Completed spans
    pub count: usize,
    /// Mean duration
    pub average_ms: f64,
    /// Median duration
    pub median_ms: f64,
    /// Absent below 20 samples
    pub p95_ms: Option<f64>,
    /// Shortest duration
    pub min_ms: f64,
    /// Longest duration
    pub max_ms: f64,
    /// Configured threshold, if any
    pub threshold_ms: Option<f64>,
    /// Samples above the threshold
    pub threshold_exceeded_count: usize,
}

/// Persisted performance artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    /// Snapshot time
    pub timestamp: DateTime<Utc>,
    /// Statistics per category
    pub metrics: BTreeMap<String, CategoryStats>,
    /// Archived spans per category
    pub traces: BTreeMap<String, Vec<PerformanceSpan>>,
}
