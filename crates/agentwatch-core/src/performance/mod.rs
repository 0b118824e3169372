//! Named-span performance tracking
//!
//! Spans are opened with [`PerformanceTracker::start_trace`], closed with
//! [`PerformanceTracker::end_trace`] and then archived per category in a
//! bounded history. Every completed span is checked against its category's
//! latency threshold; a breach is logged as a warning.

mod writer;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bounded::BoundedPush;
use crate::config::PerformanceConfig;
use crate::models::{CategoryStats, PerformanceSnapshot, PerformanceSpan};
use crate::stats;
use crate::store::JsonStore;

/// Optional attributes of a new trace
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Correlating request id, copied into the span metadata
    pub request_id: Option<String>,
    /// Trace id of the enclosing span
    pub parent: Option<String>,
    /// Additional metadata
    pub metadata: Map<String, Value>,
}

impl TraceOptions {
    /// Correlate with a request
    pub fn request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Nest under another trace
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Attach a metadata entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    open: HashMap<String, PerformanceSpan>,
    history: HashMap<String, VecDeque<PerformanceSpan>>,
}

/// Tracks timed spans and their latency statistics per category
#[derive(Debug)]
pub struct PerformanceTracker {
    config: PerformanceConfig,
    store: JsonStore,
    state: Mutex<TrackerState>,
    thresholds: RwLock<HashMap<String, f64>>,
    sequence: AtomicU64,
}

impl PerformanceTracker {
    /// Create a tracker seeded with the configured thresholds
    pub fn new(config: PerformanceConfig) -> Self {
        let store = JsonStore::new(&config.directory);
        let thresholds = config
            .thresholds
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();

        Self {
            config,
            store,
            state: Mutex::new(TrackerState::default()),
            thresholds: RwLock::new(thresholds),
            sequence: AtomicU64::new(0),
        }
    }

    /// Open a trace with no extra attributes
    pub fn start_trace(&self, name: &str, category: &str) -> String {
        self.start_trace_with(name, category, TraceOptions::default())
    }

    /// Open a trace; returns its id
    pub fn start_trace_with(&self, name: &str, category: &str, options: TraceOptions) -> String {
        let now = Utc::now();
        let trace_id = self.next_trace_id(name, now);
        let span = new_span(&trace_id, name, category, now, options);

        self.state.lock().open.insert(trace_id.clone(), span);
        trace_id
    }

    /// `<name>_<unix_ms>_<hash(name) % 10000>_<sequence>`
    fn next_trace_id(&self, name: &str, now: DateTime<Utc>) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "{}_{}_{}_{}",
            name,
            now.timestamp_millis(),
            stats::stable_hash(name) % 10_000,
            seq
        )
    }

    /// Close a trace and archive it.
    ///
    /// Returns `None` for unknown or already-ended trace ids.
    pub fn end_trace(&self, trace_id: &str, success: bool) -> Option<PerformanceSpan> {
        let now = Utc::now();
        let span = {
            let mut state = self.state.lock();
            let mut span = state.open.remove(trace_id)?;
            span.complete(now);
            span.metadata.insert("success".to_string(), Value::Bool(success));
            self.archive(&mut state, span.clone());
            span
        };

        self.check_threshold(&span);
        Some(span)
    }

    /// File an externally measured operation that ended now
    pub fn record_timing(
        &self,
        name: &str,
        category: &str,
        duration: Duration,
        request_id: Option<&str>,
    ) -> PerformanceSpan {
        let end = Utc::now();
        let start = match chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| end.checked_sub_signed(d))
        {
            Some(start) => start,
            None => {
                warn!(
                    name,
                    category,
                    ?duration,
                    "Measured duration out of range, clamping to the earliest representable start"
                );
                DateTime::<Utc>::MIN_UTC
            }
        };

        let options = TraceOptions {
            request_id: request_id.map(str::to_string),
            ..TraceOptions::default()
        };

        let trace_id = self.next_trace_id(name, start);
        let mut span = new_span(&trace_id, name, category, start, options);
        span.complete(end);
        span.metadata.insert("success".to_string(), Value::Bool(true));

        self.archive(&mut *self.state.lock(), span.clone());
        self.check_threshold(&span);
        span
    }

    fn archive(&self, state: &mut TrackerState, span: PerformanceSpan) {
        let limit = self.config.max_history_per_category;
        state
            .history
            .entry(span.category.clone())
            .or_default()
            .push_bounded(span, limit);
    }

    /// Log a warning when `span` exceeds its category threshold
    fn check_threshold(&self, span: &PerformanceSpan) -> bool {
        let Some(duration_ms) = span.duration_ms else {
            return false;
        };
        histogram!("agentwatch_span_duration_ms", "category" => span.category.clone())
            .record(duration_ms);

        let Some(threshold_ms) = self.threshold(&span.category) else {
            return false;
        };
        if duration_ms <= threshold_ms {
            return false;
        }

        warn!(
            name = %span.name,
            category = %span.category,
            duration_ms,
            threshold_ms,
            "Performance threshold exceeded: {} ({}) took {:.2}ms, threshold is {}ms",
            span.name,
            span.category,
            duration_ms,
            threshold_ms
        );
        counter!("agentwatch_threshold_exceeded_total", "category" => span.category.clone())
            .increment(1);
        true
    }

    /// Set the latency ceiling for a category
    pub fn set_threshold(&self, category: &str, threshold_ms: f64) {
        self.thresholds
            .write()
            .insert(category.to_string(), threshold_ms);
        info!(category, threshold_ms, "Set performance threshold");
    }

    /// Latency ceiling for a category, if configured
    pub fn threshold(&self, category: &str) -> Option<f64> {
        self.thresholds.read().get(category).copied()
    }

    /// All configured thresholds
    pub fn thresholds(&self) -> BTreeMap<String, f64> {
        self.thresholds
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Number of traces started but not yet ended
    pub fn open_trace_count(&self) -> usize {
        self.state.lock().open.len()
    }

    /// Completed spans of one category, oldest first
    pub fn history(&self, category: &str) -> Vec<PerformanceSpan> {
        self.state
            .lock()
            .history
            .get(category)
            .map(|spans| spans.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Latency statistics for every category with at least one completed span
    pub fn get_performance_metrics(&self) -> BTreeMap<String, CategoryStats> {
        let durations = self.durations();
        let thresholds = self.thresholds.read().clone();

        durations
            .into_iter()
            .filter(|(_, d)| !d.is_empty())
            .map(|(category, d)| {
                let stats = category_stats(&d, thresholds.get(&category).copied());
                (category, stats)
            })
            .collect()
    }

    /// Statistics of one category, if it has completed spans
    pub fn category_stats(&self, category: &str) -> Option<CategoryStats> {
        let durations: Vec<f64> = {
            let state = self.state.lock();
            state
                .history
                .get(category)?
                .iter()
                .filter_map(|s| s.duration_ms)
                .collect()
        };
        if durations.is_empty() {
            return None;
        }
        Some(category_stats(&durations, self.threshold(category)))
    }

    fn durations(&self) -> BTreeMap<String, Vec<f64>> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .map(|(category, spans)| {
                let d = spans.iter().filter_map(|s| s.duration_ms).collect();
                (category.clone(), d)
            })
            .collect()
    }

    /// Snapshot for persistence; `None` while nothing has completed
    pub fn snapshot(&self, now: DateTime<Utc>) -> Option<PerformanceSnapshot> {
        let traces: BTreeMap<String, Vec<PerformanceSpan>> = {
            let state = self.state.lock();
            state
                .history
                .iter()
                .filter(|(_, spans)| !spans.is_empty())
                .map(|(category, spans)| (category.clone(), spans.iter().cloned().collect()))
                .collect()
        };
        if traces.is_empty() {
            debug!("No performance data to snapshot");
            return None;
        }

        Some(PerformanceSnapshot {
            timestamp: now,
            metrics: self.get_performance_metrics(),
            traces,
        })
    }
}

fn new_span(
    trace_id: &str,
    name: &str,
    category: &str,
    start: DateTime<Utc>,
    options: TraceOptions,
) -> PerformanceSpan {
    let mut metadata = options.metadata;
    if let Some(request_id) = options.request_id {
        metadata.insert("request_id".to_string(), Value::String(request_id));
    }

    PerformanceSpan {
        trace_id: trace_id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        start_time: start,
        end_time: None,
        duration_ms: None,
        metadata,
        parent: options.parent,
    }
}

fn category_stats(durations: &[f64], threshold_ms: Option<f64>) -> CategoryStats {
    let sorted = stats::sorted(durations);
    let threshold_exceeded_count = match threshold_ms {
        Some(t) => durations.iter().filter(|d| **d > t).count(),
        None => 0,
    };

    CategoryStats {
        count: sorted.len(),
        average_ms: stats::mean(&sorted),
        median_ms: stats::median(&sorted),
        p95_ms: stats::p95(&sorted),
        min_ms: sorted.first().copied().unwrap_or_default(),
        max_ms: sorted.last().copied().unwrap_or_default(),
        threshold_ms,
        threshold_exceeded_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Arc;
    use tracing_subscriber::fmt::MakeWriter;

    fn tracker() -> PerformanceTracker {
        PerformanceTracker::new(PerformanceConfig::default())
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_start_and_end_trace() {
        let tracker = tracker();
        let trace_id = tracker.start_trace("test_operation", "api");
        assert_eq!(tracker.open_trace_count(), 1);
        std::thread::sleep(Duration::from_millis(100));

        let span = tracker.end_trace(&trace_id, true).unwrap();
        assert_eq!(span.name, "test_operation");
        assert_eq!(span.category, "api");
        assert!(span.duration_ms.unwrap() >= 100.0);
        assert_eq!(span.success(), Some(true));
        assert_eq!(tracker.open_trace_count(), 0);
    }

    #[test]
    fn test_end_unknown_or_ended_trace() {
        let tracker = tracker();
        assert!(tracker.end_trace("missing", true).is_none());

        let trace_id = tracker.start_trace("op", "api");
        assert!(tracker.end_trace(&trace_id, false).is_some());
        assert!(tracker.end_trace(&trace_id, false).is_none());
        assert_eq!(tracker.history("api").len(), 1);
    }

    #[test]
    fn test_trace_ids_unique_within_millisecond() {
        let tracker = tracker();
        let ids: std::collections::HashSet<String> =
            (0..500).map(|_| tracker.start_trace("same", "api")).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_metadata_and_parent() {
        let tracker = tracker();
        let parent = tracker.start_trace("handle", "api_request");
        let child = tracker.start_trace_with(
            "get_balance",
            "tool_execution",
            TraceOptions::default()
                .request("r1")
                .parent(parent.clone())
                .with("account", "checking"),
        );

        let span = tracker.end_trace(&child, false).unwrap();
        assert_eq!(span.request_id(), Some("r1"));
        assert_eq!(span.parent.as_deref(), Some(parent.as_str()));
        assert_eq!(span.metadata["account"], "checking");
        assert_eq!(span.success(), Some(false));

        // Ending the child first leaves the parent untouched.
        assert!(tracker.end_trace(&parent, true).is_some());
    }

    #[test]
    fn test_set_threshold() {
        let tracker = tracker();
        assert_eq!(tracker.threshold("api_request"), Some(1000.0));
        tracker.set_threshold("api_request", 1500.0);
        tracker.set_threshold("api_request", 1500.0);
        assert_eq!(tracker.threshold("api_request"), Some(1500.0));
        assert_eq!(tracker.threshold("unknown"), None);
    }

    #[test]
    fn test_threshold_exceeded_is_logged() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let tracker = tracker();
            tracker.set_threshold("api", 50.0);

            let trace_id = tracker.start_trace("test_operation", "api");
            std::thread::sleep(Duration::from_millis(100));
            tracker.end_trace(&trace_id, true).unwrap();
        });

        let output = logs.contents();
        assert!(output.contains("WARN"));
        assert!(output.contains("Performance threshold exceeded"));
        assert!(output.contains("(api)"));
    }

    #[test]
    fn test_out_of_range_timing_is_clamped() {
        let tracker = tracker();
        tracker.set_threshold("api", 50.0);

        let span = tracker.record_timing("op", "api", Duration::MAX, None);
        assert_eq!(span.start_time, DateTime::<Utc>::MIN_UTC);
        assert!(span.duration_ms.unwrap() > 1e12);
        assert!(tracker.check_threshold(&span));
        assert_eq!(tracker.category_stats("api").unwrap().threshold_exceeded_count, 1);
    }

    #[test]
    fn test_no_threshold_means_no_check() {
        let tracker = tracker();
        let span = tracker.record_timing("op", "uncategorized", Duration::from_secs(10), None);
        assert!(!tracker.check_threshold(&span));
        let stats = tracker.category_stats("uncategorized").unwrap();
        assert_eq!(stats.threshold_ms, None);
        assert_eq!(stats.threshold_exceeded_count, 0);
    }

    #[test]
    fn test_get_performance_metrics() {
        let tracker = tracker();
        tracker.set_threshold("api", 15.0);
        for ms in 1..=20 {
            tracker.record_timing("op", "api", Duration::from_millis(ms), Some("r"));
        }

        let metrics = tracker.get_performance_metrics();
        let api = &metrics["api"];
        assert_eq!(api.count, 20);
        assert_eq!(api.average_ms, 10.5);
        assert_eq!(api.median_ms, 10.5);
        assert_eq!(api.p95_ms, Some(20.0));
        assert_eq!(api.min_ms, 1.0);
        assert_eq!(api.max_ms, 20.0);
        assert_eq!(api.threshold_ms, Some(15.0));
        assert_eq!(api.threshold_exceeded_count, 5);
    }

    #[test]
    fn test_p95_absent_for_small_samples() {
        let tracker = tracker();
        for ms in 1..=19 {
            tracker.record_timing("op", "llm_call", Duration::from_millis(ms), None);
        }
        assert_eq!(tracker.get_performance_metrics()["llm_call"].p95_ms, None);
    }

    #[test]
    fn test_empty_categories_are_omitted() {
        let tracker = tracker();
        let _open = tracker.start_trace("pending", "db");
        assert!(tracker.get_performance_metrics().is_empty());
        assert!(tracker.snapshot(Utc::now()).is_none());
    }

    #[test]
    fn test_history_bounded_per_category() {
        let tracker = PerformanceTracker::new(PerformanceConfig {
            max_history_per_category: 5,
            ..PerformanceConfig::default()
        });
        for ms in 1..=8 {
            tracker.record_timing("op", "api", Duration::from_millis(ms), None);
        }
        tracker.record_timing("op", "llm_call", Duration::from_millis(1), None);

        let api = tracker.history("api");
        assert_eq!(api.len(), 5);
        assert_eq!(api[0].duration_ms, Some(4.0));
        assert_eq!(tracker.history("llm_call").len(), 1);
    }
}
