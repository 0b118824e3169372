//! Request metrics collector
//!
//! Tracks one mutable [`RequestContext`] per in-flight request, rolls completed
//! contexts into process-wide counters and keeps a bounded history of
//! completed requests for analytics.
//!
//! Tool, agent and guardrail counts reach the aggregate counters as soon as
//! they are recorded, so in-flight activity is visible in
//! [`MetricsCollector::get_current_metrics`]. Success, failure and latency are
//! rolled in only when the request completes.

mod writer;

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::bounded::BoundedPush;
use crate::config::MetricsConfig;
use crate::models::{HistoricalRecord, MetricsArtifact, MetricsSnapshot, RequestContext};
use crate::stats::top_n;
use crate::store::JsonStore;

/// Number of entries in the tool and agent leaderboards
const TOP_USAGE: usize = 5;

#[derive(Debug, Default)]
struct AggregateCounters {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    total_latency_ms: f64,
    tool_usage: HashMap<String, u64>,
    agent_usage: HashMap<String, u64>,
    guardrail_blocks: u64,
}

#[derive(Debug, Default)]
struct CollectorState {
    active: HashMap<String, RequestContext>,
    counters: AggregateCounters,
    history: VecDeque<HistoricalRecord>,
}

impl CollectorState {
    fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        let average_latency_ms = if c.total_requests > 0 {
            c.total_latency_ms / c.total_requests as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            total_requests: c.total_requests,
            successful_requests: c.successful_requests,
            failed_requests: c.failed_requests,
            success_rate: c.successful_requests as f64 / c.total_requests.max(1) as f64,
            average_latency_ms,
            total_latency_ms: c.total_latency_ms,
            top_tools: top_n(&c.tool_usage, TOP_USAGE),
            top_agents: top_n(&c.agent_usage, TOP_USAGE),
            guardrail_blocks: c.guardrail_blocks,
            active_requests: self.active.len(),
        }
    }
}

/// Per-request metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    store: JsonStore,
    state: Mutex<CollectorState>,
}

impl MetricsCollector {
    /// Create a collector
    pub fn new(config: MetricsConfig) -> Self {
        let store = JsonStore::new(&config.directory);
        Self {
            config,
            store,
            state: Mutex::new(CollectorState::default()),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    /// Start tracking a request.
    ///
    /// An id that is already active is overwritten: duplicate ids are a caller
    /// error, not corrupted data.
    pub fn start_request(
        &self,
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> String {
        let context = RequestContext::new(request_id, user_id, session_id);
        let request_id = context.request_id.clone();

        let mut state = self.state.lock();
        if state.active.insert(request_id.clone(), context).is_some() {
            warn!(request_id = %request_id, "Request id already active; context replaced");
        }
        state.counters.total_requests += 1;
        drop(state);

        counter!("agentwatch_requests_total").increment(1);
        request_id
    }

    /// Apply `f` to the active context for `request_id`; no-op when absent
    fn with_context(
        &self,
        request_id: &str,
        f: impl FnOnce(&mut RequestContext, &mut AggregateCounters),
    ) -> bool {
        let mut state = self.state.lock();
        let CollectorState {
            active, counters, ..
        } = &mut *state;

        match active.get_mut(request_id) {
            Some(context) => {
                f(context, counters);
                true
            }
            None => {
                debug!(request_id, "Ignoring event for inactive request");
                false
            }
        }
    }

    /// Record an LLM API call
    pub fn record_llm_call(&self, request_id: &str, tokens_in: u64, tokens_out: u64) {
        let recorded = self.with_context(request_id, |context, _| {
            context.llm_call_count += 1;
            context.llm_tokens_in += tokens_in;
            context.llm_tokens_out += tokens_out;
        });
        if recorded {
            counter!("agentwatch_llm_tokens_total", "direction" => "in").increment(tokens_in);
            counter!("agentwatch_llm_tokens_total", "direction" => "out").increment(tokens_out);
        }
    }

    /// Record a tool invocation
    pub fn record_tool_call(&self, request_id: &str, tool_name: &str) {
        let recorded = self.with_context(request_id, |context, counters| {
            *context.tool_calls.entry(tool_name.to_string()).or_insert(0) += 1;
            *counters.tool_usage.entry(tool_name.to_string()).or_insert(0) += 1;
        });
        if recorded {
            counter!("agentwatch_tool_calls_total", "tool" => tool_name.to_string()).increment(1);
        }
    }

    /// Record an agent delegation
    pub fn record_agent_call(&self, request_id: &str, agent_name: &str) {
        let recorded = self.with_context(request_id, |context, counters| {
            *context.agent_calls.entry(agent_name.to_string()).or_insert(0) += 1;
            *counters.agent_usage.entry(agent_name.to_string()).or_insert(0) += 1;
        });
        if recorded {
            counter!("agentwatch_agent_calls_total", "agent" => agent_name.to_string())
                .increment(1);
        }
    }

    /// Record a request blocked by a guardrail
    pub fn record_guardrail_block(&self, request_id: &str, reason: &str) {
        let recorded = self.with_context(request_id, |context, counters| {
            context.guardrail_blocks += 1;
            counters.guardrail_blocks += 1;
        });
        if recorded {
            debug!(request_id, reason, "Guardrail block recorded");
            counter!("agentwatch_guardrail_blocks_total").increment(1);
        }
    }

    /// Record an error raised while processing a request
    pub fn record_error(&self, request_id: &str, message: &str) {
        self.with_context(request_id, |context, _| {
            context.errors.push(message.to_string());
        });
    }

    /// Complete a request and roll it into the aggregates.
    ///
    /// Returns `None` if `request_id` is not active, including a second
    /// completion of the same id.
    pub fn complete_request(&self, request_id: &str, success: bool) -> Option<RequestContext> {
        self.complete_request_at(request_id, success, Utc::now())
    }

    pub(crate) fn complete_request_at(
        &self,
        request_id: &str,
        success: bool,
        now: DateTime<Utc>,
    ) -> Option<RequestContext> {
        let mut state = self.state.lock();
        let mut context = state.active.remove(request_id)?;
        context.complete(now);

        let latency_ms = context.latency_ms.unwrap_or_default();
        let counters = &mut state.counters;
        if success {
            counters.successful_requests += 1;
        } else {
            counters.failed_requests += 1;
        }
        counters.total_latency_ms += latency_ms;

        if let Some(record) = HistoricalRecord::from_context(&context, success) {
            state
                .history
                .push_bounded(record, self.config.max_historical);
        }
        drop(state);

        let outcome = if success { "success" } else { "failure" };
        counter!("agentwatch_requests_completed_total", "outcome" => outcome).increment(1);
        histogram!("agentwatch_request_latency_ms").record(latency_ms);

        Some(context)
    }

    /// Point-in-time view of the aggregate counters
    pub fn get_current_metrics(&self) -> MetricsSnapshot {
        self.state.lock().snapshot()
    }

    /// Copy of an active context, if tracked
    pub fn active_context(&self, request_id: &str) -> Option<RequestContext> {
        self.state.lock().active.get(request_id).cloned()
    }

    /// Number of in-flight requests
    pub fn active_request_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Copy of the completed-request history, oldest first
    pub fn history(&self) -> Vec<HistoricalRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// The `n` most recent completed requests, oldest first
    pub fn recent_history(&self, n: usize) -> Vec<HistoricalRecord> {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(n);
        state.history.iter().skip(skip).cloned().collect()
    }

    /// Snapshot for persistence, taken under a single lock acquisition
    pub fn artifact(&self, now: DateTime<Utc>) -> MetricsArtifact {
        let state = self.state.lock();
        let skip = state.history.len().saturating_sub(self.config.recent_records);
        MetricsArtifact {
            timestamp: now,
            metrics: state.snapshot(),
            recent_requests: state.history.iter().skip(skip).cloned().collect(),
        }
    }
}
