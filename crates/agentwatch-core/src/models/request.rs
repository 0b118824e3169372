//! Request metrics data models

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live metrics for one in-flight request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Externally supplied request identifier
    pub request_id: String,

    /// User that issued the request
    pub user_id: String,

    /// Conversation session the request belongs to
    pub session_id: String,

    /// When tracking started
    pub start_time: DateTime<Utc>,

    /// When the request completed (unset while in flight)
    pub end_time: Option<DateTime<Utc>>,

    /// Number of LLM calls made
    pub llm_call_count: u64,

    /// Input tokens across all LLM calls
    pub llm_tokens_in: u64,

    /// Output tokens across all LLM calls
    pub llm_tokens_out: u64,

    /// Tool name -> invocation count
    pub tool_calls: HashMap<String, u64>,

    /// Agent name -> delegation count
    pub agent_calls: HashMap<String, u64>,

    /// Number of guardrail blocks
    pub guardrail_blocks: u64,

    /// Error messages in the order they were recorded
    pub errors: Vec<String>,

    /// Wall-clock latency, set on completion
    pub latency_ms: Option<f64>,
}

impl RequestContext {
    /// Create a fresh context starting now
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            start_time: Utc::now(),
            end_time: None,
            llm_call_count: 0,
            llm_tokens_in: 0,
            llm_tokens_out: 0,
            tool_calls: HashMap::new(),
            agent_calls: HashMap::new(),
            guardrail_blocks: 0,
            errors: Vec::new(),
            latency_ms: None,
        }
    }

    /// Stamp the end time and derive latency from it
    pub fn complete(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.latency_ms = Some(elapsed_ms(self.start_time, end_time));
    }

    /// Check whether the request has completed
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Total tokens used
    pub fn total_tokens(&self) -> u64 {
        self.llm_tokens_in + self.llm_tokens_out
    }
}

/// Milliseconds between two instants, with microsecond resolution
pub fn elapsed_ms(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => delta.num_milliseconds() as f64,
    }
}

/// Immutable snapshot of a completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    /// Caller-supplied request id
    pub request_id: String,
    /// User that sent the request
    pub user_id: String,
    /// Conversation session
    pub session_id: String,
    /// Request start time
    pub timestamp: DateTime<Utc>,
    /// Completion time
    pub end_time: DateTime<Utc>,
    /// `end_time - timestamp` in milliseconds
    pub latency_ms: f64,
    /// LLM calls made
    pub llm_call_count: u64,
    /// Prompt tokens
    pub llm_tokens_in: u64,
    /// Completion tokens
    pub llm_tokens_out: u64,
    /// Tool name -> call count
    pub tool_calls: HashMap<String, u64>,
    /// Agent name -> delegation count
    pub agent_calls: HashMap<String, u64>,
    /// Guardrail blocks during the request
    pub guardrail_blocks: u64,
    /// Error messages in order
    pub errors: Vec<String>,
    /// Outcome passed to `complete_request`
    pub success: bool,
}

impl HistoricalRecord {
    /// Build the archived form of a completed context
    pub fn from_context(context: &RequestContext, success: bool) -> Option<Self> {
        let end_time = context.end_time?;
        Some(Self {
            request_id: context.request_id.clone(),
            user_id: context.user_id.clone(),
            session_id: context.session_id.clone(),
            timestamp: context.start_time,
            end_time,
            latency_ms: context.latency_ms.unwrap_or_default(),
            llm_call_count: context.llm_call_count,
            llm_tokens_in: context.llm_tokens_in,
            llm_tokens_out: context.llm_tokens_out,
            tool_calls: context.tool_calls.clone(),
            agent_calls: context.agent_calls.clone(),
            guardrail_blocks: context.guardrail_blocks,
            errors: context.errors.clone(),
            success,
        })
    }
}

/// Point-in-time view of the aggregate counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Requests started
    pub total_requests: u64,
    /// Requests completed successfully
    pub successful_requests: u64,
    /// Requests completed as failures
    pub failed_requests: u64,
    /// `successful / max(1, total)`
    pub success_rate: f64,
    /// Summed latency divided by total requests (in-flight included)
    pub average_latency_ms: f64,
    /// Summed latency of completed requests
    pub total_latency_ms: f64,
    /// Top 5 tools by usage
    pub top_tools: BTreeMap<String, u64>,
    /// Top 5 agents by usage
    pub top_agents: BTreeMap<String, u64>,
    /// Cumulative guardrail blocks
    pub guardrail_blocks: u64,
    /// Requests still in flight
    pub active_requests: usize,
}

impl MetricsSnapshot {
    /// Lifetime failure ratio, `failed / max(1, total)`
    pub fn error_rate(&self) -> f64 {
        self.failed_requests as f64 / self.total_requests.max(1) as f64
    }

    /// Lifetime guardrail blocks per request
    pub fn guardrail_block_rate(&self) -> f64 {
        self.guardrail_blocks as f64 / self.total_requests.max(1) as f64
    }
}

/// Persisted metrics artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsArtifact {
    /// Snapshot time
    pub timestamp: DateTime<Utc>,
    /// Aggregate counters
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    /// Newest completed requests
    pub recent_requests: Vec<HistoricalRecord>,
}
