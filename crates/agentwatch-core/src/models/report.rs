//! Analytics report models

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::request::MetricsSnapshot;

/// Request outcome statistics for one period bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodStats {
    /// Requests started
    pub total_requests: usize,
    /// Requests completed successfully
    pub successful_requests: usize,
    /// Requests completed as failures
    pub failed_requests: usize,
    /// `successful / max(1, total)`
    pub success_rate: f64,
    /// Mean request latency
    pub average_latency_ms: f64,
    /// Top tools by usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_tools: Option<BTreeMap<String, u64>>,
    /// Top agents by usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_agents: Option<BTreeMap<String, u64>>,
}

/// Token totals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    #[serde(rename = "in")]
    pub tokens_in: u64,
    /// Completion tokens
    #[serde(rename = "out")]
    pub tokens_out: u64,
}

/// Per-hour latency and error trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyPerformance {
    /// Requests in the bucket
    pub request_count: usize,
    /// Mean request latency
    pub average_latency_ms: f64,
    /// Guarded p95, absent below 20 samples
    pub p95_latency_ms: Option<f64>,
    /// Failed share of the bucket
    pub error_rate: f64,
    /// LLM tokens consumed
    pub token_usage: TokenUsage,
}

/// Activity of one user across the history window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    /// Requests in the bucket
    pub request_count: usize,
    /// Distinct sessions
    pub session_count: usize,
    /// Start of the earliest request
    pub first_seen: DateTime<Utc>,
    /// Start of the latest request
    pub last_seen: DateTime<Utc>,
    /// Distinct days with requests
    pub days_active: usize,
    /// Top 3 tools
    pub preferred_tools: BTreeMap<String, u64>,
}

/// User-level breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalytics {
    /// Distinct users in the history
    pub active_users: usize,
    /// Users first seen within the last day
    pub new_users_last_day: usize,
    /// Per-user activity
    pub user_details: BTreeMap<String, UserActivity>,
}

/// Average tokens per request
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenAverages {
    /// Prompt tokens
    #[serde(rename = "in")]
    pub tokens_in: f64,
    /// Completion tokens
    #[serde(rename = "out")]
    pub tokens_out: f64,
}

/// Latency of requests that used a given tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPerformance {
    /// Requests that used the tool
    pub count: usize,
    /// Mean request latency
    pub average_latency_ms: f64,
    /// Guarded p95, absent below 20 samples
    pub p95_latency_ms: Option<f64>,
}

/// Latency distribution and token usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceAnalytics {
    /// Mean request latency
    pub average_latency_ms: f64,
    /// Nearest-rank median
    pub median_latency_ms: f64,
    /// Guarded p95, absent below 20 samples
    pub p95_latency_ms: Option<f64>,
    /// Fastest request
    pub min_latency_ms: f64,
    /// Slowest request
    pub max_latency_ms: f64,
    /// Prompt tokens across the history
    pub total_llm_tokens_in: u64,
    /// Completion tokens across the history
    pub total_llm_tokens_out: u64,
    /// Token averages per request
    pub average_tokens_per_request: TokenAverages,
    /// Latency of requests per tool used
    pub tool_performance: BTreeMap<String, ToolPerformance>,
}

/// Tool and delegation usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalytics {
    /// Top 10 tools
    pub most_used_tools: BTreeMap<String, u64>,
    /// Top 5 agents
    pub most_delegated_agents: BTreeMap<String, u64>,
    /// Guardrail blocks per request
    pub guardrail_block_rate: f64,
}

/// Report produced every analytics tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HourlyReport {
    /// Always `hourly`
    pub report_type: String,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Aggregate counters at generation time
    pub current_metrics: MetricsSnapshot,
    /// Keyed by `YYYY-mm-dd HH:00`
    pub hourly_statistics: BTreeMap<String, PeriodStats>,
    /// Keyed by `YYYY-mm-dd HH:00`
    pub performance_trends: BTreeMap<String, HourlyPerformance>,
}

/// Report produced once per day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyReport {
    /// Always `daily`
    pub report_type: String,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Aggregate counters at generation time
    pub current_metrics: MetricsSnapshot,
    /// Keyed by `YYYY-mm-dd`
    pub daily_statistics: BTreeMap<String, PeriodStats>,
    /// Absent without history
    pub user_analytics: Option<UserAnalytics>,
    /// Absent without history
    pub performance_analytics: Option<PerformanceAnalytics>,
    /// Absent without history
    pub content_analytics: Option<ContentAnalytics>,
}

/// Period selector for usage summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    /// Today
    Day,
    /// This week
    Week,
    /// This month
    Month,
    /// Since start
    All,
}

impl UsagePeriod {
    /// Summary title and timeframe label
    pub fn labels(self) -> (&'static str, &'static str) {
        match self {
            UsagePeriod::Day => ("Daily Usage Summary", "Today"),
            UsagePeriod::Week => ("Weekly Usage Summary", "This Week"),
            UsagePeriod::Month => ("Monthly Usage Summary", "This Month"),
            UsagePeriod::All => ("Usage Summary", "All Time"),
        }
    }
}

/// Headline request counters of a usage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageMetrics {
    /// Requests started
    pub total_requests: u64,
    /// Requests completed successfully
    pub successful_requests: u64,
    /// Requests completed as failures
    pub failed_requests: u64,
    /// `successful / max(1, total)`
    pub success_rate: f64,
    /// Mean request latency
    pub average_latency_ms: f64,
}

/// Leaderboards of a usage summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageBreakdown {
    /// Top tools by usage
    pub top_tools: BTreeMap<String, u64>,
    /// Top agents by usage
    pub top_agents: BTreeMap<String, u64>,
    /// Cumulative guardrail blocks
    pub guardrail_blocks: u64,
}

/// Titled summary of the aggregate counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Summary title
    pub title: String,
    /// Generation time
    pub generated_at: DateTime<Utc>,
    /// Period label
    pub timeframe: String,
    /// Request counters
    pub metrics: UsageMetrics,
    /// Usage leaderboards
    pub usage: UsageBreakdown,
}
