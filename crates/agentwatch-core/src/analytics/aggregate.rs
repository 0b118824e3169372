//! Read-side aggregations over completed request records

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    ContentAnalytics, HistoricalRecord, HourlyPerformance, PerformanceAnalytics, PeriodStats,
    TokenAverages, TokenUsage, ToolPerformance, UserActivity, UserAnalytics,
};
use crate::stats::{self, merge_counts, top_n};

const HOUR_KEY: &str = "%Y-%m-%d %H:00";
const DAY_KEY: &str = "%Y-%m-%d";

/// Records started at or after `cutoff`
pub fn since(records: &[HistoricalRecord], cutoff: DateTime<Utc>) -> Vec<HistoricalRecord> {
    records
        .iter()
        .filter(|r| r.timestamp >= cutoff)
        .cloned()
        .collect()
}

fn group_by<'a, K, F>(records: &'a [HistoricalRecord], key: F) -> BTreeMap<K, Vec<&'a HistoricalRecord>>
where
    K: Ord,
    F: Fn(&HistoricalRecord) -> K,
{
    let mut groups: BTreeMap<K, Vec<&HistoricalRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record);
    }
    groups
}

fn latencies(records: &[&HistoricalRecord]) -> Vec<f64> {
    stats::sorted(&records.iter().map(|r| r.latency_ms).collect::<Vec<_>>())
}

fn tool_counts<'a>(records: impl IntoIterator<Item = &'a HistoricalRecord>) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for record in records {
        merge_counts(&mut counts, &record.tool_calls);
    }
    counts
}

fn agent_counts<'a>(records: impl IntoIterator<Item = &'a HistoricalRecord>) -> HashMap<String, u64> {
    let mut counts = HashMap::new();
    for record in records {
        merge_counts(&mut counts, &record.agent_calls);
    }
    counts
}

fn period_stats(records: &[&HistoricalRecord], leaderboards: bool) -> PeriodStats {
    let total = records.len();
    let successful = records.iter().filter(|r| r.success).count();

    let (top_tools, top_agents) = if leaderboards {
        (
            Some(top_n(&tool_counts(records.iter().copied()), 5)),
            Some(top_n(&agent_counts(records.iter().copied()), 5)),
        )
    } else {
        (None, None)
    };

    PeriodStats {
        total_requests: total,
        successful_requests: successful,
        failed_requests: total - successful,
        success_rate: if total > 0 {
            successful as f64 / total as f64
        } else {
            0.0
        },
        average_latency_ms: stats::mean(&latencies(records)),
        top_tools,
        top_agents,
    }
}

/// Outcome statistics per hour, keyed by `YYYY-mm-dd HH:00`
pub fn hourly_statistics(records: &[HistoricalRecord]) -> BTreeMap<String, PeriodStats> {
    group_by(records, |r| r.timestamp.format(HOUR_KEY).to_string())
        .into_iter()
        .map(|(hour, group)| (hour, period_stats(&group, false)))
        .collect()
}

/// Outcome statistics and top-5 leaderboards per day, keyed by `YYYY-mm-dd`
pub fn daily_statistics(records: &[HistoricalRecord]) -> BTreeMap<String, PeriodStats> {
    group_by(records, |r| r.timestamp.format(DAY_KEY).to_string())
        .into_iter()
        .map(|(day, group)| (day, period_stats(&group, true)))
        .collect()
}

/// Latency, error and token trend per hour
pub fn hourly_performance(records: &[HistoricalRecord]) -> BTreeMap<String, HourlyPerformance> {
    group_by(records, |r| r.timestamp.format(HOUR_KEY).to_string())
        .into_iter()
        .map(|(hour, group)| {
            let sorted = latencies(&group);
            let failed = group.iter().filter(|r| !r.success).count();
            let trend = HourlyPerformance {
                request_count: group.len(),
                average_latency_ms: stats::mean(&sorted),
                p95_latency_ms: stats::p95(&sorted),
                error_rate: failed as f64 / group.len() as f64,
                token_usage: TokenUsage {
                    tokens_in: group.iter().map(|r| r.llm_tokens_in).sum(),
                    tokens_out: group.iter().map(|r| r.llm_tokens_out).sum(),
                },
            };
            (hour, trend)
        })
        .collect()
}

/// Per-user activity; `None` without records
pub fn user_analytics(records: &[HistoricalRecord], now: DateTime<Utc>) -> Option<UserAnalytics> {
    if records.is_empty() {
        return None;
    }

    let user_details: BTreeMap<String, UserActivity> = group_by(records, |r| r.user_id.clone())
        .into_iter()
        .filter_map(|(user, group)| {
            let first_seen = group.iter().map(|r| r.timestamp).min()?;
            let last_seen = group.iter().map(|r| r.timestamp).max()?;
            let sessions: HashSet<&str> = group.iter().map(|r| r.session_id.as_str()).collect();
            let days: HashSet<_> = group.iter().map(|r| r.timestamp.date_naive()).collect();

            let activity = UserActivity {
                request_count: group.len(),
                session_count: sessions.len(),
                first_seen,
                last_seen,
                days_active: days.len(),
                preferred_tools: top_n(&tool_counts(group.iter().copied()), 3),
            };
            Some((user, activity))
        })
        .collect();

    let cutoff = now - Duration::days(1);
    let new_users_last_day = user_details
        .values()
        .filter(|u| u.first_seen >= cutoff)
        .count();

    Some(UserAnalytics {
        active_users: user_details.len(),
        new_users_last_day,
        user_details,
    })
}

/// Latency distribution, token usage and per-tool latency; `None` without records
pub fn performance_analytics(records: &[HistoricalRecord]) -> Option<PerformanceAnalytics> {
    if records.is_empty() {
        return None;
    }

    let all: Vec<&HistoricalRecord> = records.iter().collect();
    let sorted = latencies(&all);
    let n = records.len() as f64;
    let tokens_in: u64 = records.iter().map(|r| r.llm_tokens_in).sum();
    let tokens_out: u64 = records.iter().map(|r| r.llm_tokens_out).sum();

    // A request counts once per tool it used, whatever the call count.
    let mut per_tool: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for record in records {
        for tool in record.tool_calls.keys() {
            per_tool.entry(tool).or_default().push(record.latency_ms);
        }
    }
    let tool_performance = per_tool
        .into_iter()
        .map(|(tool, values)| {
            let sorted = stats::sorted(&values);
            let perf = ToolPerformance {
                count: sorted.len(),
                average_latency_ms: stats::mean(&sorted),
                p95_latency_ms: stats::p95(&sorted),
            };
            (tool.to_string(), perf)
        })
        .collect();

    Some(PerformanceAnalytics {
        average_latency_ms: stats::mean(&sorted),
        median_latency_ms: stats::nearest_rank(&sorted, 0.5).unwrap_or_default(),
        p95_latency_ms: stats::p95(&sorted),
        min_latency_ms: sorted.first().copied().unwrap_or_default(),
        max_latency_ms: sorted.last().copied().unwrap_or_default(),
        total_llm_tokens_in: tokens_in,
        total_llm_tokens_out: tokens_out,
        average_tokens_per_request: TokenAverages {
            tokens_in: tokens_in as f64 / n,
            tokens_out: tokens_out as f64 / n,
        },
        tool_performance,
    })
}

/// Tool and delegation leaderboards; `None` without records
pub fn content_analytics(records: &[HistoricalRecord]) -> Option<ContentAnalytics> {
    if records.is_empty() {
        return None;
    }

    let blocks: u64 = records.iter().map(|r| r.guardrail_blocks).sum();
    Some(ContentAnalytics {
        most_used_tools: top_n(&tool_counts(records), 10),
        most_delegated_agents: top_n(&agent_counts(records), 5),
        guardrail_block_rate: blocks as f64 / records.len() as f64,
    })
}
