//! Condition detectors and the periodic monitor cycle

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info};

use super::system::{details, AlertSystem, Triggered};
use crate::models::{AlertType, Severity};
use crate::schedule::Cadence;

/// Alerts raised and resolved by one monitor cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Ids of newly raised alerts
    pub triggered: Vec<String>,
    /// Ids of alerts resolved by the recovery sweep
    pub resolved: Vec<String>,
}

/// `YYYYmmdd_HH`; conditions are deduplicated per hour
fn hour_bucket(now: DateTime<Utc>) -> String {
    now.format("%Y%m%d_%H").to_string()
}

impl AlertSystem {
    /// Run every detector and then the auto-resolution sweep
    pub fn run_cycle(&self) -> CycleReport {
        self.run_cycle_at(Utc::now())
    }

    /// [`run_cycle`](Self::run_cycle) for a given clock reading
    pub fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        let mut triggered = self.check_performance_alerts_at(now);
        triggered.extend(self.check_error_rate_alerts_at(now));
        triggered.extend(self.check_guardrail_alerts_at(now));
        let resolved = self.auto_resolve_alerts_at(now);

        if !triggered.is_empty() || !resolved.is_empty() {
            info!(
                triggered = triggered.len(),
                resolved = resolved.len(),
                "Alert monitor cycle finished"
            );
        } else {
            debug!("Alert monitor cycle finished");
        }
        CycleReport {
            triggered,
            resolved,
        }
    }

    /// Raise a warning for each category whose p95 exceeds its `<category>_ms` threshold
    pub fn check_performance_alerts_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let bucket = hour_bucket(now);
        let mut raised = Vec::new();

        for (category, stats) in self.tracker.get_performance_metrics() {
            let Some(threshold_ms) = self.threshold(AlertType::Performance, &format!("{category}_ms"))
            else {
                continue;
            };
            let Some(p95_ms) = stats.p95_ms else {
                continue;
            };
            if p95_ms <= threshold_ms {
                continue;
            }

            let message = format!(
                "Performance degradation: {category} p95 latency {p95_ms:.2}ms exceeds threshold {threshold_ms}ms"
            );
            let result = self.raise(
                AlertType::Performance,
                Severity::Warning,
                message,
                details(json!({
                    "category": category,
                    "p95_ms": p95_ms,
                    "threshold_ms": threshold_ms,
                    "metrics": stats,
                })),
                Some(format!("performance_{category}_{bucket}")),
                now,
            );
            if let Triggered::New(id) = result {
                raised.push(id);
            }
        }
        raised
    }

    /// Raise an error when the lifetime failure ratio exceeds `max_error_rate`
    pub fn check_error_rate_alerts_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let metrics = self.collector.get_current_metrics();
        if metrics.total_requests < self.config.min_requests_for_rate_alerts {
            return Vec::new();
        }
        let Some(max_rate) = self.threshold(AlertType::ErrorRate, "max_error_rate") else {
            return Vec::new();
        };

        let rate = metrics.error_rate();
        if rate <= max_rate {
            return Vec::new();
        }

        let message = format!(
            "High error rate: {:.2}% of {} requests failed (threshold {:.2}%)",
            rate * 100.0,
            metrics.total_requests,
            max_rate * 100.0
        );
        let result = self.raise(
            AlertType::ErrorRate,
            Severity::Error,
            message,
            details(json!({
                "error_rate": rate,
                "threshold": max_rate,
                "total_requests": metrics.total_requests,
                "failed_requests": metrics.failed_requests,
            })),
            Some(format!("error_rate_{}", hour_bucket(now))),
            now,
        );
        match result {
            Triggered::New(id) => vec![id],
            Triggered::Duplicate(_) => Vec::new(),
        }
    }

    /// Raise a warning when guardrail blocks per request exceed `max_block_rate`
    pub fn check_guardrail_alerts_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let metrics = self.collector.get_current_metrics();
        if metrics.total_requests < self.config.min_requests_for_rate_alerts {
            return Vec::new();
        }
        let Some(max_rate) = self.threshold(AlertType::Guardrail, "max_block_rate") else {
            return Vec::new();
        };

        let rate = metrics.guardrail_block_rate();
        if rate <= max_rate {
            return Vec::new();
        }

        let message = format!(
            "High guardrail block rate: {} blocks over {} requests ({:.2}%)",
            metrics.guardrail_blocks,
            metrics.total_requests,
            rate * 100.0
        );
        let result = self.raise(
            AlertType::Guardrail,
            Severity::Warning,
            message,
            details(json!({
                "block_rate": rate,
                "threshold": max_rate,
                "guardrail_blocks": metrics.guardrail_blocks,
                "total_requests": metrics.total_requests,
            })),
            Some(format!("guardrail_{}", hour_bucket(now))),
            now,
        );
        match result {
            Triggered::New(id) => vec![id],
            Triggered::Duplicate(_) => Vec::new(),
        }
    }

    /// Resolve performance alerts whose category p95 is back below the recorded threshold
    pub fn auto_resolve_alerts_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let candidates = self.get_active_alerts(Some(AlertType::Performance), None);
        let mut resolved = Vec::new();

        for alert in candidates {
            let (Some(category), Some(threshold_ms)) =
                (alert.detail_str("category"), alert.detail_f64("threshold_ms"))
            else {
                continue;
            };
            let Some(p95_ms) = self.tracker.category_stats(category).and_then(|s| s.p95_ms) else {
                continue;
            };
            if p95_ms >= threshold_ms {
                continue;
            }

            let message = format!(
                "Performance recovered: {category} p95 latency now {p95_ms:.2}ms (below threshold {threshold_ms}ms)"
            );
            if self.resolve_alert_at(&alert.id, message, now) {
                resolved.push(alert.id);
            }
        }
        resolved
    }

    /// Cadence of the monitor loop
    pub fn monitor_cadence(&self) -> Cadence {
        Cadence::new(self.config.check_interval, self.config.check_interval)
    }
}
