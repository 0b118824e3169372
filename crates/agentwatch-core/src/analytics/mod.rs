//! Periodic analytics reports
//!
//! Reports are read-side aggregations over the collector's completed-request
//! history. An hourly report is written on every tick; the daily report is
//! written on the first tick of each UTC day.

mod aggregate;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use parking_lot::Mutex;
use tracing::info;

pub use aggregate::{
    content_analytics, daily_statistics, hourly_performance, hourly_statistics,
    performance_analytics, user_analytics,
};

use crate::collector::MetricsCollector;
use crate::config::AnalyticsConfig;
use crate::error::Result;
use crate::models::{
    DailyReport, HourlyReport, UsageBreakdown, UsageMetrics, UsagePeriod, UsageSummary,
};
use crate::schedule::Cadence;
use crate::store::{timestamped_name, JsonStore};

/// Builds and persists analytics reports
#[derive(Debug)]
pub struct AnalyticsService {
    config: AnalyticsConfig,
    collector: Arc<MetricsCollector>,
    store: JsonStore,
    last_daily: Mutex<Option<NaiveDate>>,
}

impl AnalyticsService {
    /// Create a service reading from `collector`
    pub fn new(config: AnalyticsConfig, collector: Arc<MetricsCollector>) -> Self {
        let store = JsonStore::new(&config.directory);
        Self {
            config,
            collector,
            store,
            last_daily: Mutex::new(None),
        }
    }

    /// Report over the last 24 hours of history
    pub fn generate_hourly_report(&self) -> HourlyReport {
        self.generate_hourly_report_at(Utc::now())
    }

    /// [`generate_hourly_report`](Self::generate_hourly_report) for a given clock reading
    pub fn generate_hourly_report_at(&self, now: DateTime<Utc>) -> HourlyReport {
        let current_metrics = self.collector.get_current_metrics();
        let records = aggregate::since(&self.collector.history(), now - Duration::days(1));

        HourlyReport {
            report_type: "hourly".to_string(),
            generated_at: now,
            current_metrics,
            hourly_statistics: hourly_statistics(&records),
            performance_trends: hourly_performance(&records),
        }
    }

    /// Report over the full retained history
    pub fn generate_daily_report(&self) -> DailyReport {
        self.generate_daily_report_at(Utc::now())
    }

    /// [`generate_daily_report`](Self::generate_daily_report) for a given clock reading
    pub fn generate_daily_report_at(&self, now: DateTime<Utc>) -> DailyReport {
        let current_metrics = self.collector.get_current_metrics();
        let records = self.collector.history();

        DailyReport {
            report_type: "daily".to_string(),
            generated_at: now,
            current_metrics,
            daily_statistics: daily_statistics(&records),
            user_analytics: user_analytics(&records, now),
            performance_analytics: performance_analytics(&records),
            content_analytics: content_analytics(&records),
        }
    }

    /// Titled summary of the lifetime counters
    pub fn usage_summary(&self, period: UsagePeriod) -> UsageSummary {
        let (title, timeframe) = period.labels();
        let metrics = self.collector.get_current_metrics();

        UsageSummary {
            title: title.to_string(),
            generated_at: Utc::now(),
            timeframe: timeframe.to_string(),
            metrics: UsageMetrics {
                total_requests: metrics.total_requests,
                successful_requests: metrics.successful_requests,
                failed_requests: metrics.failed_requests,
                success_rate: metrics.success_rate,
                average_latency_ms: metrics.average_latency_ms,
            },
            usage: UsageBreakdown {
                top_tools: metrics.top_tools,
                top_agents: metrics.top_agents,
                guardrail_blocks: metrics.guardrail_blocks,
            },
        }
    }

    /// Write the hourly report and, on the first tick after midnight, the daily one
    pub async fn persist_reports(&self) -> Result<Vec<PathBuf>> {
        self.persist_reports_at(Utc::now()).await
    }

    /// [`persist_reports`](Self::persist_reports) for a given clock reading
    pub async fn persist_reports_at(&self, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();

        let hourly = self.generate_hourly_report_at(now);
        let path = self
            .store
            .write(&timestamped_name("hourly_report", now), &hourly)
            .await?;
        info!(path = %path.display(), "Generated hourly analytics report");
        written.push(path);

        let today = now.date_naive();
        let due = now.hour() == 0 && *self.last_daily.lock() != Some(today);
        if due {
            let daily = self.generate_daily_report_at(now);
            let name = format!("daily_report_{}.json", now.format("%Y%m%d"));
            let path = self.store.write(&name, &daily).await?;
            *self.last_daily.lock() = Some(today);
            info!(path = %path.display(), "Generated daily analytics report");
            written.push(path);
        }

        Ok(written)
    }

    /// Cadence of the report loop
    pub fn cadence(&self) -> Cadence {
        Cadence::new(self.config.interval, self.config.retry_interval)
    }
}
