//! Telemetry service: builds the components and owns their background loops

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerting::AlertSystem;
use crate::analytics::AnalyticsService;
use crate::collector::MetricsCollector;
use crate::config::Config;
use crate::error::Result;
use crate::performance::PerformanceTracker;
use crate::schedule::run_periodic;

/// How long `shutdown` waits for each loop before aborting it
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// One process-wide telemetry instance
///
/// ```ignore
/// let telemetry = Telemetry::new(Config::load(None)?)?;
/// telemetry.start();
///
/// let collector = telemetry.collector();
/// collector.start_request("r1", "user-1", "session-1");
/// collector.record_tool_call("r1", "get_balance");
/// collector.complete_request("r1", true);
///
/// telemetry.shutdown().await;
/// ```
pub struct Telemetry {
    config: Config,
    collector: Arc<MetricsCollector>,
    tracker: Arc<PerformanceTracker>,
    alerts: Arc<AlertSystem>,
    analytics: Arc<AnalyticsService>,
    token: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Telemetry {
    /// Build every component from `config`
    pub fn new(config: Config) -> Result<Self> {
        let collector = Arc::new(MetricsCollector::new(config.metrics.clone()));
        let tracker = Arc::new(PerformanceTracker::new(config.performance.clone()));
        let alerts = Arc::new(AlertSystem::new(
            config.alerting.clone(),
            collector.clone(),
            tracker.clone(),
        )?);
        let analytics = Arc::new(AnalyticsService::new(
            config.analytics.clone(),
            collector.clone(),
        ));

        Ok(Self {
            config,
            collector,
            tracker,
            alerts,
            analytics,
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Effective configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Request metrics collector
    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Performance tracker
    pub fn tracker(&self) -> Arc<PerformanceTracker> {
        self.tracker.clone()
    }

    /// Alert system
    pub fn alerts(&self) -> Arc<AlertSystem> {
        self.alerts.clone()
    }

    /// Analytics service
    pub fn analytics(&self) -> Arc<AnalyticsService> {
        self.analytics.clone()
    }

    /// Whether the background loops are running
    pub fn is_running(&self) -> bool {
        !self.tasks.lock().is_empty()
    }

    /// Spawn the snapshot writers, the alert monitor, the alert writer and
    /// the analytics loop. Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            warn!("Telemetry already started");
            return;
        }
        if self.token.is_cancelled() {
            warn!("Telemetry was shut down and cannot be restarted");
            return;
        }
        info!("Starting telemetry background tasks");

        let collector = self.collector.clone();
        tasks.push(tokio::spawn(run_periodic(
            "metrics_writer",
            collector.writer_cadence(),
            self.token.clone(),
            move || {
                let collector = collector.clone();
                async move { collector.persist_snapshot().await.map(drop) }
            },
        )));

        let tracker = self.tracker.clone();
        tasks.push(tokio::spawn(run_periodic(
            "performance_writer",
            tracker.writer_cadence(),
            self.token.clone(),
            move || {
                let tracker = tracker.clone();
                async move { tracker.persist_snapshot().await.map(drop) }
            },
        )));

        let alerts = self.alerts.clone();
        tasks.push(tokio::spawn(run_periodic(
            "alert_monitor",
            alerts.monitor_cadence(),
            self.token.clone(),
            move || {
                let alerts = alerts.clone();
                async move {
                    alerts.run_cycle();
                    Ok::<(), crate::error::Error>(())
                }
            },
        )));

        let alerts = self.alerts.clone();
        let token = self.token.clone();
        tasks.push(tokio::spawn(async move {
            alerts.repository().run(token).await;
        }));

        let analytics = self.analytics.clone();
        tasks.push(tokio::spawn(run_periodic(
            "analytics",
            analytics.cadence(),
            self.token.clone(),
            move || {
                let analytics = analytics.clone();
                async move { analytics.persist_reports().await.map(drop) }
            },
        )));
    }

    /// Stop every background loop and wait for it to finish.
    ///
    /// Queued alert records are written before the alert writer exits.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock());
        if tasks.is_empty() {
            return;
        }
        info!(tasks = tasks.len(), "Stopping telemetry background tasks");

        for mut task in tasks {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Telemetry task ended abnormally"),
                Err(_) => {
                    warn!("Telemetry task did not stop in time, aborting");
                    task.abort();
                }
            }
        }
        info!("Telemetry stopped");
    }

    /// Write the metrics and performance snapshots and any queued alert
    /// records now, without waiting for the background cadences.
    pub async fn flush(&self) -> Result<()> {
        self.collector.persist_snapshot().await?;
        self.tracker.persist_snapshot().await?;
        self.alerts.repository().flush().await;
        Ok(())
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("running", &self.is_running())
            .field("alerts", &self.alerts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertType, Severity};
    use tempfile::TempDir;

    fn telemetry(dir: &TempDir) -> Telemetry {
        Telemetry::new(Config::default().with_root(dir.path())).unwrap()
    }

    #[tokio::test]
    async fn test_components_share_state() {
        let dir = TempDir::new().unwrap();
        let telemetry = telemetry(&dir);

        telemetry.collector().start_request("r1", "u", "s");
        telemetry.collector().complete_request("r1", false);
        assert_eq!(
            telemetry.analytics().usage_summary(crate::models::UsagePeriod::All).metrics.failed_requests,
            1
        );
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let telemetry = telemetry(&dir);

        telemetry.start();
        assert!(telemetry.is_running());
        telemetry.start();

        let id = telemetry.alerts().trigger_alert(
            AlertType::System,
            Severity::Critical,
            "Service degraded",
            serde_json::Map::new(),
        );
        telemetry.shutdown().await;
        assert!(!telemetry.is_running());

        let alert_file = dir.path().join("alerts").join(format!("active_system_{id}.json"));
        assert!(alert_file.exists());

        // Stopped for good.
        telemetry.start();
        assert!(!telemetry.is_running());
    }

    #[tokio::test]
    async fn test_flush_without_loops() {
        let dir = TempDir::new().unwrap();
        let telemetry = telemetry(&dir);
        telemetry.alerts().trigger_alert(
            AlertType::Usage,
            Severity::Info,
            "Traffic spike",
            serde_json::Map::new(),
        );

        telemetry.flush().await.unwrap();
        let alerts: Vec<_> = std::fs::read_dir(dir.path().join("alerts")).unwrap().collect();
        assert_eq!(alerts.len(), 1);
        assert!(!dir.path().join("performance").exists());
    }
}
