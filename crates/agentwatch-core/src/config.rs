//! Configuration management for AgentWatch

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Prefix for environment overrides, e.g. `AGENTWATCH_ALERTING__CHECK_INTERVAL=30s`
pub const ENV_PREFIX: &str = "AGENTWATCH";

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Request metrics collector configuration
    pub metrics: MetricsConfig,

    /// Performance tracker configuration
    pub performance: PerformanceConfig,

    /// Alerting configuration
    pub alerting: AlertingConfig,

    /// Analytics configuration
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics exporter configuration
    pub exporter: ExporterConfig,
}

impl Config {
    /// Load configuration: defaults, then an optional file, then environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Point every artifact directory below `root`
    pub fn with_root(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        self.metrics.directory = root.join("metrics");
        self.performance.directory = root.join("performance");
        self.alerting.directory = root.join("alerts");
        self.analytics.directory = root.join("analytics");
        self
    }
}

/// Request metrics collector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Directory for metrics snapshots
    pub directory: PathBuf,
    /// Capacity of the completed-request history ring
    pub max_historical: usize,
    /// Number of recent records embedded in each snapshot
    pub recent_records: usize,
    /// Snapshot cadence
    #[serde(with = "humantime_serde")]
    pub write_interval: Duration,
    /// Cadence after a failed write
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("metrics"),
            max_historical: 1000,
            recent_records: 100,
            write_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(60),
        }
    }
}

/// Performance tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Directory for performance snapshots
    pub directory: PathBuf,
    /// Completed spans kept per category
    pub max_history_per_category: usize,
    /// Snapshot cadence
    #[serde(with = "humantime_serde")]
    pub write_interval: Duration,
    /// Cadence after a failed write
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
    /// Per-category latency ceilings in milliseconds
    pub thresholds: BTreeMap<String, f64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        let thresholds = [
            ("api_request", 1000.0),
            ("llm_call", 2000.0),
            ("tool_execution", 500.0),
            ("database_query", 100.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            directory: PathBuf::from("performance"),
            max_history_per_category: 1000,
            write_interval: Duration::from_secs(900),
            retry_interval: Duration::from_secs(60),
            thresholds,
        }
    }
}

/// Alerting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    /// Directory for alert records
    pub directory: PathBuf,
    /// Monitor cadence
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
    /// Size of the resolved-alert archive
    pub max_resolved: usize,
    /// Minimum lifetime request count before rate detectors fire
    pub min_requests_for_rate_alerts: u64,
    /// Capacity of the alert writer queue
    pub writer_buffer: usize,
    /// Thresholds keyed by alert type name, then threshold key
    pub thresholds: BTreeMap<String, BTreeMap<String, f64>>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        fn table(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
            entries.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
        }

        let mut thresholds = BTreeMap::new();
        thresholds.insert(
            "performance".to_string(),
            table(&[
                ("api_request_ms", 2000.0),
                ("llm_call_ms", 5000.0),
                ("tool_execution_ms", 1000.0),
            ]),
        );
        thresholds.insert(
            "error_rate".to_string(),
            table(&[("max_error_rate", 0.05), ("window_size", 100.0)]),
        );
        thresholds.insert(
            "guardrail".to_string(),
            table(&[("max_block_rate", 0.10)]),
        );
        thresholds.insert(
            "usage".to_string(),
            table(&[
                ("max_requests_per_minute", 100.0),
                ("max_tokens_per_minute", 10000.0),
            ]),
        );

        Self {
            directory: PathBuf::from("alerts"),
            check_interval: Duration::from_secs(60),
            max_resolved: 1000,
            min_requests_for_rate_alerts: 10,
            writer_buffer: 1024,
            thresholds,
        }
    }
}

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Directory for analytics reports
    pub directory: PathBuf,
    /// Report cadence
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Cadence after a failed report
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("analytics"),
            interval: Duration::from_secs(3600),
            retry_interval: Duration::from_secs(300),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
    /// Directory for rolling JSON log files (console only when unset)
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            directory: None,
        }
    }
}

/// Metrics exporter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    /// Address for the Prometheus scrape endpoint, e.g. `0.0.0.0:9000`
    pub prometheus_listen: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_cadences() {
        let config = Config::default();
        assert_eq!(config.metrics.max_historical, 1000);
        assert_eq!(config.metrics.write_interval, Duration::from_secs(300));
        assert_eq!(config.performance.write_interval, Duration::from_secs(900));
        assert_eq!(config.alerting.check_interval, Duration::from_secs(60));
        assert_eq!(config.performance.thresholds["database_query"], 100.0);
        assert_eq!(
            config.alerting.thresholds["error_rate"]["max_error_rate"],
            0.05
        );
    }

    #[test]
    fn test_load_without_file_yields_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.analytics.interval, Duration::from_secs(3600));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_file_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[alerting]\ncheck_interval = \"15s\"\n\n[metrics]\nmax_historical = 50\n"
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.alerting.check_interval, Duration::from_secs(15));
        assert_eq!(config.metrics.max_historical, 50);
        assert_eq!(config.metrics.recent_records, 100);
    }

    #[test]
    fn test_with_root() {
        let config = Config::default().with_root("/tmp/aw");
        assert_eq!(config.alerting.directory, PathBuf::from("/tmp/aw/alerts"));
        assert_eq!(config.metrics.directory, PathBuf::from("/tmp/aw/metrics"));
    }
}
