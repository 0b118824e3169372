//! Tracing subscriber setup

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// File name prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "agentwatch.log";

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    Pretty,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::config(format!("unknown log format '{other}'"))),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. When a log
/// directory is configured, JSON lines are also written to a daily rolling
/// file; keep the returned guard alive until exit so buffered lines are
/// flushed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let format: LogFormat = config.format.parse()?;
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| Error::config(format!("invalid log level '{}': {e}", config.level)))?;

    let pretty = (format == LogFormat::Pretty).then(|| fmt::layer().with_target(true));
    let json = (format == LogFormat::Json).then(|| fmt::layer().json().with_current_span(true));

    let (file, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .with(file)
        .try_init()
        .map_err(|e| Error::config(format!("failed to install subscriber: {e}")))?;

    info!(
        level = %config.level,
        format = %config.format,
        directory = ?config.directory,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!(matches!("xml".parse::<LogFormat>(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_format_fails_before_install() {
        let config = LoggingConfig {
            format: "yaml".to_string(),
            ..LoggingConfig::default()
        };
        assert!(init(&config).is_err());
    }
}
