//! # AgentWatch
//!
//! In-process telemetry and alerting for conversational agent services.
//!
//! AgentWatch tracks per-request metrics, times named operations against
//! per-category latency thresholds, raises and resolves alerts, and writes
//! periodic JSON snapshots and analytics reports for reporting tools.
//!
//! ## Architecture
//!
//! - **Collector**: one metrics context per in-flight request, lifetime counters, bounded history
//! - **Performance**: named spans grouped by category, p95 statistics, threshold warnings
//! - **Alerting**: alert lifecycle, handlers, hourly-deduplicated detectors, auto-resolution
//! - **Analytics**: hourly and daily reports over the request history
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the background writers, monitor and reports
//! agentwatch serve --data-dir ./telemetry
//!
//! # Drive synthetic traffic through a fresh instance
//! agentwatch simulate --requests 50
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod alerting;
pub mod analytics;
mod bounded;
pub mod collector;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod performance;
pub mod schedule;
pub mod service;
pub mod stats;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use service::Telemetry;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{handler_fn, AlertHandler, AlertSystem, Triggered};
    pub use crate::analytics::AnalyticsService;
    pub use crate::collector::MetricsCollector;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::performance::{PerformanceTracker, TraceOptions};
    pub use crate::service::Telemetry;
}
