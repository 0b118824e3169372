//! Alert handlers and synchronous dispatch

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::models::{Alert, Severity};

/// Receives every alert of the types it is registered for
///
/// Handlers run synchronously on the triggering task, after the alert
/// system's lock has been released; they may call back into the system.
pub trait AlertHandler: Send + Sync {
    /// Name used in logs and dispatch outcomes
    fn name(&self) -> &str;

    /// Handle one alert
    fn handle(&self, alert: &Alert) -> Result<()>;
}

/// Handler backed by a closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap a closure as a named handler
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&Alert) -> Result<()> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

impl<F> AlertHandler for FnHandler<F>
where
    F: Fn(&Alert) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, alert: &Alert) -> Result<()> {
        (self.f)(alert)
    }
}

/// Logs every alert at a level matching its severity
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl AlertHandler for LogHandler {
    fn name(&self) -> &str {
        "log"
    }

    fn handle(&self, alert: &Alert) -> Result<()> {
        match alert.severity {
            Severity::Info => info!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                "ALERT [{}] {}: {}", alert.severity, alert.alert_type, alert.message
            ),
            Severity::Warning => warn!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                "ALERT [{}] {}: {}", alert.severity, alert.alert_type, alert.message
            ),
            Severity::Error | Severity::Critical => error!(
                alert_id = %alert.id,
                alert_type = %alert.alert_type,
                "ALERT [{}] {}: {}", alert.severity, alert.alert_type, alert.message
            ),
        }
        Ok(())
    }
}

/// Escalates critical alerts; ignores everything else
#[derive(Debug, Default, Clone, Copy)]
pub struct EscalationHandler;

impl AlertHandler for EscalationHandler {
    fn name(&self) -> &str {
        "escalation"
    }

    fn handle(&self, alert: &Alert) -> Result<()> {
        if alert.severity != Severity::Critical {
            return Ok(());
        }

        error!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            details = %serde_json::Value::Object(alert.details.clone()),
            "CRITICAL ALERT ESCALATION: {}",
            alert.message
        );
        counter!("agentwatch_alerts_escalated_total", "type" => alert.alert_type.as_str())
            .increment(1);
        Ok(())
    }
}

/// Result of running one handler
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    /// Handler name
    pub handler: String,
    /// Whether the handler returned `Ok`
    pub success: bool,
    /// Failure message, if the handler failed or panicked
    pub error: Option<String>,
    /// When the handler finished
    pub handled_at: DateTime<Utc>,
}

/// Run every handler against `alert`.
///
/// Failures and panics are caught per handler and logged; they never stop
/// the remaining handlers.
pub fn dispatch(handlers: &[Arc<dyn AlertHandler>], alert: &Alert) -> Vec<HandlerOutcome> {
    handlers
        .iter()
        .map(|handler| {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(alert)))
                .unwrap_or_else(|payload| {
                    Err(Error::handler(handler.name(), panic_message(payload.as_ref())))
                });

            if let Err(e) = &result {
                error!(
                    alert_id = %alert.id,
                    handler = handler.name(),
                    error = %e,
                    "Alert handler failed"
                );
                counter!("agentwatch_alert_handler_failures_total").increment(1);
            } else {
                debug!(alert_id = %alert.id, handler = handler.name(), "Alert handled");
            }

            HandlerOutcome {
                handler: handler.name().to_string(),
                success: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                handled_at: Utc::now(),
            }
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
