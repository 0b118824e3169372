//! Alerting for AgentWatch
//!
//! [`AlertSystem`] owns the alert lifecycle `active -> resolved`. Alerts are
//! raised explicitly through [`AlertSystem::trigger_alert`] or by the monitor
//! cycle, which checks category p95 latency, the lifetime error rate and the
//! guardrail block rate. Conditions are deduplicated per hour bucket, and
//! performance alerts resolve themselves once latency recovers.

mod evaluator;
mod notifier;
mod repository;
mod system;

pub use evaluator::CycleReport;
pub use notifier::{
    dispatch, handler_fn, AlertHandler, EscalationHandler, FnHandler, HandlerOutcome, LogHandler,
};
pub use repository::AlertRepository;
pub use system::{details, AlertSystem, Triggered};
