//! Alert lifecycle: trigger, deduplicate, resolve

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::notifier::{dispatch, AlertHandler, EscalationHandler, HandlerOutcome, LogHandler};
use super::repository::AlertRepository;
use crate::bounded::BoundedPush;
use crate::collector::MetricsCollector;
use crate::config::AlertingConfig;
use crate::error::Result;
use crate::models::{Alert, AlertType, Severity};
use crate::performance::PerformanceTracker;

#[derive(Debug, Default)]
pub(super) struct AlertState {
    pub(super) active: HashMap<String, Alert>,
    pub(super) resolved: VecDeque<Alert>,
    /// ids currently held in `resolved`
    pub(super) resolved_ids: HashSet<String>,
    /// condition key -> id of the active alert raised for it
    pub(super) condition_keys: HashMap<String, String>,
}

impl AlertState {
    /// Id for a new alert derived as `base`.
    ///
    /// An archived id is never reused: the first free `<base>_<n>` is taken
    /// instead. `Err` carries the id of an active alert for the same derivation.
    fn fresh_id(&self, base: &str) -> std::result::Result<String, String> {
        let mut candidate = base.to_string();
        let mut n = 0u32;
        loop {
            if self.active.contains_key(&candidate) {
                return Err(candidate);
            }
            if !self.resolved_ids.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
            candidate = format!("{base}_{n}");
        }
    }
}

/// Result of a trigger attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triggered {
    /// A new alert became active
    New(String),
    /// An active alert already covers the condition; carries its id
    Duplicate(String),
}

impl Triggered {
    /// Id of the active alert
    pub fn id(&self) -> &str {
        match self {
            Triggered::New(id) | Triggered::Duplicate(id) => id,
        }
    }

    /// Whether a new alert was raised
    pub fn is_new(&self) -> bool {
        matches!(self, Triggered::New(_))
    }
}

/// Owns every alert from trigger to resolution
pub struct AlertSystem {
    pub(super) config: AlertingConfig,
    pub(super) collector: Arc<MetricsCollector>,
    pub(super) tracker: Arc<PerformanceTracker>,
    pub(super) state: Mutex<AlertState>,
    handlers: RwLock<HashMap<AlertType, Vec<Arc<dyn AlertHandler>>>>,
    thresholds: RwLock<HashMap<AlertType, HashMap<String, f64>>>,
    repository: AlertRepository,
}

impl AlertSystem {
    /// Create an alert system reading condition data from `collector` and `tracker`.
    ///
    /// Fails when the configured thresholds name an unknown alert type.
    pub fn new(
        config: AlertingConfig,
        collector: Arc<MetricsCollector>,
        tracker: Arc<PerformanceTracker>,
    ) -> Result<Self> {
        let mut thresholds: HashMap<AlertType, HashMap<String, f64>> = HashMap::new();
        for (alert_type, table) in &config.thresholds {
            let alert_type = alert_type.parse::<AlertType>()?;
            thresholds
                .entry(alert_type)
                .or_default()
                .extend(table.iter().map(|(k, v)| (k.clone(), *v)));
        }

        let mut handlers: HashMap<AlertType, Vec<Arc<dyn AlertHandler>>> = HashMap::new();
        for alert_type in AlertType::ALL {
            let defaults: Vec<Arc<dyn AlertHandler>> =
                vec![Arc::new(LogHandler), Arc::new(EscalationHandler)];
            handlers.insert(alert_type, defaults);
        }

        let repository = AlertRepository::new(&config.directory, config.writer_buffer);

        Ok(Self {
            config,
            collector,
            tracker,
            state: Mutex::new(AlertState::default()),
            handlers: RwLock::new(handlers),
            thresholds: RwLock::new(thresholds),
            repository,
        })
    }

    /// Raise an alert and return its id.
    ///
    /// Triggering the same type and message twice within one second yields
    /// the same id; the second call returns it without notifying handlers again.
    /// Ids of resolved alerts still in the archive are not reused.
    pub fn trigger_alert(
        &self,
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        details: Map<String, Value>,
    ) -> String {
        self.raise(alert_type, severity, message.into(), details, None, Utc::now())
            .id()
            .to_string()
    }

    /// Raise an alert unless one is already active for `condition_key`.
    ///
    /// The check and the insert happen under one lock acquisition.
    pub fn trigger_alert_for_condition(
        &self,
        condition_key: impl Into<String>,
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        details: Map<String, Value>,
    ) -> Triggered {
        self.raise(
            alert_type,
            severity,
            message.into(),
            details,
            Some(condition_key.into()),
            Utc::now(),
        )
    }

    pub(super) fn raise(
        &self,
        alert_type: AlertType,
        severity: Severity,
        message: String,
        details: Map<String, Value>,
        condition_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Triggered {
        let mut alert = Alert::new(alert_type, severity, message, details, now);
        alert.condition_key = condition_key;

        {
            let mut state = self.state.lock();
            if let Some(key) = &alert.condition_key {
                if let Some(existing) = state.condition_keys.get(key) {
                    debug!(condition = %key, alert_id = %existing, "Condition already alerted");
                    return Triggered::Duplicate(existing.clone());
                }
            }
            match state.fresh_id(&alert.id) {
                Ok(id) => alert.id = id,
                Err(active) => {
                    debug!(alert_id = %active, "Alert already active");
                    return Triggered::Duplicate(active);
                }
            }

            if let Some(key) = &alert.condition_key {
                state.condition_keys.insert(key.clone(), alert.id.clone());
            }
            state.active.insert(alert.id.clone(), alert.clone());
            gauge!("agentwatch_active_alerts").set(state.active.len() as f64);
        }

        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "Alert triggered"
        );
        counter!(
            "agentwatch_alerts_triggered_total",
            "type" => alert.alert_type.as_str(),
            "severity" => alert.severity.as_str()
        )
        .increment(1);

        self.repository.enqueue(alert.clone());
        self.notify(&alert);
        Triggered::New(alert.id)
    }

    /// Run the handlers registered for the alert's type
    fn notify(&self, alert: &Alert) -> Vec<HandlerOutcome> {
        let handlers = self
            .handlers
            .read()
            .get(&alert.alert_type)
            .cloned()
            .unwrap_or_default();
        dispatch(&handlers, alert)
    }

    /// Resolve an active alert; false when `alert_id` is not active
    pub fn resolve_alert(&self, alert_id: &str, resolution_message: impl Into<String>) -> bool {
        self.resolve_alert_at(alert_id, resolution_message.into(), Utc::now())
    }

    pub(super) fn resolve_alert_at(
        &self,
        alert_id: &str,
        resolution_message: String,
        now: DateTime<Utc>,
    ) -> bool {
        let alert = {
            let mut state = self.state.lock();
            let Some(mut alert) = state.active.remove(alert_id) else {
                return false;
            };
            alert.resolve(resolution_message, now);

            if let Some(key) = &alert.condition_key {
                if state.condition_keys.get(key).map(String::as_str) == Some(alert_id) {
                    state.condition_keys.remove(key);
                }
            }
            if let Some(evicted) = state
                .resolved
                .push_bounded(alert.clone(), self.config.max_resolved)
            {
                state.resolved_ids.remove(&evicted.id);
            }
            state.resolved_ids.insert(alert.id.clone());
            gauge!("agentwatch_active_alerts").set(state.active.len() as f64);
            alert
        };

        info!(
            alert_id = %alert.id,
            alert_type = %alert.alert_type,
            resolution = alert.resolution_message.as_deref().unwrap_or_default(),
            "Alert resolved"
        );
        counter!("agentwatch_alerts_resolved_total", "type" => alert.alert_type.as_str())
            .increment(1);
        self.repository.enqueue(alert);
        true
    }

    /// Active alerts, optionally filtered by type and minimum severity, oldest first
    pub fn get_active_alerts(
        &self,
        alert_type: Option<AlertType>,
        min_severity: Option<Severity>,
    ) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .state
            .lock()
            .active
            .values()
            .filter(|a| alert_type.map_or(true, |t| a.alert_type == t))
            .filter(|a| min_severity.map_or(true, |s| a.severity.at_least(s)))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        alerts
    }

    /// Active alert by id
    pub fn active_alert(&self, alert_id: &str) -> Option<Alert> {
        self.state.lock().active.get(alert_id).cloned()
    }

    /// Most recently resolved alerts, newest first
    pub fn get_resolved_alerts(&self, limit: usize) -> Vec<Alert> {
        self.state
            .lock()
            .resolved
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Add a handler for one alert type
    pub fn register_handler(&self, alert_type: AlertType, handler: impl AlertHandler + 'static) {
        let handler: Arc<dyn AlertHandler> = Arc::new(handler);
        info!(alert_type = %alert_type, handler = handler.name(), "Registered alert handler");
        self.handlers
            .write()
            .entry(alert_type)
            .or_default()
            .push(handler);
    }

    /// Set one threshold of an alert type
    pub fn set_threshold(&self, alert_type: AlertType, key: &str, value: f64) {
        self.thresholds
            .write()
            .entry(alert_type)
            .or_default()
            .insert(key.to_string(), value);
        info!(alert_type = %alert_type, key, value, "Set alert threshold");
    }

    /// One threshold of an alert type
    pub fn threshold(&self, alert_type: AlertType, key: &str) -> Option<f64> {
        self.thresholds
            .read()
            .get(&alert_type)
            .and_then(|t| t.get(key))
            .copied()
    }

    /// Record writer
    pub fn repository(&self) -> &AlertRepository {
        &self.repository
    }
}

impl std::fmt::Debug for AlertSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AlertSystem")
            .field("active", &state.active.len())
            .field("resolved", &state.resolved.len())
            .field("repository", &self.repository)
            .finish()
    }
}

/// Build an alert detail map from a JSON object literal
pub fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MetricsConfig, PerformanceConfig};
    use crate::error::Error;
    use crate::alerting::handler_fn;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn system(config: AlertingConfig) -> AlertSystem {
        AlertSystem::new(
            config,
            Arc::new(MetricsCollector::new(MetricsConfig::default())),
            Arc::new(PerformanceTracker::new(PerformanceConfig::default())),
        )
        .unwrap()
    }

    #[test]
    fn test_trigger_and_resolve() {
        let alerts = system(AlertingConfig::default());
        let id = alerts.trigger_alert(
            AlertType::System,
            Severity::Critical,
            "Database unreachable",
            details(json!({"component": "db"})),
        );

        let active = alerts.get_active_alerts(None, None);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, id);
        assert_eq!(active[0].detail_str("component"), Some("db"));

        assert!(alerts.resolve_alert(&id, "Database back"));
        assert!(alerts.get_active_alerts(None, None).is_empty());
        assert!(!alerts.resolve_alert(&id, "again"));

        let resolved = alerts.get_resolved_alerts(10);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolution_message.as_deref(), Some("Database back"));
        assert!(resolved[0].resolved_at.is_some());
    }

    #[test]
    fn test_resolve_unknown_alert() {
        let alerts = system(AlertingConfig::default());
        assert!(!alerts.resolve_alert("nope", "n/a"));
    }

    #[test]
    fn test_filters() {
        let alerts = system(AlertingConfig::default());
        alerts.trigger_alert(AlertType::Usage, Severity::Info, "busy", Map::new());
        alerts.trigger_alert(AlertType::Usage, Severity::Error, "very busy", Map::new());
        alerts.trigger_alert(AlertType::Security, Severity::Critical, "bad token", Map::new());

        assert_eq!(alerts.get_active_alerts(Some(AlertType::Usage), None).len(), 2);
        assert_eq!(alerts.get_active_alerts(None, Some(Severity::Error)).len(), 2);
        assert_eq!(
            alerts
                .get_active_alerts(Some(AlertType::Usage), Some(Severity::Warning))
                .len(),
            1
        );
        assert_eq!(alerts.get_active_alerts(None, Some(Severity::Info)).len(), 3);
    }

    #[test]
    fn test_same_message_same_second_is_one_alert() {
        let alerts = system(AlertingConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        alerts.register_handler(
            AlertType::Security,
            handler_fn("count", move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        let now = Utc::now();
        let a = alerts.raise(AlertType::Security, Severity::Error, "x".into(), Map::new(), None, now);
        let b = alerts.raise(AlertType::Security, Severity::Error, "x".into(), Map::new(), None, now);
        assert!(a.is_new());
        assert_eq!(b, Triggered::Duplicate(a.id().to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(alerts.get_active_alerts(None, None).len(), 1);
    }

    #[test]
    fn test_retrigger_after_resolve_gets_new_id() {
        let alerts = system(AlertingConfig::default());
        let now = Utc::now();
        let raise = || {
            alerts.raise(AlertType::System, Severity::Critical, "db down".into(), Map::new(), None, now)
        };

        let first = raise();
        assert!(alerts.resolve_alert_at(first.id(), "recovered".into(), now));

        let second = raise();
        assert!(second.is_new());
        assert_eq!(second.id(), format!("{}_1", first.id()));
        assert!(alerts.active_alert(first.id()).is_none());
        assert_eq!(alerts.get_resolved_alerts(10)[0].id, first.id());

        // The fresh alert is now the active one for this derivation.
        assert_eq!(raise(), Triggered::Duplicate(second.id().to_string()));

        assert!(alerts.resolve_alert_at(second.id(), "recovered".into(), now));
        assert_eq!(raise().id(), format!("{}_2", first.id()));
    }

    #[test]
    fn test_evicted_ids_leave_the_archive_index() {
        let alerts = system(AlertingConfig {
            max_resolved: 2,
            ..AlertingConfig::default()
        });
        for i in 0..4 {
            let id = alerts.trigger_alert(AlertType::Usage, Severity::Info, format!("u{i}"), Map::new());
            alerts.resolve_alert(&id, "done");
        }
        let state = alerts.state.lock();
        assert_eq!(state.resolved_ids.len(), 2);
        assert!(state.resolved.iter().all(|a| state.resolved_ids.contains(&a.id)));
    }

    #[test]
    fn test_condition_key_dedup() {
        let alerts = system(AlertingConfig::default());
        let first = alerts.trigger_alert_for_condition(
            "performance_api_20250101_10",
            AlertType::Performance,
            Severity::Warning,
            "slow",
            Map::new(),
        );
        let second = alerts.trigger_alert_for_condition(
            "performance_api_20250101_10",
            AlertType::Performance,
            Severity::Warning,
            "still slow",
            Map::new(),
        );
        assert!(first.is_new());
        assert_eq!(second, Triggered::Duplicate(first.id().to_string()));

        assert!(alerts.resolve_alert(first.id(), "ok"));
        let third = alerts.trigger_alert_for_condition(
            "performance_api_20250101_10",
            AlertType::Performance,
            Severity::Warning,
            "slow again",
            Map::new(),
        );
        assert!(third.is_new());
    }

    #[test]
    fn test_handlers_receive_alert_and_failures_are_contained() {
        let alerts = system(AlertingConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        alerts.register_handler(
            AlertType::Guardrail,
            handler_fn("broken", |_| Err(Error::internal("unavailable"))),
        );
        alerts.register_handler(
            AlertType::Guardrail,
            handler_fn("sink", move |alert: &Alert| {
                sink.lock().push(alert.message.clone());
                Ok(())
            }),
        );

        let id = alerts.trigger_alert(AlertType::Guardrail, Severity::Warning, "blocked", Map::new());
        assert!(alerts.active_alert(&id).is_some());
        assert_eq!(*seen.lock(), vec!["blocked".to_string()]);

        // Handlers are per type.
        alerts.trigger_alert(AlertType::System, Severity::Warning, "other", Map::new());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_handler_may_call_back_into_system() {
        let alerts = Arc::new(system(AlertingConfig::default()));
        let inner = Arc::downgrade(&alerts);
        alerts.register_handler(
            AlertType::Usage,
            handler_fn("auto-ack", move |alert: &Alert| {
                if let Some(alerts) = inner.upgrade() {
                    alerts.resolve_alert(&alert.id, "acknowledged");
                }
                Ok(())
            }),
        );

        let id = alerts.trigger_alert(AlertType::Usage, Severity::Info, "spike", Map::new());
        assert!(alerts.active_alert(&id).is_none());
        assert_eq!(alerts.get_resolved_alerts(1)[0].id, id);
    }

    #[test]
    fn test_resolved_archive_is_bounded() {
        let alerts = system(AlertingConfig {
            max_resolved: 3,
            ..AlertingConfig::default()
        });
        for i in 0..5 {
            let id = alerts.trigger_alert(AlertType::System, Severity::Info, format!("m{i}"), Map::new());
            alerts.resolve_alert(&id, "done");
        }
        let resolved = alerts.get_resolved_alerts(10);
        assert_eq!(resolved.len(), 3);
        assert_eq!(resolved[0].message, "m4");
        assert_eq!(resolved[2].message, "m2");
    }

    #[test]
    fn test_thresholds() {
        let alerts = system(AlertingConfig::default());
        assert_eq!(alerts.threshold(AlertType::ErrorRate, "max_error_rate"), Some(0.05));
        alerts.set_threshold(AlertType::ErrorRate, "max_error_rate", 0.2);
        assert_eq!(alerts.threshold(AlertType::ErrorRate, "max_error_rate"), Some(0.2));
        assert_eq!(alerts.threshold(AlertType::Security, "anything"), None);
    }

    #[test]
    fn test_unknown_threshold_type_is_rejected() {
        let mut config = AlertingConfig::default();
        config
            .thresholds
            .insert("latency".to_string(), BTreeMap::from([("x".to_string(), 1.0)]));

        let result = AlertSystem::new(
            config,
            Arc::new(MetricsCollector::new(MetricsConfig::default())),
            Arc::new(PerformanceTracker::new(PerformanceConfig::default())),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
