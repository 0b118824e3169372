//! Alert data models

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of condition an alert reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Latency above a category threshold
    Performance,
    /// Failed request ratio above the allowed rate
    ErrorRate,
    /// Guardrail activity
    Guardrail,
    /// Traffic or token volume
    Usage,
    /// Security relevant event
    Security,
    /// Process or infrastructure event
    System,
}

impl AlertType {
    /// Every alert type, in declaration order
    pub const ALL: [AlertType; 6] = [
        AlertType::Performance,
        AlertType::ErrorRate,
        AlertType::Guardrail,
        AlertType::Usage,
        AlertType::Security,
        AlertType::System,
    ];

    /// Wire name, as used in file names and JSON
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Performance => "performance",
            AlertType::ErrorRate => "error_rate",
            AlertType::Guardrail => "guardrail",
            AlertType::Usage => "usage",
            AlertType::Security => "security",
            AlertType::System => "system",
        }
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AlertType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::validation(format!("unknown alert type '{s}'")))
    }
}

/// Alert severity level
///
/// The derived ordering is the severity ordering: `Info < Warning < Error < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational
    Info,
    /// Warning
    #[default]
    Warning,
    /// Error
    Error,
    /// Critical
    Critical,
}

impl Severity {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// Whether this severity is `minimum` or higher
    pub fn at_least(self, minimum: Severity) -> bool {
        self >= minimum
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(Error::validation(format!("unknown severity '{other}'"))),
        }
    }
}

/// Status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    /// Alert is currently active
    #[default]
    Active,
    /// Alert has been resolved; terminal
    Resolved,
}

impl AlertStatus {
    /// Wire name, used as the file name prefix
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Resolved => "resolved",
        }
    }
}

/// A triggered alert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// `<type>_<YYYYmmddHHMMSS>_<hash(message) % 10000>`
    pub id: String,

    /// What kind of condition fired
    #[serde(rename = "type")]
    pub alert_type: AlertType,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Condition details (category, observed value, threshold, ...)
    pub details: serde_json::Map<String, serde_json::Value>,

    /// When the alert was triggered
    pub created_at: DateTime<Utc>,

    /// Current status
    pub status: AlertStatus,

    /// When the alert was resolved (if resolved)
    pub resolved_at: Option<DateTime<Utc>>,

    /// Why the alert was resolved
    pub resolution_message: Option<String>,

    /// Deduplication key of the condition that raised it, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition_key: Option<String>,
}

impl Alert {
    /// Build an active alert created at `now`
    pub fn new(
        alert_type: AlertType,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Map<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) -> Self {
        let message = message.into();
        Self {
            id: alert_id(alert_type, &message, now),
            alert_type,
            severity,
            message,
            details,
            created_at: now,
            status: AlertStatus::Active,
            resolved_at: None,
            resolution_message: None,
            condition_key: None,
        }
    }

    /// Move to the resolved state
    pub fn resolve(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = AlertStatus::Resolved;
        self.resolved_at = Some(now);
        self.resolution_message = Some(message.into());
    }

    /// Check if the alert is still active
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }

    /// String detail lookup
    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(|v| v.as_str())
    }

    /// Numeric detail lookup
    pub fn detail_f64(&self, key: &str) -> Option<f64> {
        self.details.get(key).and_then(|v| v.as_f64())
    }

    /// File name of the persisted record for the current status
    pub fn file_name(&self) -> String {
        record_file_name(self.status, self.alert_type, &self.id)
    }
}

/// `<status>_<type>_<id>.json`
pub fn record_file_name(status: AlertStatus, alert_type: AlertType, id: &str) -> String {
    format!("{}_{}_{}.json", status.as_str(), alert_type.as_str(), id)
}

/// Derive the alert id: stable for the same type and message within one second
pub fn alert_id(alert_type: AlertType, message: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        alert_type.as_str(),
        now.format("%Y%m%d%H%M%S"),
        crate::stats::stable_hash(message) % 10_000
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[test]
    fn test_severity_total_order() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert!(Severity::Critical.at_least(Severity::Error));
        assert!(!Severity::Warning.at_least(Severity::Error));
    }

    #[rstest]
    #[case("performance", AlertType::Performance)]
    #[case("error_rate", AlertType::ErrorRate)]
    #[case("system", AlertType::System)]
    fn test_alert_type_parse(#[case] raw: &str, #[case] expected: AlertType) {
        assert_eq!(raw.parse::<AlertType>().unwrap(), expected);
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn test_unknown_values_are_rejected() {
        assert!(matches!(
            "latency".parse::<AlertType>(),
            Err(Error::Validation(_))
        ));
        assert!(matches!("fatal".parse::<Severity>(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_alert_id_stable_within_second() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();
        let a = alert_id(AlertType::System, "disk full", now);
        let b = alert_id(AlertType::System, "disk full", now);
        assert_eq!(a, b);
        assert!(a.starts_with("system_20250301123005_"));
    }

    #[test]
    fn test_serialized_shape() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let alert = Alert::new(
            AlertType::ErrorRate,
            Severity::Error,
            "High error rate",
            serde_json::Map::new(),
            now,
        );
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["type"], "error_rate");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["status"], "active");
        assert!(value.get("condition_key").is_none());
        assert_eq!(
            alert.file_name(),
            format!("active_error_rate_{}.json", alert.id)
        );
    }
}
