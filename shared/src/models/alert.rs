//! Alert instances and their timed escalations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AlertCategory, AlertSeverity, RuleAction};

/// Alert lifecycle: `active -> acknowledged -> resolved`, terminal `resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(AlertStatus::Active),
            "acknowledged" => Some(AlertStatus::Acknowledged),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

/// One trigger occurrence.
///
/// While an alert with a given `(item_id, kind)` is still `active`, repeated
/// triggers must not create a second instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    /// Originating rule; `None` for threshold-derived alerts.
    pub rule_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    /// Deduplication key, e.g. `low_stock`, `expiry_critical`, `rule:<uuid>`.
    pub kind: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

/// Escalation task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStatus {
    Pending,
    Fired,
    Cancelled,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Pending => "pending",
            EscalationStatus::Fired => "fired",
            EscalationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EscalationStatus::Pending),
            "fired" => Some(EscalationStatus::Fired),
            "cancelled" => Some(EscalationStatus::Cancelled),
            _ => None,
        }
    }
}

/// A delayed follow-up armed when an alert is created.
///
/// The intended fire time is persisted so pending escalations survive a
/// process restart and can be re-armed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub level: i32,
    pub fire_at: DateTime<Utc>,
    pub actions: Vec<RuleAction>,
    pub status: EscalationStatus,
    pub created_at: DateTime<Utc>,
    pub fired_at: Option<DateTime<Utc>>,
}
