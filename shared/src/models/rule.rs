//! Configurable alert rules: conditions, actions, schedules and escalations

use chrono::{DateTime, Datelike, NaiveTime, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Alert category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    Stock,
    Expiry,
    Supplier,
    Cost,
    Quality,
}

impl AlertCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertCategory::Stock => "stock",
            AlertCategory::Expiry => "expiry",
            AlertCategory::Supplier => "supplier",
            AlertCategory::Cost => "cost",
            AlertCategory::Quality => "quality",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "stock" => Some(AlertCategory::Stock),
            "expiry" => Some(AlertCategory::Expiry),
            "supplier" => Some(AlertCategory::Supplier),
            "cost" => Some(AlertCategory::Cost),
            "quality" => Some(AlertCategory::Quality),
            _ => None,
        }
    }
}

/// Alert severity, ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(AlertSeverity::Info),
            "warning" => Some(AlertSeverity::Warning),
            "critical" => Some(AlertSeverity::Critical),
            _ => None,
        }
    }
}

/// Metric a rule condition evaluates against, computed per in-scope item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleMetric {
    CurrentStock,
    AvailableStock,
    ReservedStock,
    StockValue,
    UnitCost,
    /// Days until the soonest expiry among the item's active lots.
    DaysUntilExpiry,
    /// Units moved out over the trailing 24 hours.
    Outflow24h,
    /// Units moved in over the trailing 24 hours.
    Inflow24h,
    ProductId,
    StoreId,
}

/// Comparison operator for rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    /// Substring match; text metrics only.
    Contains,
}

/// Threshold value a condition compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Number(Decimal),
    Text(String),
}

/// A single rule condition. All conditions of a rule must hold (logical AND)
/// for the same item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCondition {
    pub metric: RuleMetric,
    pub op: Comparison,
    pub value: ConditionValue,
    /// Restrict the condition to one item.
    pub item_id: Option<Uuid>,
    /// Restrict the condition to one store location.
    pub store_id: Option<Uuid>,
}

/// Delivery channel for alert notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    Email,
    Sms,
    Push,
    Webhook,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationChannel::Email => "email",
            NotificationChannel::Sms => "sms",
            NotificationChannel::Push => "push",
            NotificationChannel::Webhook => "webhook",
        }
    }
}

/// Action executed when a rule fires or an escalation is due.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    /// Fan out to delivery channels via the notification dispatcher.
    Notify {
        channels: Vec<NotificationChannel>,
        template: Option<String>,
    },
    /// POST the alert payload to a configured URL.
    Webhook { url: String },
    /// Invoke the registered auto-ordering hook.
    AutoOrder,
    /// Invoke the registered stock-adjustment hook.
    StockAdjustment,
}

/// A weekly time window during which a rule may fire.
///
/// Times are interpreted in UTC. A window whose `start` is later than its
/// `end` spans midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub days: Vec<Weekday>,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ScheduleWindow {
    /// Whether `at` falls inside this window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if !self.days.contains(&at.weekday()) {
            return false;
        }
        let t = NaiveTime::from_hms_opt(at.hour(), at.minute(), at.second())
            .unwrap_or(self.start);
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

/// One step of a rule's escalation ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationStep {
    pub level: i32,
    pub delay_minutes: i64,
    pub actions: Vec<RuleAction>,
}

/// A configurable alert rule, evaluated on a fixed polling cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: Uuid,
    pub name: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    /// Empty schedule means the rule may fire at any time.
    pub schedule: Vec<ScheduleWindow>,
    pub cooldown_minutes: i64,
    pub escalations: Vec<EscalationStep>,
    pub is_active: bool,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertRule {
    /// Whether `at` falls inside at least one schedule window.
    pub fn in_schedule(&self, at: DateTime<Utc>) -> bool {
        self.schedule.is_empty() || self.schedule.iter().any(|w| w.contains(at))
    }

    /// Whether the rule's cooldown window is still running at `at`.
    pub fn in_cooldown(&self, at: DateTime<Utc>) -> bool {
        match self.last_triggered_at {
            Some(triggered) => triggered + chrono::Duration::minutes(self.cooldown_minutes) > at,
            None => false,
        }
    }
}
