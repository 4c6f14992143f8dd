//! Notification dispatch boundary and alert action execution
//!
//! The core decides what to send and when; delivery itself happens behind
//! the `NotificationDispatcher` trait. Delivery outcomes are logged and
//! never inspected beyond that.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use shared::{Alert, NotificationChannel, RuleAction};

use crate::error::{AppError, AppResult};

/// Channel sender boundary.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Deliver `alert` over `channel`, optionally with a message template.
    async fn send(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        template: Option<&str>,
    ) -> Result<(), String>;
}

/// Dispatcher that records deliveries as log lines.
///
/// Stands in wherever no real channel sender is wired up.
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        _template: Option<&str>,
    ) -> Result<(), String> {
        tracing::info!(
            alert_id = %alert.id,
            channel = channel.as_str(),
            severity = alert.severity.as_str(),
            title = %alert.title,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Callback invoked for `auto_order` / `stock_adjustment` actions.
pub type ActionHook = Arc<dyn Fn(&Alert) + Send + Sync>;

/// Hooks into external ordering and ledger flows. The core only guarantees
/// that a registered hook is invoked; what it does is not this crate's
/// concern.
#[derive(Clone, Default)]
pub struct ActionHooks {
    pub auto_order: Option<ActionHook>,
    pub stock_adjustment: Option<ActionHook>,
}

/// Alert payload POSTed by webhook actions.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    alert_id: Uuid,
    kind: &'a str,
    category: &'a str,
    severity: &'a str,
    title: &'a str,
    message: &'a str,
    item_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl<'a> WebhookPayload<'a> {
    fn from_alert(alert: &'a Alert) -> Self {
        Self {
            alert_id: alert.id,
            kind: &alert.kind,
            category: alert.category.as_str(),
            severity: alert.severity.as_str(),
            title: &alert.title,
            message: &alert.message,
            item_id: alert.item_id,
            created_at: alert.created_at,
        }
    }
}

/// Runs a rule's (or escalation's) actions against an alert.
///
/// Fan-out is best-effort, not transactional: each action's failure is
/// caught and logged, and never prevents sibling actions from running.
pub struct ActionExecutor {
    dispatcher: Arc<dyn NotificationDispatcher>,
    http: reqwest::Client,
    hooks: ActionHooks,
}

impl ActionExecutor {
    /// Create a new ActionExecutor instance.
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>, hooks: ActionHooks) -> Self {
        Self {
            dispatcher,
            http: reqwest::Client::new(),
            hooks,
        }
    }

    /// Execute every action; returns how many failed.
    pub async fn execute_all(&self, alert: &Alert, actions: &[RuleAction]) -> usize {
        let mut failed = 0;
        for action in actions {
            if let Err(e) = self.execute(alert, action).await {
                failed += 1;
                tracing::error!(
                    alert_id = %alert.id,
                    error = %e,
                    "alert action failed; continuing with remaining actions"
                );
            }
        }
        failed
    }

    async fn execute(&self, alert: &Alert, action: &RuleAction) -> AppResult<()> {
        match action {
            RuleAction::Notify { channels, template } => {
                for channel in channels {
                    if let Err(e) = self
                        .dispatcher
                        .send(alert, *channel, template.as_deref())
                        .await
                    {
                        tracing::error!(
                            alert_id = %alert.id,
                            channel = channel.as_str(),
                            error = %e,
                            "notification delivery failed"
                        );
                    }
                }
                Ok(())
            }
            RuleAction::Webhook { url } => {
                let response = self
                    .http
                    .post(url)
                    .json(&WebhookPayload::from_alert(alert))
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::ActionExecution(format!("webhook request failed: {}", e))
                    })?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(AppError::ActionExecution(format!(
                        "webhook returned {}",
                        response.status()
                    )))
                }
            }
            RuleAction::AutoOrder => {
                match &self.hooks.auto_order {
                    Some(hook) => hook(alert),
                    None => tracing::warn!(
                        alert_id = %alert.id,
                        "auto_order action configured but no hook registered"
                    ),
                }
                Ok(())
            }
            RuleAction::StockAdjustment => {
                match &self.hooks.stock_adjustment {
                    Some(hook) => hook(alert),
                    None => tracing::warn!(
                        alert_id = %alert.id,
                        "stock_adjustment action configured but no hook registered"
                    ),
                }
                Ok(())
            }
        }
    }
}
