//! Alert lifecycle: deduplication, dispatch, acknowledgment and resolution

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use shared::{
    Alert, AlertCategory, AlertSeverity, AlertStatus, EscalationStep, InventoryItem,
    NotificationChannel, RuleAction,
};

use crate::error::{AppError, AppResult};
use crate::store::AlertStore;

use super::dispatch::ActionExecutor;
use super::escalation::EscalationScheduler;

/// A request to open an alert, produced by the threshold evaluator or a
/// matching rule.
#[derive(Debug, Clone)]
pub struct AlertRequest {
    pub rule_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
    pub kind: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub actions: Vec<RuleAction>,
    pub escalations: Vec<EscalationStep>,
}

impl AlertRequest {
    /// Request for a threshold-derived alert. These carry no rule, so they
    /// notify over the default channels and never escalate.
    pub fn threshold(
        item: &InventoryItem,
        kind: &str,
        category: AlertCategory,
        severity: AlertSeverity,
        title: &str,
        message: String,
    ) -> Self {
        Self {
            rule_id: None,
            item_id: Some(item.id),
            kind: kind.to_string(),
            category,
            severity,
            title: title.to_string(),
            message,
            actions: vec![RuleAction::Notify {
                channels: vec![NotificationChannel::Email, NotificationChannel::Push],
                template: None,
            }],
            escalations: Vec::new(),
        }
    }
}

/// Owns alert instances from creation through resolution.
pub struct AlertService {
    store: Arc<dyn AlertStore>,
    executor: Arc<ActionExecutor>,
    escalations: Arc<EscalationScheduler>,
}

impl AlertService {
    /// Create a new AlertService instance.
    pub fn new(
        store: Arc<dyn AlertStore>,
        executor: Arc<ActionExecutor>,
        escalations: Arc<EscalationScheduler>,
    ) -> Self {
        Self {
            store,
            executor,
            escalations,
        }
    }

    /// Open an alert for `request` unless one is already active for the same
    /// (item, kind). Returns the alert when a new one was created.
    pub async fn raise(&self, request: AlertRequest) -> AppResult<Option<Alert>> {
        if let Some(existing) = self
            .store
            .find_active_alert(request.item_id, &request.kind)
            .await?
        {
            tracing::debug!(
                alert_id = %existing.id,
                kind = %request.kind,
                "suppressing duplicate trigger; alert still active"
            );
            return Ok(None);
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            rule_id: request.rule_id,
            item_id: request.item_id,
            kind: request.kind,
            category: request.category,
            severity: request.severity,
            title: request.title,
            message: request.message,
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
        };
        self.store.insert_alert(&alert).await?;

        tracing::info!(
            alert_id = %alert.id,
            kind = %alert.kind,
            severity = alert.severity.as_str(),
            "alert created"
        );

        self.executor.execute_all(&alert, &request.actions).await;

        if !request.escalations.is_empty() {
            self.escalations.arm(&alert, &request.escalations).await?;
        }

        Ok(Some(alert))
    }

    /// Feed a batch of threshold requests into the pipeline. Pipeline
    /// failures are logged, not propagated: the ledger mutation that
    /// produced the requests has already committed.
    pub async fn process_requests(&self, requests: Vec<AlertRequest>) -> usize {
        let mut raised = 0;
        for request in requests {
            let kind = request.kind.clone();
            match self.raise(request).await {
                Ok(Some(_)) => raised += 1,
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(kind = %kind, error = %e, "failed to raise alert");
                }
            }
        }
        raised
    }

    /// Acknowledge an active alert, cancelling its pending escalations.
    pub async fn acknowledge(&self, alert_id: Uuid, actor: &str) -> AppResult<Alert> {
        let mut alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or(AppError::AlertNotFound(alert_id))?;

        if alert.status != AlertStatus::Active {
            return Err(AppError::InvalidStateTransition(format!(
                "cannot acknowledge alert in status {}",
                alert.status.as_str()
            )));
        }

        alert.status = AlertStatus::Acknowledged;
        alert.acknowledged_at = Some(Utc::now());
        alert.acknowledged_by = Some(actor.to_string());
        self.store.update_alert(&alert).await?;

        self.escalations.cancel_for_alert(alert.id).await?;

        tracing::info!(alert_id = %alert.id, actor, "alert acknowledged");
        Ok(alert)
    }

    /// Resolve an alert, cancelling its pending escalations. Resolution is
    /// terminal.
    pub async fn resolve(&self, alert_id: Uuid, actor: &str) -> AppResult<Alert> {
        let mut alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or(AppError::AlertNotFound(alert_id))?;

        if alert.status == AlertStatus::Resolved {
            return Err(AppError::InvalidStateTransition(
                "alert is already resolved".to_string(),
            ));
        }

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(Utc::now());
        alert.resolved_by = Some(actor.to_string());
        self.store.update_alert(&alert).await?;

        self.escalations.cancel_for_alert(alert.id).await?;

        tracing::info!(alert_id = %alert.id, actor, "alert resolved");
        Ok(alert)
    }

    pub async fn get(&self, alert_id: Uuid) -> AppResult<Alert> {
        self.store
            .get_alert(alert_id)
            .await?
            .ok_or(AppError::AlertNotFound(alert_id))
    }

    pub async fn list(&self, status: Option<AlertStatus>, limit: i64) -> AppResult<Vec<Alert>> {
        Ok(self.store.list_alerts(status, limit).await?)
    }
}
