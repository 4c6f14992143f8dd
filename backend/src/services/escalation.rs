//! Timed escalation of unattended alerts
//!
//! Every escalation is persisted with its intended fire time before a timer
//! is armed, so pending escalations survive a process restart: `restore`
//! re-arms future ones and immediately processes those already past due.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use shared::{Alert, AlertStatus, Escalation, EscalationStatus, EscalationStep};

use crate::error::AppResult;
use crate::store::AlertStore;

use super::dispatch::ActionExecutor;

/// Schedules and cancels delayed escalation actions for open alerts.
pub struct EscalationScheduler {
    store: Arc<dyn AlertStore>,
    executor: Arc<ActionExecutor>,
    /// Live timer tasks, keyed by alert so acknowledgment can cancel them all.
    timers: Mutex<HashMap<Uuid, Vec<(Uuid, JoinHandle<()>)>>>,
}

impl EscalationScheduler {
    /// Create a new EscalationScheduler instance.
    pub fn new(store: Arc<dyn AlertStore>, executor: Arc<ActionExecutor>) -> Arc<Self> {
        Arc::new(Self {
            store,
            executor,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Persist and arm one escalation per step of the rule's ladder.
    pub async fn arm(
        self: &Arc<Self>,
        alert: &Alert,
        steps: &[EscalationStep],
    ) -> AppResult<Vec<Escalation>> {
        let now = Utc::now();
        let mut armed = Vec::with_capacity(steps.len());

        for step in steps {
            let escalation = Escalation {
                id: Uuid::new_v4(),
                alert_id: alert.id,
                level: step.level,
                fire_at: now + Duration::minutes(step.delay_minutes),
                actions: step.actions.clone(),
                status: EscalationStatus::Pending,
                created_at: now,
                fired_at: None,
            };
            self.store.insert_escalation(&escalation).await?;
            self.spawn_timer(escalation.clone()).await;
            armed.push(escalation);
        }

        Ok(armed)
    }

    /// Cancel every pending escalation of an alert.
    ///
    /// Called synchronously from acknowledge/resolve: cancellation is
    /// persisted first, then the timer tasks are aborted. A task that
    /// already started firing re-checks the alert status before acting, so
    /// a cancel racing with a fire still suppresses the notification.
    pub async fn cancel_for_alert(&self, alert_id: Uuid) -> AppResult<usize> {
        let cancelled = self.store.cancel_pending_escalations(alert_id).await?;

        let mut timers = self.timers.lock().await;
        if let Some(handles) = timers.remove(&alert_id) {
            for (_, handle) in handles {
                handle.abort();
            }
        }

        if !cancelled.is_empty() {
            tracing::info!(
                alert_id = %alert_id,
                count = cancelled.len(),
                "cancelled pending escalations"
            );
        }

        Ok(cancelled.len())
    }

    /// Re-arm pending escalations after a restart. Past-due escalations are
    /// processed immediately. Returns how many were re-armed.
    pub async fn restore(self: &Arc<Self>) -> AppResult<usize> {
        let pending = self.store.pending_escalations().await?;
        let count = pending.len();

        for escalation in pending {
            self.spawn_timer(escalation).await;
        }

        if count > 0 {
            tracing::info!(count, "re-armed pending escalations");
        }

        Ok(count)
    }

    /// Abort all live timers. Pending escalations stay persisted and are
    /// picked up again by the next `restore`.
    pub async fn shutdown(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handles) in timers.drain() {
            for (_, handle) in handles {
                handle.abort();
            }
        }
    }

    async fn spawn_timer(self: &Arc<Self>, escalation: Escalation) {
        let scheduler = Arc::clone(self);
        let alert_id = escalation.alert_id;
        let escalation_id = escalation.id;

        let handle = tokio::spawn(async move {
            let wait = (escalation.fire_at - Utc::now())
                .to_std()
                .unwrap_or_default();
            tokio::time::sleep(wait).await;
            scheduler.fire(escalation).await;
        });

        self.timers
            .lock()
            .await
            .entry(alert_id)
            .or_default()
            .push((escalation_id, handle));
    }

    /// Execute one due escalation. A no-op when the parent alert has left the
    /// `active` state in the meantime.
    async fn fire(&self, escalation: Escalation) {
        let alert = match self.store.get_alert(escalation.alert_id).await {
            Ok(Some(alert)) => alert,
            Ok(None) => {
                tracing::warn!(
                    escalation_id = %escalation.id,
                    alert_id = %escalation.alert_id,
                    "escalation fired for a missing alert"
                );
                self.prune(escalation.alert_id, escalation.id).await;
                return;
            }
            Err(e) => {
                tracing::error!(
                    escalation_id = %escalation.id,
                    error = %e,
                    "failed to load alert for due escalation"
                );
                return;
            }
        };

        // The record may have been cancelled while this task was already
        // running; trust the persisted state over the timer.
        match self.store.get_escalation(escalation.id).await {
            Ok(Some(current)) if current.status == EscalationStatus::Pending => {}
            _ => {
                self.prune(escalation.alert_id, escalation.id).await;
                return;
            }
        }

        if alert.status != AlertStatus::Active {
            tracing::debug!(
                escalation_id = %escalation.id,
                alert_id = %alert.id,
                status = alert.status.as_str(),
                "skipping escalation for non-active alert"
            );
            if let Err(e) = self
                .store
                .set_escalation_status(escalation.id, EscalationStatus::Cancelled, None)
                .await
            {
                tracing::error!(escalation_id = %escalation.id, error = %e,
                    "failed to mark stale escalation cancelled");
            }
            self.prune(escalation.alert_id, escalation.id).await;
            return;
        }

        tracing::warn!(
            alert_id = %alert.id,
            level = escalation.level,
            "alert unattended; escalating"
        );

        self.executor.execute_all(&alert, &escalation.actions).await;

        if let Err(e) = self
            .store
            .set_escalation_status(escalation.id, EscalationStatus::Fired, Some(Utc::now()))
            .await
        {
            tracing::error!(escalation_id = %escalation.id, error = %e,
                "failed to mark escalation fired");
        }
        self.prune(escalation.alert_id, escalation.id).await;
    }

    async fn prune(&self, alert_id: Uuid, escalation_id: Uuid) {
        let mut timers = self.timers.lock().await;
        if let Some(handles) = timers.get_mut(&alert_id) {
            handles.retain(|(id, _)| *id != escalation_id);
            if handles.is_empty() {
                timers.remove(&alert_id);
            }
        }
    }
}
