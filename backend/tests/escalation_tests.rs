//! Escalation scheduler tests
//!
//! Covers the timed escalation lifecycle:
//! - an unattended alert escalates once its delay elapses
//! - acknowledgment cancels pending escalations before they fire
//! - a fired-but-stale escalation never notifies after resolution
//! - pending escalations are re-armed (or fired) after a restart

mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use uuid::Uuid;

use common::{harness, test_alert, Harness};
use resto_ops_backend::services::AlertRequest;
use resto_ops_backend::store::AlertStore;
use shared::{
    AlertCategory, AlertSeverity, AlertStatus, Escalation, EscalationStatus, EscalationStep,
    NotificationChannel, RuleAction,
};

fn notify_step(level: i32, delay_minutes: i64) -> EscalationStep {
    EscalationStep {
        level,
        delay_minutes,
        actions: vec![RuleAction::Notify {
            channels: vec![NotificationChannel::Email],
            template: None,
        }],
    }
}

fn escalating_request(kind: &str, steps: Vec<EscalationStep>) -> AlertRequest {
    AlertRequest {
        rule_id: None,
        item_id: Some(Uuid::new_v4()),
        kind: kind.to_string(),
        category: AlertCategory::Stock,
        severity: AlertSeverity::Critical,
        title: "unattended alert".to_string(),
        message: "needs attention".to_string(),
        actions: Vec::new(),
        escalations: steps,
    }
}

fn pending_escalation(alert_id: Uuid, fire_at: chrono::DateTime<Utc>) -> Escalation {
    Escalation {
        id: Uuid::new_v4(),
        alert_id,
        level: 1,
        fire_at,
        actions: vec![RuleAction::Notify {
            channels: vec![NotificationChannel::Email],
            template: None,
        }],
        status: EscalationStatus::Pending,
        created_at: Utc::now(),
        fired_at: None,
    }
}

fn alert_store(h: &Harness) -> Arc<dyn AlertStore> {
    h.store.clone()
}

#[tokio::test]
async fn unattended_alert_escalates_after_its_delay() {
    let h = harness();
    let store = alert_store(&h);

    let alert = test_alert(Some(Uuid::new_v4()), "low_stock");
    store.insert_alert(&alert).await.unwrap();

    let armed = h
        .scheduler
        .arm(&alert, &[notify_step(1, 0)])
        .await
        .unwrap();
    assert_eq!(armed.len(), 1);

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    assert_eq!(h.dispatcher.count(), 1);
    let escalation = store.get_escalation(armed[0].id).await.unwrap().unwrap();
    assert_eq!(escalation.status, EscalationStatus::Fired);
    assert!(escalation.fired_at.is_some());
}

#[tokio::test]
async fn every_escalation_level_fires() {
    let h = harness();
    let store = alert_store(&h);

    let alert = test_alert(Some(Uuid::new_v4()), "low_stock");
    store.insert_alert(&alert).await.unwrap();

    h.scheduler
        .arm(&alert, &[notify_step(1, 0), notify_step(2, 0)])
        .await
        .unwrap();

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    assert_eq!(h.dispatcher.count(), 2);
    assert!(store.pending_escalations().await.unwrap().is_empty());
}

#[tokio::test]
async fn acknowledging_cancels_pending_escalations() {
    let h = harness();
    let store = alert_store(&h);

    // The alert carries an escalation due in a minute.
    let alert = h
        .alerts
        .raise(escalating_request("low_stock", vec![notify_step(1, 1)]))
        .await
        .unwrap()
        .unwrap();

    let pending = store.pending_escalations().await.unwrap();
    assert_eq!(pending.len(), 1);
    let escalation_id = pending[0].id;

    h.alerts.acknowledge(alert.id, "ops").await.unwrap();

    // Cancellation is synchronous: nothing is pending the moment ack returns.
    assert!(store.pending_escalations().await.unwrap().is_empty());
    let escalation = store.get_escalation(escalation_id).await.unwrap().unwrap();
    assert_eq!(escalation.status, EscalationStatus::Cancelled);

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn resolving_cancels_pending_escalations() {
    let h = harness();
    let store = alert_store(&h);

    let alert = h
        .alerts
        .raise(escalating_request("out_of_stock", vec![notify_step(1, 1)]))
        .await
        .unwrap()
        .unwrap();

    h.alerts.resolve(alert.id, "ops").await.unwrap();

    assert!(store.pending_escalations().await.unwrap().is_empty());
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(h.dispatcher.count(), 0);
}

#[tokio::test]
async fn stale_escalation_for_resolved_alert_is_a_no_op() {
    let h = harness();
    let store = alert_store(&h);

    let mut alert = test_alert(Some(Uuid::new_v4()), "low_stock");
    alert.status = AlertStatus::Resolved;
    alert.resolved_at = Some(Utc::now());
    store.insert_alert(&alert).await.unwrap();

    // A past-due escalation left behind, as after a crash before cleanup.
    let escalation = pending_escalation(alert.id, Utc::now() - Duration::minutes(5));
    store.insert_escalation(&escalation).await.unwrap();

    h.scheduler.restore().await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(200)).await;

    // The fired task must notice the resolution and stay silent.
    assert_eq!(h.dispatcher.count(), 0);
    let escalation = store.get_escalation(escalation.id).await.unwrap().unwrap();
    assert_eq!(escalation.status, EscalationStatus::Cancelled);
}

#[tokio::test]
async fn restore_fires_past_due_escalations_for_active_alerts() {
    let h = harness();
    let store = alert_store(&h);

    let alert = test_alert(Some(Uuid::new_v4()), "low_stock");
    store.insert_alert(&alert).await.unwrap();
    let escalation = pending_escalation(alert.id, Utc::now() - Duration::minutes(5));
    store.insert_escalation(&escalation).await.unwrap();

    let restored = h.scheduler.restore().await.unwrap();
    assert_eq!(restored, 1);

    tokio::time::sleep(StdDuration::from_millis(200)).await;

    assert_eq!(h.dispatcher.count(), 1);
    let escalation = store.get_escalation(escalation.id).await.unwrap().unwrap();
    assert_eq!(escalation.status, EscalationStatus::Fired);
}

#[tokio::test]
async fn restore_rearms_future_escalations() {
    let h = harness();
    let store = alert_store(&h);

    let alert = test_alert(Some(Uuid::new_v4()), "low_stock");
    store.insert_alert(&alert).await.unwrap();
    let escalation = pending_escalation(alert.id, Utc::now() + Duration::milliseconds(150));
    store.insert_escalation(&escalation).await.unwrap();

    h.scheduler.restore().await.unwrap();

    // Not yet due.
    assert_eq!(h.dispatcher.count(), 0);

    tokio::time::sleep(StdDuration::from_millis(400)).await;

    assert_eq!(h.dispatcher.count(), 1);
    let escalation = store.get_escalation(escalation.id).await.unwrap().unwrap();
    assert_eq!(escalation.status, EscalationStatus::Fired);
}

#[tokio::test]
async fn shutdown_leaves_pending_escalations_persisted() {
    let h = harness();
    let store = alert_store(&h);

    let alert = h
        .alerts
        .raise(escalating_request("low_stock", vec![notify_step(1, 1)]))
        .await
        .unwrap()
        .unwrap();

    h.scheduler.shutdown().await;

    // The timer is gone but the record survives for the next restore.
    let pending = store.pending_escalations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].alert_id, alert.id);
}
