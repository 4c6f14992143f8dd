//! Shared harness for the integration suites
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use resto_ops_backend::services::{
    ActionExecutor, ActionHooks, AlertRuleEngine, AlertService, CreateItemInput,
    EscalationScheduler, NotificationDispatcher, RecordMovementInput, StockLedger,
};
use resto_ops_backend::store::{AlertStore, InventoryStore, MemoryStore};
use shared::{
    Alert, AlertCategory, AlertSeverity, AlertStatus, InventoryItem, MovementKind,
    NotificationChannel,
};

/// Dispatcher that records every delivery for assertions.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<(Uuid, String, NotificationChannel)>>,
}

impl RecordingDispatcher {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, kind, _)| kind.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn send(
        &self,
        alert: &Alert,
        channel: NotificationChannel,
        _template: Option<&str>,
    ) -> Result<(), String> {
        self.sent
            .lock()
            .unwrap()
            .push((alert.id, alert.kind.clone(), channel));
        Ok(())
    }
}

/// Fully wired service set over a fresh in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub scheduler: Arc<EscalationScheduler>,
    pub alerts: Arc<AlertService>,
    pub ledger: Arc<StockLedger>,
}

pub fn harness() -> Harness {
    let store = MemoryStore::arc();
    let inventory: Arc<dyn InventoryStore> = store.clone();
    let alert_store: Arc<dyn AlertStore> = store.clone();
    let dispatcher = RecordingDispatcher::arc();
    let executor = Arc::new(ActionExecutor::new(
        dispatcher.clone(),
        ActionHooks::default(),
    ));
    let scheduler = EscalationScheduler::new(alert_store.clone(), executor.clone());
    let alerts = Arc::new(AlertService::new(alert_store, executor, scheduler.clone()));
    let ledger = Arc::new(StockLedger::new(inventory, alerts.clone()));

    Harness {
        store,
        dispatcher,
        scheduler,
        alerts,
        ledger,
    }
}

pub fn engine(h: &Harness, poll: std::time::Duration) -> Arc<AlertRuleEngine> {
    let inventory: Arc<dyn InventoryStore> = h.store.clone();
    let alert_store: Arc<dyn AlertStore> = h.store.clone();
    AlertRuleEngine::new(inventory, alert_store, h.alerts.clone(), poll)
}

pub async fn seed_item(
    ledger: &StockLedger,
    min_threshold: i64,
    max_threshold: i64,
    lot_tracked: bool,
) -> InventoryItem {
    ledger
        .create_item(CreateItemInput {
            store_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            min_threshold,
            max_threshold,
            unit_cost: Decimal::new(250, 2),
            lot_tracked,
        })
        .await
        .unwrap()
}

pub fn movement(kind: MovementKind, quantity: i64) -> RecordMovementInput {
    RecordMovementInput {
        kind,
        quantity,
        reason: "test movement".to_string(),
        reference: None,
        lot_number: None,
        expiry_date: None,
        unit_cost: None,
        actor: "tester".to_string(),
    }
}

pub fn receipt_with_lot(quantity: i64, lot_number: &str) -> RecordMovementInput {
    RecordMovementInput {
        kind: MovementKind::In,
        quantity,
        reason: "supplier receipt".to_string(),
        reference: None,
        lot_number: Some(lot_number.to_string()),
        expiry_date: None,
        unit_cost: None,
        actor: "tester".to_string(),
    }
}

/// A bare active alert, for exercising the escalation store paths directly.
pub fn test_alert(item_id: Option<Uuid>, kind: &str) -> Alert {
    Alert {
        id: Uuid::new_v4(),
        rule_id: None,
        item_id,
        kind: kind.to_string(),
        category: AlertCategory::Stock,
        severity: AlertSeverity::Warning,
        title: "test alert".to_string(),
        message: "test alert".to_string(),
        status: AlertStatus::Active,
        created_at: Utc::now(),
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: None,
        resolved_by: None,
    }
}
