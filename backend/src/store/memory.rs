//! In-memory persistence gateway for tests and single-process dev runs

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::{
    Alert, AlertRule, AlertStatus, Escalation, EscalationStatus, InventoryItem, Lot, LotStatus,
    StockMovement,
};

use super::{AlertStore, InventoryStore, LotDraw, StoreError, StoreResult};

/// In-memory tables behind the gateway traits.
///
/// Multi-row writes take the involved table locks together, so the same
/// atomicity the Postgres gateway gets from transactions holds here. Lock
/// order is always items, movements, lots.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<Uuid, InventoryItem>>,
    movements: RwLock<Vec<StockMovement>>,
    lots: RwLock<HashMap<Uuid, Lot>>,
    rules: RwLock<HashMap<Uuid, AlertRule>>,
    alerts: RwLock<HashMap<Uuid, Alert>>,
    escalations: RwLock<HashMap<Uuid, Escalation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        let mut items = self.items.write().unwrap();
        if items.contains_key(&item.id) {
            return Err(StoreError::Conflict(format!(
                "item {} already exists",
                item.id
            )));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<InventoryItem>> {
        Ok(self.items.read().unwrap().get(&item_id).cloned())
    }

    async fn find_item(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<InventoryItem>> {
        Ok(self
            .items
            .read()
            .unwrap()
            .values()
            .find(|i| i.store_id == store_id && i.product_id == product_id)
            .cloned())
    }

    async fn list_items(&self, store_id: Option<Uuid>) -> StoreResult<Vec<InventoryItem>> {
        let items = self.items.read().unwrap();
        let mut out: Vec<InventoryItem> = items
            .values()
            .filter(|i| store_id.map(|s| i.store_id == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by_key(|i| i.created_at);
        Ok(out)
    }

    async fn set_item_retired(&self, item_id: Uuid, retired: bool) -> StoreResult<()> {
        let mut items = self.items.write().unwrap();
        let item = items.get_mut(&item_id).ok_or(StoreError::NotFound)?;
        item.retired = retired;
        item.updated_at = Utc::now();
        Ok(())
    }

    async fn record_movement(
        &self,
        movement: &StockMovement,
        new_lot: Option<&Lot>,
    ) -> StoreResult<InventoryItem> {
        let mut items = self.items.write().unwrap();
        let mut movements = self.movements.write().unwrap();
        let item = items
            .get_mut(&movement.item_id)
            .ok_or(StoreError::NotFound)?;
        item.current_stock += movement.quantity;
        item.updated_at = Utc::now();
        movements.push(movement.clone());
        if let Some(lot) = new_lot {
            self.lots.write().unwrap().insert(lot.id, lot.clone());
        }
        Ok(item.clone())
    }

    async fn record_consumption(
        &self,
        item_id: Uuid,
        movements: &[StockMovement],
        draws: &[LotDraw],
        total: i64,
    ) -> StoreResult<InventoryItem> {
        let mut items = self.items.write().unwrap();
        let mut log = self.movements.write().unwrap();
        let mut lots = self.lots.write().unwrap();

        let item = items.get_mut(&item_id).ok_or(StoreError::NotFound)?;
        for draw in draws {
            let lot = lots.get_mut(&draw.lot_id).ok_or(StoreError::NotFound)?;
            if lot.quantity_remaining < draw.take {
                return Err(StoreError::Conflict(format!(
                    "lot {} has {} remaining, draw wants {}",
                    lot.lot_number, lot.quantity_remaining, draw.take
                )));
            }
            lot.quantity_remaining -= draw.take;
            lot.status = draw.new_status;
        }
        item.current_stock -= total;
        item.updated_at = Utc::now();
        log.extend(movements.iter().cloned());
        Ok(item.clone())
    }

    async fn update_reserved(
        &self,
        item_id: Uuid,
        expected: i64,
        new: i64,
    ) -> StoreResult<InventoryItem> {
        let mut items = self.items.write().unwrap();
        let item = items.get_mut(&item_id).ok_or(StoreError::NotFound)?;
        if item.reserved_stock != expected {
            return Err(StoreError::Conflict(format!(
                "reserved stock changed under us: expected {}, found {}",
                expected, item.reserved_stock
            )));
        }
        item.reserved_stock = new;
        item.updated_at = Utc::now();
        Ok(item.clone())
    }

    async fn list_movements(&self, item_id: Uuid, limit: i64) -> StoreResult<Vec<StockMovement>> {
        let movements = self.movements.read().unwrap();
        let mut out: Vec<StockMovement> = movements
            .iter()
            .filter(|m| m.item_id == item_id)
            .cloned()
            .collect();
        out.reverse();
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn movement_sum(&self, item_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .movements
            .read()
            .unwrap()
            .iter()
            .filter(|m| m.item_id == item_id)
            .map(|m| m.quantity)
            .sum())
    }

    async fn movement_flow_since(
        &self,
        item_id: Uuid,
        since: DateTime<Utc>,
        inflow: bool,
    ) -> StoreResult<i64> {
        Ok(self
            .movements
            .read()
            .unwrap()
            .iter()
            .filter(|m| {
                m.item_id == item_id && m.created_at >= since && (m.quantity > 0) == inflow
            })
            .map(|m| m.quantity.abs())
            .sum())
    }

    async fn insert_lot(&self, lot: &Lot) -> StoreResult<()> {
        self.lots.write().unwrap().insert(lot.id, lot.clone());
        Ok(())
    }

    async fn active_lots(&self, item_id: Uuid) -> StoreResult<Vec<Lot>> {
        let lots = self.lots.read().unwrap();
        let mut out: Vec<Lot> = lots
            .values()
            .filter(|l| l.item_id == item_id && l.status == LotStatus::Active)
            .cloned()
            .collect();
        out.sort_by_key(|l| l.received_date);
        Ok(out)
    }

    async fn lot_quantity_sum(&self, item_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .lots
            .read()
            .unwrap()
            .values()
            .filter(|l| l.item_id == item_id && l.status == LotStatus::Active)
            .map(|l| l.quantity_remaining)
            .sum())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn insert_rule(&self, rule: &AlertRule) -> StoreResult<()> {
        self.rules.write().unwrap().insert(rule.id, rule.clone());
        Ok(())
    }

    async fn update_rule(&self, rule: &AlertRule) -> StoreResult<()> {
        let mut rules = self.rules.write().unwrap();
        if !rules.contains_key(&rule.id) {
            return Err(StoreError::NotFound);
        }
        rules.insert(rule.id, rule.clone());
        Ok(())
    }

    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<Option<AlertRule>> {
        Ok(self.rules.read().unwrap().get(&rule_id).cloned())
    }

    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<AlertRule>> {
        let rules = self.rules.read().unwrap();
        let mut out: Vec<AlertRule> = rules
            .values()
            .filter(|r| !active_only || r.is_active)
            .cloned()
            .collect();
        out.sort_by_key(|r| r.created_at);
        Ok(out)
    }

    async fn record_rule_trigger(&self, rule_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let mut rules = self.rules.write().unwrap();
        let rule = rules.get_mut(&rule_id).ok_or(StoreError::NotFound)?;
        rule.last_triggered_at = Some(at);
        rule.updated_at = at;
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.alerts.write().unwrap().insert(alert.id, alert.clone());
        Ok(())
    }

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<Option<Alert>> {
        Ok(self.alerts.read().unwrap().get(&alert_id).cloned())
    }

    async fn update_alert(&self, alert: &Alert) -> StoreResult<()> {
        let mut alerts = self.alerts.write().unwrap();
        if !alerts.contains_key(&alert.id) {
            return Err(StoreError::NotFound);
        }
        alerts.insert(alert.id, alert.clone());
        Ok(())
    }

    async fn find_active_alert(
        &self,
        item_id: Option<Uuid>,
        kind: &str,
    ) -> StoreResult<Option<Alert>> {
        Ok(self
            .alerts
            .read()
            .unwrap()
            .values()
            .find(|a| a.status == AlertStatus::Active && a.item_id == item_id && a.kind == kind)
            .cloned())
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
    ) -> StoreResult<Vec<Alert>> {
        let alerts = self.alerts.read().unwrap();
        let mut out: Vec<Alert> = alerts
            .values()
            .filter(|a| status.map(|s| a.status == s).unwrap_or(true))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out.truncate(limit as usize);
        Ok(out)
    }

    async fn insert_escalation(&self, escalation: &Escalation) -> StoreResult<()> {
        self.escalations
            .write()
            .unwrap()
            .insert(escalation.id, escalation.clone());
        Ok(())
    }

    async fn get_escalation(&self, escalation_id: Uuid) -> StoreResult<Option<Escalation>> {
        Ok(self
            .escalations
            .read()
            .unwrap()
            .get(&escalation_id)
            .cloned())
    }

    async fn set_escalation_status(
        &self,
        escalation_id: Uuid,
        status: EscalationStatus,
        fired_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let mut escalations = self.escalations.write().unwrap();
        let escalation = escalations
            .get_mut(&escalation_id)
            .ok_or(StoreError::NotFound)?;
        escalation.status = status;
        if fired_at.is_some() {
            escalation.fired_at = fired_at;
        }
        Ok(())
    }

    async fn cancel_pending_escalations(&self, alert_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let mut escalations = self.escalations.write().unwrap();
        let mut cancelled = Vec::new();
        for escalation in escalations.values_mut() {
            if escalation.alert_id == alert_id && escalation.status == EscalationStatus::Pending {
                escalation.status = EscalationStatus::Cancelled;
                cancelled.push(escalation.id);
            }
        }
        Ok(cancelled)
    }

    async fn pending_escalations(&self) -> StoreResult<Vec<Escalation>> {
        let escalations = self.escalations.read().unwrap();
        let mut out: Vec<Escalation> = escalations
            .values()
            .filter(|e| e.status == EscalationStatus::Pending)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.fire_at);
        Ok(out)
    }
}
