//! Persistence gateway for the inventory core
//!
//! The core never talks to storage directly; every read and write goes
//! through the `InventoryStore` and `AlertStore` traits. Two gateways are
//! provided: `PgStore` (Postgres via sqlx, the production backend) and
//! `MemoryStore` (in-process tables for tests and single-process dev runs).

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use shared::{
    Alert, AlertRule, AlertStatus, Escalation, EscalationStatus, InventoryItem, Lot, LotStatus,
    StockMovement,
};

/// Gateway error
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One lot's share of a FIFO consumption, applied atomically with the
/// consumption's movements and the aggregate stock decrement.
#[derive(Debug, Clone)]
pub struct LotDraw {
    pub lot_id: Uuid,
    pub take: i64,
    pub new_status: LotStatus,
}

/// Row access over inventory items, movements and lots.
///
/// Implementations must apply `record_movement` and `record_consumption` as
/// single atomic units: a crash in the middle must never leave the movement
/// log and the cached stock aggregate disagreeing.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()>;

    async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<InventoryItem>>;

    /// Look up the item for a (store, product) pair.
    async fn find_item(&self, store_id: Uuid, product_id: Uuid)
        -> StoreResult<Option<InventoryItem>>;

    async fn list_items(&self, store_id: Option<Uuid>) -> StoreResult<Vec<InventoryItem>>;

    async fn set_item_retired(&self, item_id: Uuid, retired: bool) -> StoreResult<()>;

    /// Append a movement and apply its signed quantity to the item's current
    /// stock in one transaction. When `new_lot` is given (a lot-tracked
    /// receipt), the lot row is created in the same transaction.
    async fn record_movement(
        &self,
        movement: &StockMovement,
        new_lot: Option<&Lot>,
    ) -> StoreResult<InventoryItem>;

    /// Commit a FIFO consumption: per-lot movements, lot quantity updates and
    /// the aggregate decrement of `total` units, all in one transaction.
    async fn record_consumption(
        &self,
        item_id: Uuid,
        movements: &[StockMovement],
        draws: &[LotDraw],
        total: i64,
    ) -> StoreResult<InventoryItem>;

    /// Set the item's reserved quantity, guarded by the expected previous
    /// value. Returns `Conflict` when another writer got there first.
    async fn update_reserved(
        &self,
        item_id: Uuid,
        expected: i64,
        new: i64,
    ) -> StoreResult<InventoryItem>;

    /// Movements for an item, most recent first.
    async fn list_movements(&self, item_id: Uuid, limit: i64) -> StoreResult<Vec<StockMovement>>;

    /// Signed sum over the item's full movement log.
    async fn movement_sum(&self, item_id: Uuid) -> StoreResult<i64>;

    /// Units moved in (or out, when `inflow` is false) since `since`.
    async fn movement_flow_since(
        &self,
        item_id: Uuid,
        since: DateTime<Utc>,
        inflow: bool,
    ) -> StoreResult<i64>;

    async fn insert_lot(&self, lot: &Lot) -> StoreResult<()>;

    /// Active lots for an item, oldest received first.
    async fn active_lots(&self, item_id: Uuid) -> StoreResult<Vec<Lot>>;

    /// Quantity sum across the item's active lots.
    async fn lot_quantity_sum(&self, item_id: Uuid) -> StoreResult<i64>;
}

/// Row access over alert rules, alerts and escalations.
#[async_trait]
pub trait AlertStore: Send + Sync {
    async fn insert_rule(&self, rule: &AlertRule) -> StoreResult<()>;

    async fn update_rule(&self, rule: &AlertRule) -> StoreResult<()>;

    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<Option<AlertRule>>;

    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<AlertRule>>;

    /// Record a trigger time, starting the rule's cooldown window.
    async fn record_rule_trigger(&self, rule_id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()>;

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<Option<Alert>>;

    async fn update_alert(&self, alert: &Alert) -> StoreResult<()>;

    /// The currently `active` alert for a `(item, kind)` pair, if any.
    /// This is the deduplication lookup for the idempotent-alerting rule.
    async fn find_active_alert(
        &self,
        item_id: Option<Uuid>,
        kind: &str,
    ) -> StoreResult<Option<Alert>>;

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
    ) -> StoreResult<Vec<Alert>>;

    async fn insert_escalation(&self, escalation: &Escalation) -> StoreResult<()>;

    async fn get_escalation(&self, escalation_id: Uuid) -> StoreResult<Option<Escalation>>;

    async fn set_escalation_status(
        &self,
        escalation_id: Uuid,
        status: EscalationStatus,
        fired_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    /// Mark every pending escalation of an alert cancelled; returns the ids
    /// that were cancelled.
    async fn cancel_pending_escalations(&self, alert_id: Uuid) -> StoreResult<Vec<Uuid>>;

    /// All pending escalations, for re-arming after a restart.
    async fn pending_escalations(&self) -> StoreResult<Vec<Escalation>>;
}
