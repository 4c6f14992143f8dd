//! Stock ledger: movements, reservations and FIFO lot consumption
//!
//! All mutations for one item are linearized on a per-item async lock, so a
//! check-then-act like `reserve` can never oversell under concurrent
//! callers. Cross-item operations proceed in parallel. The in-memory item
//! cache is read-through and write-invalidate: an entry is dropped before a
//! mutation is reported complete, so no reader observes stale quantities.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use shared::{InventoryItem, Lot, LotStatus, MovementKind, StockMovement};

use crate::error::{AppError, AppResult};
use crate::store::{InventoryStore, LotDraw, StoreError};

use super::alerts::AlertService;
use super::threshold;

/// Input for creating an inventory item
#[derive(Debug, Deserialize)]
pub struct CreateItemInput {
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub min_threshold: i64,
    pub max_threshold: i64,
    pub unit_cost: Decimal,
    pub lot_tracked: bool,
}

/// Input for recording a stock movement
#[derive(Debug, Deserialize)]
pub struct RecordMovementInput {
    pub kind: MovementKind,
    /// Magnitude for `in`/`out`/`loss`; signed correction for `adjustment`.
    pub quantity: i64,
    pub reason: String,
    pub reference: Option<String>,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Option<Decimal>,
    pub actor: String,
}

/// Result of a consistency pass over one item.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub item_id: Uuid,
    pub current_stock: i64,
    pub movement_sum: i64,
    /// `None` for items without lot tracking.
    pub active_lot_sum: Option<i64>,
}

impl ReconciliationReport {
    /// Whether the cached aggregate agrees with the movement log.
    pub fn ledger_consistent(&self) -> bool {
        self.current_stock == self.movement_sum
    }

    /// Whether the active-lot sum agrees with the aggregate. Lot tracking is
    /// advisory, so drift here is logged rather than fatal.
    pub fn lots_consistent(&self) -> bool {
        self.active_lot_sum
            .map(|sum| sum == self.current_stock)
            .unwrap_or(true)
    }
}

/// The authoritative record of item quantities and their movement history.
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
    alerts: Arc<AlertService>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    cache: RwLock<HashMap<Uuid, InventoryItem>>,
}

fn item_error(item_id: Uuid) -> impl FnOnce(StoreError) -> AppError {
    move |err| match err {
        StoreError::NotFound => AppError::ItemNotFound(item_id),
        StoreError::Conflict(_) => AppError::ConcurrencyConflict(item_id),
        other => AppError::Persistence(other),
    }
}

impl StockLedger {
    /// Create a new StockLedger instance.
    pub fn new(store: Arc<dyn InventoryStore>, alerts: Arc<AlertService>) -> Self {
        Self {
            store,
            alerts,
            locks: Mutex::new(HashMap::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The mutation lock for one item. Mutations for different items never
    /// contend here.
    async fn item_lock(&self, item_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(item_id).or_default().clone()
    }

    async fn invalidate(&self, item_id: Uuid) {
        self.cache.write().await.remove(&item_id);
    }

    // ========================================================================
    // Item lifecycle
    // ========================================================================

    /// Create the inventory item for a (store, product) pair.
    pub async fn create_item(&self, input: CreateItemInput) -> AppResult<InventoryItem> {
        if input.min_threshold > input.max_threshold {
            return Err(AppError::Validation {
                field: "min_threshold".to_string(),
                message: "minimum threshold exceeds maximum threshold".to_string(),
            });
        }

        if self
            .store
            .find_item(input.store_id, input.product_id)
            .await?
            .is_some()
        {
            return Err(AppError::Validation {
                field: "product_id".to_string(),
                message: "an item already exists for this store and product".to_string(),
            });
        }

        let now = Utc::now();
        let item = InventoryItem {
            id: Uuid::new_v4(),
            store_id: input.store_id,
            product_id: input.product_id,
            current_stock: 0,
            reserved_stock: 0,
            min_threshold: input.min_threshold,
            max_threshold: input.max_threshold,
            unit_cost: input.unit_cost,
            lot_tracked: input.lot_tracked,
            retired: false,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_item(&item).await?;

        Ok(item)
    }

    /// Fetch an item, read-through the cache.
    pub async fn get_item(&self, item_id: Uuid) -> AppResult<InventoryItem> {
        if let Some(item) = self.cache.read().await.get(&item_id) {
            return Ok(item.clone());
        }

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;
        self.cache.write().await.insert(item_id, item.clone());

        Ok(item)
    }

    /// Soft-retire an item. Retired items keep their history; nothing is
    /// physically deleted.
    pub async fn retire_item(&self, item_id: Uuid) -> AppResult<()> {
        self.store
            .set_item_retired(item_id, true)
            .await
            .map_err(item_error(item_id))?;
        self.invalidate(item_id).await;
        Ok(())
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Append a movement and apply its signed delta to the item's current
    /// stock, atomically. Threshold checks run synchronously before this
    /// returns.
    pub async fn apply_movement(
        &self,
        item_id: Uuid,
        input: RecordMovementInput,
    ) -> AppResult<StockMovement> {
        let delta = match input.kind {
            MovementKind::In => {
                require_positive(input.quantity)?;
                input.quantity
            }
            MovementKind::Out | MovementKind::Loss => {
                require_positive(input.quantity)?;
                -input.quantity
            }
            MovementKind::Adjustment => {
                if input.quantity == 0 {
                    return Err(AppError::Validation {
                        field: "quantity".to_string(),
                        message: "adjustment quantity must be non-zero".to_string(),
                    });
                }
                input.quantity
            }
        };

        let lock = self.item_lock(item_id).await;
        let guard = lock.lock().await;

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;

        let now = Utc::now();
        let movement = StockMovement {
            id: Uuid::new_v4(),
            item_id,
            store_id: item.store_id,
            quantity: delta,
            kind: input.kind,
            reason: input.reason,
            reference: input.reference,
            lot_number: input.lot_number.clone(),
            expiry_date: input.expiry_date,
            unit_cost: input.unit_cost,
            actor: input.actor,
            created_at: now,
        };

        // A lot-tracked receipt opens a new lot in the same transaction.
        let new_lot = match (&input.lot_number, input.kind) {
            (Some(lot_number), MovementKind::In) if item.lot_tracked => Some(Lot {
                id: Uuid::new_v4(),
                item_id,
                lot_number: lot_number.clone(),
                quantity_remaining: delta,
                unit_cost: input.unit_cost.unwrap_or(item.unit_cost),
                received_date: now,
                expiry_date: input.expiry_date,
                status: LotStatus::Active,
                created_at: now,
            }),
            _ => None,
        };

        let updated = self
            .store
            .record_movement(&movement, new_lot.as_ref())
            .await
            .map_err(item_error(item_id))?;
        self.invalidate(item_id).await;
        drop(guard);

        tracing::debug!(
            item_id = %item_id,
            kind = movement.kind.as_str(),
            quantity = movement.quantity,
            current_stock = updated.current_stock,
            "movement recorded"
        );

        self.run_threshold_checks(&updated).await;

        Ok(movement)
    }

    /// Reserve stock for an order. Fails with `InsufficientStock` when the
    /// requested quantity exceeds what is available at evaluation time.
    pub async fn reserve(&self, item_id: Uuid, quantity: i64, order_ref: &str) -> AppResult<()> {
        require_positive(quantity)?;

        let lock = self.item_lock(item_id).await;
        let guard = lock.lock().await;

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;

        let available = item.available_stock();
        if quantity > available {
            return Err(AppError::InsufficientStock {
                item_id,
                requested: quantity,
                available,
            });
        }

        let updated = self
            .store
            .update_reserved(item_id, item.reserved_stock, item.reserved_stock + quantity)
            .await
            .map_err(item_error(item_id))?;
        self.invalidate(item_id).await;
        drop(guard);

        tracing::debug!(item_id = %item_id, quantity, order_ref, "stock reserved");
        self.run_threshold_checks(&updated).await;
        Ok(())
    }

    /// Release a reservation. Releasing more than is currently reserved is
    /// clamped to zero, not an error; the clamp is logged distinctly until
    /// product intent for double-releases is settled.
    pub async fn release(&self, item_id: Uuid, quantity: i64, order_ref: &str) -> AppResult<()> {
        require_positive(quantity)?;

        let lock = self.item_lock(item_id).await;
        let guard = lock.lock().await;

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;

        if quantity > item.reserved_stock {
            tracing::warn!(
                item_id = %item_id,
                requested = quantity,
                reserved = item.reserved_stock,
                order_ref,
                "release exceeds reserved stock; clamping to zero"
            );
        }
        let new_reserved = (item.reserved_stock - quantity).max(0);

        let updated = self
            .store
            .update_reserved(item_id, item.reserved_stock, new_reserved)
            .await
            .map_err(item_error(item_id))?;
        self.invalidate(item_id).await;
        drop(guard);

        tracing::debug!(item_id = %item_id, quantity, order_ref, "reservation released");
        self.run_threshold_checks(&updated).await;
        Ok(())
    }

    /// Consume stock oldest-received-lot-first.
    ///
    /// Availability across all active lots is verified before any lot is
    /// touched, and the lot updates, per-lot movements and aggregate
    /// decrement commit as one transaction, so a failed consumption never
    /// partially applies. Returns the movements written, one per lot drawn.
    pub async fn consume_fifo(
        &self,
        item_id: Uuid,
        quantity: i64,
        order_ref: Option<&str>,
    ) -> AppResult<Vec<StockMovement>> {
        require_positive(quantity)?;

        let lock = self.item_lock(item_id).await;
        let guard = lock.lock().await;

        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;

        let lots = self.store.active_lots(item_id).await?;
        let available: i64 = lots.iter().map(|l| l.quantity_remaining).sum();
        if available < quantity {
            return Err(AppError::InsufficientStock {
                item_id,
                requested: quantity,
                available,
            });
        }

        let now = Utc::now();
        let mut remaining = quantity;
        let mut draws = Vec::new();
        let mut movements = Vec::new();

        for lot in &lots {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(lot.quantity_remaining);
            let left = lot.quantity_remaining - take;
            draws.push(LotDraw {
                lot_id: lot.id,
                take,
                new_status: if left == 0 {
                    LotStatus::Consumed
                } else {
                    lot.status
                },
            });
            movements.push(StockMovement {
                id: Uuid::new_v4(),
                item_id,
                store_id: item.store_id,
                quantity: -take,
                kind: MovementKind::Out,
                reason: "fifo consumption".to_string(),
                reference: order_ref.map(str::to_string),
                lot_number: Some(lot.lot_number.clone()),
                expiry_date: lot.expiry_date,
                unit_cost: Some(lot.unit_cost),
                actor: "fulfillment".to_string(),
                created_at: now,
            });
            remaining -= take;
        }

        let updated = self
            .store
            .record_consumption(item_id, &movements, &draws, quantity)
            .await
            .map_err(item_error(item_id))?;
        self.invalidate(item_id).await;
        drop(guard);

        tracing::debug!(
            item_id = %item_id,
            quantity,
            lots_drawn = draws.len(),
            current_stock = updated.current_stock,
            "fifo consumption applied"
        );

        self.run_threshold_checks(&updated).await;

        Ok(movements)
    }

    // ========================================================================
    // Reads and reconciliation
    // ========================================================================

    /// Movements for an item, most recent first.
    pub async fn movements(&self, item_id: Uuid, limit: i64) -> AppResult<Vec<StockMovement>> {
        Ok(self.store.list_movements(item_id, limit).await?)
    }

    /// Cross-check the cached aggregate against the movement log and, for
    /// lot-tracked items, the active-lot sum. Discrepancies are logged; this
    /// is the periodic consistency backstop for the write path.
    pub async fn reconcile_item(&self, item_id: Uuid) -> AppResult<ReconciliationReport> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AppError::ItemNotFound(item_id))?;

        let movement_sum = self.store.movement_sum(item_id).await?;
        let active_lot_sum = if item.lot_tracked {
            Some(self.store.lot_quantity_sum(item_id).await?)
        } else {
            None
        };

        let report = ReconciliationReport {
            item_id,
            current_stock: item.current_stock,
            movement_sum,
            active_lot_sum,
        };

        if !report.ledger_consistent() {
            tracing::error!(
                item_id = %item_id,
                current_stock = report.current_stock,
                movement_sum = report.movement_sum,
                "cached stock disagrees with movement log"
            );
        }
        if !report.lots_consistent() {
            tracing::warn!(
                item_id = %item_id,
                current_stock = report.current_stock,
                lot_sum = report.active_lot_sum,
                "active lot quantities drifted from item stock"
            );
        }

        Ok(report)
    }

    async fn run_threshold_checks(&self, item: &InventoryItem) {
        let lots = if item.lot_tracked {
            match self.store.active_lots(item.id).await {
                Ok(lots) => lots,
                Err(e) => {
                    tracing::error!(item_id = %item.id, error = %e,
                        "failed to load lots for threshold checks");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let requests = threshold::evaluate(item, &lots, Utc::now());
        if !requests.is_empty() {
            self.alerts.process_requests(requests).await;
        }
    }
}

fn require_positive(quantity: i64) -> AppResult<()> {
    if quantity <= 0 {
        return Err(AppError::Validation {
            field: "quantity".to_string(),
            message: "quantity must be positive".to_string(),
        });
    }
    Ok(())
}
