//! Inventory item model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stocked item at a specific store location.
///
/// Quantities are integer units of the item's unit of measure. The available
/// quantity is always derived from `current_stock - reserved_stock` and never
/// stored. `current_stock` is a cached projection of the movement log and
/// must always equal the signed sum of the item's movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: Uuid,
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub min_threshold: i64,
    pub max_threshold: i64,
    pub unit_cost: Decimal,
    /// Whether consumption for this item is tracked per lot (FIFO).
    pub lot_tracked: bool,
    /// Items are soft-retired, never deleted.
    pub retired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Stock available for new reservations.
    pub fn available_stock(&self) -> i64 {
        self.current_stock - self.reserved_stock
    }

    /// Current on-hand valuation.
    pub fn value(&self) -> Decimal {
        Decimal::from(self.current_stock) * self.unit_cost
    }
}
