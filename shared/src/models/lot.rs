//! Lot tracking for FIFO consumption and expiry monitoring

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lot lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotStatus {
    Active,
    Expired,
    Reserved,
    Consumed,
}

impl LotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LotStatus::Active => "active",
            LotStatus::Expired => "expired",
            LotStatus::Reserved => "reserved",
            LotStatus::Consumed => "consumed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(LotStatus::Active),
            "expired" => Some(LotStatus::Expired),
            "reserved" => Some(LotStatus::Reserved),
            "consumed" => Some(LotStatus::Consumed),
            _ => None,
        }
    }
}

/// A batch of stock received together.
///
/// Lots are depleted oldest-received-first. Lot quantities are advisory with
/// respect to the item aggregate: the ledger's reconciliation pass
/// cross-checks the active-lot sum against `current_stock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lot {
    pub id: Uuid,
    pub item_id: Uuid,
    pub lot_number: String,
    pub quantity_remaining: i64,
    pub unit_cost: Decimal,
    pub received_date: DateTime<Utc>,
    pub expiry_date: Option<NaiveDate>,
    pub status: LotStatus,
    pub created_at: DateTime<Utc>,
}
