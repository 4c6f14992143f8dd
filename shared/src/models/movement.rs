//! Append-only stock movement log

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Movement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock received (supplier receipt, transfer in, return).
    In,
    /// Stock consumed or shipped out.
    Out,
    /// Manual correction; the quantity carries its own sign.
    Adjustment,
    /// Spoilage, breakage or other write-off.
    Loss,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::In => "in",
            MovementKind::Out => "out",
            MovementKind::Adjustment => "adjustment",
            MovementKind::Loss => "loss",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(MovementKind::In),
            "out" => Some(MovementKind::Out),
            "adjustment" => Some(MovementKind::Adjustment),
            "loss" => Some(MovementKind::Loss),
            _ => None,
        }
    }
}

/// An immutable stock movement fact.
///
/// `quantity` is signed: positive quantities add to stock, negative ones
/// remove from it. Movements are append-only; an item's current stock is
/// reconstructable as the running sum of its movement quantities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub store_id: Uuid,
    pub quantity: i64,
    pub kind: MovementKind,
    pub reason: String,
    /// External reference, e.g. an order id.
    pub reference: Option<String>,
    pub lot_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub unit_cost: Option<Decimal>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}
