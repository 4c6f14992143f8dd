//! Threshold evaluation over current item state
//!
//! Runs synchronously after every ledger mutation. The stock-level checks
//! are mutually exclusive (only the most severe fires); the expiry checks
//! are independent of them and may fire alongside.

use chrono::{DateTime, Utc};

use shared::{AlertCategory, AlertSeverity, InventoryItem, Lot};

use super::alerts::AlertRequest;

/// Lots expiring within this many days raise a critical alert.
pub const EXPIRY_CRITICAL_DAYS: i64 = 3;
/// Lots expiring within this many days raise a warning.
pub const EXPIRY_WARNING_DAYS: i64 = 7;

/// Evaluate an item and its active lots against the static thresholds.
pub fn evaluate(item: &InventoryItem, lots: &[Lot], now: DateTime<Utc>) -> Vec<AlertRequest> {
    let mut requests = Vec::new();

    if let Some(request) = stock_level_check(item) {
        requests.push(request);
    }
    requests.extend(expiry_checks(item, lots, now));

    requests
}

fn stock_level_check(item: &InventoryItem) -> Option<AlertRequest> {
    if item.current_stock <= 0 {
        Some(AlertRequest::threshold(
            item,
            "out_of_stock",
            AlertCategory::Stock,
            AlertSeverity::Critical,
            "Out of stock",
            format!(
                "Item {} is out of stock (current: {})",
                item.id, item.current_stock
            ),
        ))
    } else if item.current_stock <= item.min_threshold {
        Some(AlertRequest::threshold(
            item,
            "low_stock",
            AlertCategory::Stock,
            AlertSeverity::Warning,
            "Low stock",
            format!(
                "Item {} fell below its minimum threshold (current: {}, minimum: {})",
                item.id, item.current_stock, item.min_threshold
            ),
        ))
    } else if item.current_stock >= item.max_threshold {
        Some(AlertRequest::threshold(
            item,
            "overstock",
            AlertCategory::Stock,
            AlertSeverity::Info,
            "Overstock",
            format!(
                "Item {} exceeded its maximum threshold (current: {}, maximum: {})",
                item.id, item.current_stock, item.max_threshold
            ),
        ))
    } else {
        None
    }
}

fn expiry_checks(item: &InventoryItem, lots: &[Lot], now: DateTime<Utc>) -> Vec<AlertRequest> {
    let today = now.date_naive();
    let mut critical: Option<(i64, &Lot)> = None;
    let mut warning: Option<(i64, &Lot)> = None;

    for lot in lots {
        let Some(expiry) = lot.expiry_date else {
            continue;
        };
        let days = (expiry - today).num_days();
        if days <= EXPIRY_CRITICAL_DAYS {
            if critical.map(|(d, _)| days < d).unwrap_or(true) {
                critical = Some((days, lot));
            }
        } else if days <= EXPIRY_WARNING_DAYS
            && warning.map(|(d, _)| days < d).unwrap_or(true)
        {
            warning = Some((days, lot));
        }
    }

    let mut requests = Vec::new();
    if let Some((days, lot)) = critical {
        requests.push(AlertRequest::threshold(
            item,
            "expiry_critical",
            AlertCategory::Expiry,
            AlertSeverity::Critical,
            "Lot expiring imminently",
            format!(
                "Lot {} of item {} expires in {} day(s)",
                lot.lot_number, item.id, days
            ),
        ));
    }
    if let Some((days, lot)) = warning {
        requests.push(AlertRequest::threshold(
            item,
            "expiry_warning",
            AlertCategory::Expiry,
            AlertSeverity::Warning,
            "Lot expiring soon",
            format!(
                "Lot {} of item {} expires in {} day(s)",
                lot.lot_number, item.id, days
            ),
        ));
    }
    requests
}
