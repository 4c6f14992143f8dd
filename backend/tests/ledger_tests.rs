//! Stock ledger tests
//!
//! Covers the core ledger properties:
//! - current stock always equals the signed sum of recorded movements
//! - reservations never oversell, even under concurrent callers
//! - FIFO consumption depletes oldest lots first and never partially applies
//! - over-release is clamped to zero rather than rejected

mod common;

use proptest::prelude::*;
use rust_decimal::Decimal;
use tokio_test::assert_ok;
use uuid::Uuid;

use common::{harness, movement, receipt_with_lot, seed_item};
use resto_ops_backend::error::AppError;
use resto_ops_backend::store::InventoryStore;
use shared::{LotStatus, MovementKind};

// ============================================================================
// Movements
// ============================================================================

#[tokio::test]
async fn apply_movement_updates_current_stock() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;

    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 10))
        .await
        .unwrap();
    h.ledger
        .apply_movement(item.id, movement(MovementKind::Out, 4))
        .await
        .unwrap();

    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.current_stock, 6);

    let movements = h.ledger.movements(item.id, 10).await.unwrap();
    assert_eq!(movements.len(), 2);
}

#[tokio::test]
async fn loss_movements_reduce_stock() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;

    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 10))
        .await
        .unwrap();
    h.ledger
        .apply_movement(item.id, movement(MovementKind::Loss, 3))
        .await
        .unwrap();

    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.current_stock, 7);
}

#[tokio::test]
async fn zero_quantity_movement_is_rejected() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;

    let result = h
        .ledger
        .apply_movement(item.id, movement(MovementKind::In, 0))
        .await;
    assert!(matches!(result, Err(AppError::Validation { .. })));
}

#[tokio::test]
async fn movement_on_missing_item_fails() {
    let h = harness();

    let result = h
        .ledger
        .apply_movement(Uuid::new_v4(), movement(MovementKind::In, 5))
        .await;
    assert!(matches!(result, Err(AppError::ItemNotFound(_))));
}

#[tokio::test]
async fn reconcile_reports_consistency() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, true).await;

    h.ledger
        .apply_movement(item.id, receipt_with_lot(30, "LOT-A"))
        .await
        .unwrap();
    h.ledger.consume_fifo(item.id, 12, None).await.unwrap();

    let report = h.ledger.reconcile_item(item.id).await.unwrap();
    assert_eq!(report.current_stock, 18);
    assert_eq!(report.movement_sum, 18);
    assert_eq!(report.active_lot_sum, Some(18));
    assert!(report.ledger_consistent());
    assert!(report.lots_consistent());
}

// ============================================================================
// Item lifecycle
// ============================================================================

#[tokio::test]
async fn duplicate_store_product_pair_is_rejected() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 100, false).await;

    let result = h
        .ledger
        .create_item(resto_ops_backend::services::CreateItemInput {
            store_id: item.store_id,
            product_id: item.product_id,
            min_threshold: 0,
            max_threshold: 100,
            unit_cost: Decimal::new(100, 2),
            lot_tracked: false,
        })
        .await;
    assert!(matches!(result, Err(AppError::Validation { .. })));
}

#[tokio::test]
async fn retired_items_keep_their_history() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;

    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 5))
        .await
        .unwrap();
    assert_ok!(h.ledger.retire_item(item.id).await);

    let item = h.ledger.get_item(item.id).await.unwrap();
    assert!(item.retired);
    assert_eq!(item.current_stock, 5);
    assert_eq!(h.ledger.movements(item.id, 10).await.unwrap().len(), 1);
}

// ============================================================================
// Reservations
// ============================================================================

#[tokio::test]
async fn reserve_rejects_more_than_available() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;
    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 4))
        .await
        .unwrap();

    let result = h.ledger.reserve(item.id, 5, "order-1").await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientStock {
            requested: 5,
            available: 4,
            ..
        })
    ));

    // The failed reservation must not change anything.
    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.reserved_stock, 0);
}

#[tokio::test]
async fn reserve_and_release_round_trip() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;
    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 10))
        .await
        .unwrap();

    h.ledger.reserve(item.id, 3, "order-1").await.unwrap();
    let reserved = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(reserved.reserved_stock, 3);
    assert_eq!(reserved.available_stock(), 7);

    h.ledger.release(item.id, 3, "order-1").await.unwrap();
    let released = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(released.reserved_stock, 0);
}

#[tokio::test]
async fn release_beyond_reserved_clamps_to_zero() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;
    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 10))
        .await
        .unwrap();
    h.ledger.reserve(item.id, 2, "order-1").await.unwrap();

    // Releasing more than reserved succeeds and floors at zero.
    h.ledger.release(item.id, 5, "order-1").await.unwrap();
    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.reserved_stock, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reservations_never_oversell() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, false).await;
    h.ledger
        .apply_movement(item.id, movement(MovementKind::In, 10))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for n in 0..8 {
        let ledger = h.ledger.clone();
        let item_id = item.id;
        handles.push(tokio::spawn(async move {
            ledger.reserve(item_id, 3, &format!("order-{}", n)).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            successes += 1;
        }
    }

    // 8 concurrent reservations of 3 against 10 available: exactly 3 fit.
    assert_eq!(successes, 3);
    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.reserved_stock, 9);
    assert!(item.reserved_stock <= item.current_stock);
}

// ============================================================================
// FIFO consumption
// ============================================================================

#[tokio::test]
async fn consume_fifo_depletes_oldest_lot_first() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, true).await;

    h.ledger
        .apply_movement(item.id, receipt_with_lot(10, "LOT-A"))
        .await
        .unwrap();
    h.ledger
        .apply_movement(item.id, receipt_with_lot(20, "LOT-B"))
        .await
        .unwrap();

    let movements = h
        .ledger
        .consume_fifo(item.id, 15, Some("order-9"))
        .await
        .unwrap();

    // One movement per lot drawn, oldest first.
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0].lot_number.as_deref(), Some("LOT-A"));
    assert_eq!(movements[0].quantity, -10);
    assert_eq!(movements[1].lot_number.as_deref(), Some("LOT-B"));
    assert_eq!(movements[1].quantity, -5);

    // LOT-A is consumed; LOT-B keeps the remainder.
    let lots = h.store.active_lots(item.id).await.unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0].lot_number, "LOT-B");
    assert_eq!(lots[0].quantity_remaining, 15);
    assert_eq!(lots[0].status, LotStatus::Active);

    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.current_stock, 15);
}

#[tokio::test]
async fn consume_fifo_with_insufficient_lots_applies_nothing() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, true).await;
    h.ledger
        .apply_movement(item.id, receipt_with_lot(5, "LOT-A"))
        .await
        .unwrap();

    let result = h.ledger.consume_fifo(item.id, 8, None).await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientStock {
            requested: 8,
            available: 5,
            ..
        })
    ));

    // Nothing may have been drawn or written.
    let lots = h.store.active_lots(item.id).await.unwrap();
    assert_eq!(lots[0].quantity_remaining, 5);
    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.current_stock, 5);
    assert_eq!(h.ledger.movements(item.id, 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn consume_fifo_marks_exactly_depleted_lot_consumed() {
    let h = harness();
    let item = seed_item(&h.ledger, 0, 1_000, true).await;
    h.ledger
        .apply_movement(item.id, receipt_with_lot(10, "LOT-A"))
        .await
        .unwrap();

    h.ledger.consume_fifo(item.id, 10, None).await.unwrap();

    assert!(h.store.active_lots(item.id).await.unwrap().is_empty());
    let item = h.ledger.get_item(item.id).await.unwrap();
    assert_eq!(item.current_stock, 0);
}

// ============================================================================
// Property: ledger consistency
// ============================================================================

fn movement_strategy() -> impl Strategy<Value = (MovementKind, i64)> {
    (0usize..3, 1i64..100).prop_map(|(kind, quantity)| {
        let kind = match kind {
            0 => MovementKind::In,
            1 => MovementKind::Out,
            _ => MovementKind::Adjustment,
        };
        (kind, quantity)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// For any sequence of movements, the cached stock equals the signed sum
    /// of the recorded movement quantities.
    #[test]
    fn prop_current_stock_equals_movement_sum(
        movements in prop::collection::vec(movement_strategy(), 1..20)
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let h = harness();
            let item = seed_item(&h.ledger, 0, i64::MAX, false).await;

            let mut expected = 0i64;
            for (kind, quantity) in &movements {
                expected += match kind {
                    MovementKind::In | MovementKind::Adjustment => *quantity,
                    MovementKind::Out | MovementKind::Loss => -*quantity,
                };
                h.ledger
                    .apply_movement(item.id, movement(*kind, *quantity))
                    .await
                    .unwrap();
            }

            let item = h.ledger.get_item(item.id).await.unwrap();
            let sum = h.store.movement_sum(item.id).await.unwrap();
            assert_eq!(item.current_stock, expected);
            assert_eq!(item.current_stock, sum);
        });
    }
}
