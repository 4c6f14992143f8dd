//! Postgres persistence gateway
//!
//! Movement appends, stock updates and FIFO lot writes that must agree are
//! committed in a single transaction.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use shared::{
    Alert, AlertCategory, AlertRule, AlertSeverity, AlertStatus, Escalation, EscalationStatus,
    InventoryItem, Lot, LotStatus, MovementKind, StockMovement,
};

use super::{AlertStore, InventoryStore, LotDraw, StoreError, StoreResult};

/// Postgres-backed gateway.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new PgStore over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn to_json<T: Serialize>(value: &T, what: &str) -> StoreResult<serde_json::Value> {
    serde_json::to_value(value)
        .map_err(|e| StoreError::Backend(format!("failed to encode {}: {}", what, e)))
}

fn from_json<T: DeserializeOwned>(value: serde_json::Value, what: &str) -> StoreResult<T> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::Backend(format!("failed to decode {}: {}", what, e)))
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    store_id: Uuid,
    product_id: Uuid,
    current_stock: i64,
    reserved_stock: i64,
    min_threshold: i64,
    max_threshold: i64,
    unit_cost: Decimal,
    lot_tracked: bool,
    retired: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRow> for InventoryItem {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id,
            store_id: row.store_id,
            product_id: row.product_id,
            current_stock: row.current_stock,
            reserved_stock: row.reserved_stock,
            min_threshold: row.min_threshold,
            max_threshold: row.max_threshold,
            unit_cost: row.unit_cost,
            lot_tracked: row.lot_tracked,
            retired: row.retired,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    item_id: Uuid,
    store_id: Uuid,
    quantity: i64,
    kind: String,
    reason: String,
    reference: Option<String>,
    lot_number: Option<String>,
    expiry_date: Option<NaiveDate>,
    unit_cost: Option<Decimal>,
    actor: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::from_str(&row.kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown movement kind: {}", row.kind)))?;
        Ok(Self {
            id: row.id,
            item_id: row.item_id,
            store_id: row.store_id,
            quantity: row.quantity,
            kind,
            reason: row.reason,
            reference: row.reference,
            lot_number: row.lot_number,
            expiry_date: row.expiry_date,
            unit_cost: row.unit_cost,
            actor: row.actor,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct LotRow {
    id: Uuid,
    item_id: Uuid,
    lot_number: String,
    quantity_remaining: i64,
    unit_cost: Decimal,
    received_date: DateTime<Utc>,
    expiry_date: Option<NaiveDate>,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LotRow> for Lot {
    type Error = StoreError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        let status = LotStatus::from_str(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown lot status: {}", row.status)))?;
        Ok(Self {
            id: row.id,
            item_id: row.item_id,
            lot_number: row.lot_number,
            quantity_remaining: row.quantity_remaining,
            unit_cost: row.unit_cost,
            received_date: row.received_date,
            expiry_date: row.expiry_date,
            status,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: Uuid,
    name: String,
    category: String,
    severity: String,
    conditions: serde_json::Value,
    actions: serde_json::Value,
    schedule: serde_json::Value,
    cooldown_minutes: i64,
    escalations: serde_json::Value,
    is_active: bool,
    last_triggered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RuleRow> for AlertRule {
    type Error = StoreError;

    fn try_from(row: RuleRow) -> Result<Self, Self::Error> {
        let category = AlertCategory::from_str(&row.category)
            .ok_or_else(|| StoreError::Backend(format!("unknown category: {}", row.category)))?;
        let severity = AlertSeverity::from_str(&row.severity)
            .ok_or_else(|| StoreError::Backend(format!("unknown severity: {}", row.severity)))?;
        Ok(Self {
            id: row.id,
            name: row.name,
            category,
            severity,
            conditions: from_json(row.conditions, "rule conditions")?,
            actions: from_json(row.actions, "rule actions")?,
            schedule: from_json(row.schedule, "rule schedule")?,
            cooldown_minutes: row.cooldown_minutes,
            escalations: from_json(row.escalations, "rule escalations")?,
            is_active: row.is_active,
            last_triggered_at: row.last_triggered_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AlertRow {
    id: Uuid,
    rule_id: Option<Uuid>,
    item_id: Option<Uuid>,
    kind: String,
    category: String,
    severity: String,
    title: String,
    message: String,
    status: String,
    created_at: DateTime<Utc>,
    acknowledged_at: Option<DateTime<Utc>>,
    acknowledged_by: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    resolved_by: Option<String>,
}

impl TryFrom<AlertRow> for Alert {
    type Error = StoreError;

    fn try_from(row: AlertRow) -> Result<Self, Self::Error> {
        let category = AlertCategory::from_str(&row.category)
            .ok_or_else(|| StoreError::Backend(format!("unknown category: {}", row.category)))?;
        let severity = AlertSeverity::from_str(&row.severity)
            .ok_or_else(|| StoreError::Backend(format!("unknown severity: {}", row.severity)))?;
        let status = AlertStatus::from_str(&row.status)
            .ok_or_else(|| StoreError::Backend(format!("unknown alert status: {}", row.status)))?;
        Ok(Self {
            id: row.id,
            rule_id: row.rule_id,
            item_id: row.item_id,
            kind: row.kind,
            category,
            severity,
            title: row.title,
            message: row.message,
            status,
            created_at: row.created_at,
            acknowledged_at: row.acknowledged_at,
            acknowledged_by: row.acknowledged_by,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
        })
    }
}

#[derive(Debug, FromRow)]
struct EscalationRow {
    id: Uuid,
    alert_id: Uuid,
    level: i32,
    fire_at: DateTime<Utc>,
    actions: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    fired_at: Option<DateTime<Utc>>,
}

impl TryFrom<EscalationRow> for Escalation {
    type Error = StoreError;

    fn try_from(row: EscalationRow) -> Result<Self, Self::Error> {
        let status = EscalationStatus::from_str(&row.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown escalation status: {}", row.status))
        })?;
        Ok(Self {
            id: row.id,
            alert_id: row.alert_id,
            level: row.level,
            fire_at: row.fire_at,
            actions: from_json(row.actions, "escalation actions")?,
            status,
            created_at: row.created_at,
            fired_at: row.fired_at,
        })
    }
}

const ITEM_COLUMNS: &str = "id, store_id, product_id, current_stock, reserved_stock, \
     min_threshold, max_threshold, unit_cost, lot_tracked, retired, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, item_id, store_id, quantity, kind, reason, reference, \
     lot_number, expiry_date, unit_cost, actor, created_at";

const LOT_COLUMNS: &str = "id, item_id, lot_number, quantity_remaining, unit_cost, \
     received_date, expiry_date, status, created_at";

const RULE_COLUMNS: &str = "id, name, category, severity, conditions, actions, schedule, \
     cooldown_minutes, escalations, is_active, last_triggered_at, created_at, updated_at";

const ALERT_COLUMNS: &str = "id, rule_id, item_id, kind, category, severity, title, message, \
     status, created_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by";

const ESCALATION_COLUMNS: &str =
    "id, alert_id, level, fire_at, actions, status, created_at, fired_at";

// ============================================================================
// InventoryStore
// ============================================================================

#[async_trait]
impl InventoryStore for PgStore {
    async fn insert_item(&self, item: &InventoryItem) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (
                id, store_id, product_id, current_stock, reserved_stock,
                min_threshold, max_threshold, unit_cost, lot_tracked, retired,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(item.id)
        .bind(item.store_id)
        .bind(item.product_id)
        .bind(item.current_stock)
        .bind(item.reserved_stock)
        .bind(item.min_threshold)
        .bind(item.max_threshold)
        .bind(item.unit_cost)
        .bind(item.lot_tracked)
        .bind(item.retired)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM inventory_items WHERE id = $1",
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn find_item(
        &self,
        store_id: Uuid,
        product_id: Uuid,
    ) -> StoreResult<Option<InventoryItem>> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {} FROM inventory_items WHERE store_id = $1 AND product_id = $2",
            ITEM_COLUMNS
        ))
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_items(&self, store_id: Option<Uuid>) -> StoreResult<Vec<InventoryItem>> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            SELECT {}
            FROM inventory_items
            WHERE ($1::uuid IS NULL OR store_id = $1)
            ORDER BY created_at ASC
            "#,
            ITEM_COLUMNS
        ))
        .bind(store_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn set_item_retired(&self, item_id: Uuid, retired: bool) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE inventory_items SET retired = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(item_id)
        .bind(retired)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn record_movement(
        &self,
        movement: &StockMovement,
        new_lot: Option<&Lot>,
    ) -> StoreResult<InventoryItem> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, item_id, store_id, quantity, kind, reason, reference,
                lot_number, expiry_date, unit_cost, actor, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(movement.id)
        .bind(movement.item_id)
        .bind(movement.store_id)
        .bind(movement.quantity)
        .bind(movement.kind.as_str())
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(&movement.lot_number)
        .bind(movement.expiry_date)
        .bind(movement.unit_cost)
        .bind(&movement.actor)
        .bind(movement.created_at)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET current_stock = current_stock + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(movement.item_id)
        .bind(movement.quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        };

        if let Some(lot) = new_lot {
            sqlx::query(
                r#"
                INSERT INTO lots (
                    id, item_id, lot_number, quantity_remaining, unit_cost,
                    received_date, expiry_date, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(lot.id)
            .bind(lot.item_id)
            .bind(&lot.lot_number)
            .bind(lot.quantity_remaining)
            .bind(lot.unit_cost)
            .bind(lot.received_date)
            .bind(lot.expiry_date)
            .bind(lot.status.as_str())
            .bind(lot.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(row.into())
    }

    async fn record_consumption(
        &self,
        item_id: Uuid,
        movements: &[StockMovement],
        draws: &[LotDraw],
        total: i64,
    ) -> StoreResult<InventoryItem> {
        let mut tx = self.pool.begin().await?;

        for draw in draws {
            let result = sqlx::query(
                r#"
                UPDATE lots
                SET quantity_remaining = quantity_remaining - $2, status = $3
                WHERE id = $1 AND quantity_remaining >= $2
                "#,
            )
            .bind(draw.lot_id)
            .bind(draw.take)
            .bind(draw.new_status.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(StoreError::Conflict(format!(
                    "lot {} no longer has {} units available",
                    draw.lot_id, draw.take
                )));
            }
        }

        for movement in movements {
            sqlx::query(
                r#"
                INSERT INTO stock_movements (
                    id, item_id, store_id, quantity, kind, reason, reference,
                    lot_number, expiry_date, unit_cost, actor, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(movement.id)
            .bind(movement.item_id)
            .bind(movement.store_id)
            .bind(movement.quantity)
            .bind(movement.kind.as_str())
            .bind(&movement.reason)
            .bind(&movement.reference)
            .bind(&movement.lot_number)
            .bind(movement.expiry_date)
            .bind(movement.unit_cost)
            .bind(&movement.actor)
            .bind(movement.created_at)
            .execute(&mut *tx)
            .await?;
        }

        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET current_stock = current_stock - $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(total)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Err(StoreError::NotFound);
        };

        tx.commit().await?;

        Ok(row.into())
    }

    async fn update_reserved(
        &self,
        item_id: Uuid,
        expected: i64,
        new: i64,
    ) -> StoreResult<InventoryItem> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            r#"
            UPDATE inventory_items
            SET reserved_stock = $3, updated_at = NOW()
            WHERE id = $1 AND reserved_stock = $2
            RETURNING {}
            "#,
            ITEM_COLUMNS
        ))
        .bind(item_id)
        .bind(expected)
        .bind(new)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(row.into()),
            None => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS(SELECT 1 FROM inventory_items WHERE id = $1)",
                )
                .bind(item_id)
                .fetch_one(&self.pool)
                .await?;

                if exists {
                    Err(StoreError::Conflict(format!(
                        "reserved stock of item {} changed under us",
                        item_id
                    )))
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn list_movements(&self, item_id: Uuid, limit: i64) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            r#"
            SELECT {}
            FROM stock_movements
            WHERE item_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            MOVEMENT_COLUMNS
        ))
        .bind(item_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn movement_sum(&self, item_id: Uuid) -> StoreResult<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity), 0)::bigint FROM stock_movements WHERE item_id = $1",
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn movement_flow_since(
        &self,
        item_id: Uuid,
        since: DateTime<Utc>,
        inflow: bool,
    ) -> StoreResult<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(ABS(quantity)), 0)::bigint
            FROM stock_movements
            WHERE item_id = $1 AND created_at >= $2 AND (quantity > 0) = $3
            "#,
        )
        .bind(item_id)
        .bind(since)
        .bind(inflow)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }

    async fn insert_lot(&self, lot: &Lot) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lots (
                id, item_id, lot_number, quantity_remaining, unit_cost,
                received_date, expiry_date, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(lot.id)
        .bind(lot.item_id)
        .bind(&lot.lot_number)
        .bind(lot.quantity_remaining)
        .bind(lot.unit_cost)
        .bind(lot.received_date)
        .bind(lot.expiry_date)
        .bind(lot.status.as_str())
        .bind(lot.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn active_lots(&self, item_id: Uuid) -> StoreResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            r#"
            SELECT {}
            FROM lots
            WHERE item_id = $1 AND status = 'active'
            ORDER BY received_date ASC, created_at ASC
            "#,
            LOT_COLUMNS
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn lot_quantity_sum(&self, item_id: Uuid) -> StoreResult<i64> {
        let sum = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(quantity_remaining), 0)::bigint
            FROM lots
            WHERE item_id = $1 AND status = 'active'
            "#,
        )
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum)
    }
}

// ============================================================================
// AlertStore
// ============================================================================

#[async_trait]
impl AlertStore for PgStore {
    async fn insert_rule(&self, rule: &AlertRule) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_rules (
                id, name, category, severity, conditions, actions, schedule,
                cooldown_minutes, escalations, is_active, last_triggered_at,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(rule.category.as_str())
        .bind(rule.severity.as_str())
        .bind(to_json(&rule.conditions, "rule conditions")?)
        .bind(to_json(&rule.actions, "rule actions")?)
        .bind(to_json(&rule.schedule, "rule schedule")?)
        .bind(rule.cooldown_minutes)
        .bind(to_json(&rule.escalations, "rule escalations")?)
        .bind(rule.is_active)
        .bind(rule.last_triggered_at)
        .bind(rule.created_at)
        .bind(rule.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_rule(&self, rule: &AlertRule) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE alert_rules
            SET name = $2, category = $3, severity = $4, conditions = $5,
                actions = $6, schedule = $7, cooldown_minutes = $8,
                escalations = $9, is_active = $10, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(rule.id)
        .bind(&rule.name)
        .bind(rule.category.as_str())
        .bind(rule.severity.as_str())
        .bind(to_json(&rule.conditions, "rule conditions")?)
        .bind(to_json(&rule.actions, "rule actions")?)
        .bind(to_json(&rule.schedule, "rule schedule")?)
        .bind(rule.cooldown_minutes)
        .bind(to_json(&rule.escalations, "rule escalations")?)
        .bind(rule.is_active)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<Option<AlertRule>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {} FROM alert_rules WHERE id = $1",
            RULE_COLUMNS
        ))
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_rules(&self, active_only: bool) -> StoreResult<Vec<AlertRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            SELECT {}
            FROM alert_rules
            WHERE NOT $1 OR is_active
            ORDER BY created_at ASC
            "#,
            RULE_COLUMNS
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_rule_trigger(&self, rule_id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE alert_rules SET last_triggered_at = $2, updated_at = $2 WHERE id = $1",
        )
        .bind(rule_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alerts (
                id, rule_id, item_id, kind, category, severity, title, message,
                status, created_at, acknowledged_at, acknowledged_by,
                resolved_at, resolved_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(alert.id)
        .bind(alert.rule_id)
        .bind(alert.item_id)
        .bind(&alert.kind)
        .bind(alert.category.as_str())
        .bind(alert.severity.as_str())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(alert.status.as_str())
        .bind(alert.created_at)
        .bind(alert.acknowledged_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(&alert.resolved_by)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_alert(&self, alert_id: Uuid) -> StoreResult<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            "SELECT {} FROM alerts WHERE id = $1",
            ALERT_COLUMNS
        ))
        .bind(alert_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update_alert(&self, alert: &Alert) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET status = $2, acknowledged_at = $3, acknowledged_by = $4,
                resolved_at = $5, resolved_by = $6
            WHERE id = $1
            "#,
        )
        .bind(alert.id)
        .bind(alert.status.as_str())
        .bind(alert.acknowledged_at)
        .bind(&alert.acknowledged_by)
        .bind(alert.resolved_at)
        .bind(&alert.resolved_by)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn find_active_alert(
        &self,
        item_id: Option<Uuid>,
        kind: &str,
    ) -> StoreResult<Option<Alert>> {
        let row = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE status = 'active' AND kind = $1 AND item_id IS NOT DISTINCT FROM $2
            LIMIT 1
            "#,
            ALERT_COLUMNS
        ))
        .bind(kind)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_alerts(
        &self,
        status: Option<AlertStatus>,
        limit: i64,
    ) -> StoreResult<Vec<Alert>> {
        let rows = sqlx::query_as::<_, AlertRow>(&format!(
            r#"
            SELECT {}
            FROM alerts
            WHERE ($1::varchar IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2
            "#,
            ALERT_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_escalation(&self, escalation: &Escalation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escalations (
                id, alert_id, level, fire_at, actions, status, created_at, fired_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(escalation.id)
        .bind(escalation.alert_id)
        .bind(escalation.level)
        .bind(escalation.fire_at)
        .bind(to_json(&escalation.actions, "escalation actions")?)
        .bind(escalation.status.as_str())
        .bind(escalation.created_at)
        .bind(escalation.fired_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_escalation(&self, escalation_id: Uuid) -> StoreResult<Option<Escalation>> {
        let row = sqlx::query_as::<_, EscalationRow>(&format!(
            "SELECT {} FROM escalations WHERE id = $1",
            ESCALATION_COLUMNS
        ))
        .bind(escalation_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn set_escalation_status(
        &self,
        escalation_id: Uuid,
        status: EscalationStatus,
        fired_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE escalations SET status = $2, fired_at = COALESCE($3, fired_at) WHERE id = $1",
        )
        .bind(escalation_id)
        .bind(status.as_str())
        .bind(fired_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn cancel_pending_escalations(&self, alert_id: Uuid) -> StoreResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE escalations
            SET status = 'cancelled'
            WHERE alert_id = $1 AND status = 'pending'
            RETURNING id
            "#,
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn pending_escalations(&self) -> StoreResult<Vec<Escalation>> {
        let rows = sqlx::query_as::<_, EscalationRow>(&format!(
            r#"
            SELECT {}
            FROM escalations
            WHERE status = 'pending'
            ORDER BY fire_at ASC
            "#,
            ESCALATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
