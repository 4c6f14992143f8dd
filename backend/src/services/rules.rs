//! Rule-driven alerting: condition evaluation on a fixed polling cycle
//!
//! Rules are evaluated independently of the per-mutation threshold checks.
//! Schedule windows and cooldowns apply here only; a rule whose evaluation
//! fails is skipped for the cycle and retried on the next sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;
use validator::Validate;

use shared::{
    AlertCategory, AlertRule, AlertSeverity, Comparison, ConditionValue, EscalationStep,
    InventoryItem, RuleAction, RuleCondition, RuleMetric, ScheduleWindow,
};

use crate::error::{AppError, AppResult};
use crate::store::{AlertStore, InventoryStore};

use super::alerts::{AlertRequest, AlertService};

/// Input for creating an alert rule
#[derive(Debug, Deserialize, Validate)]
pub struct CreateRuleInput {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
    #[serde(default)]
    pub schedule: Vec<ScheduleWindow>,
    #[validate(range(min = 0))]
    pub cooldown_minutes: i64,
    #[serde(default)]
    pub escalations: Vec<EscalationStep>,
}

/// Input for updating an alert rule
#[derive(Debug, Default, Deserialize)]
pub struct UpdateRuleInput {
    pub name: Option<String>,
    pub category: Option<AlertCategory>,
    pub severity: Option<AlertSeverity>,
    pub conditions: Option<Vec<RuleCondition>>,
    pub actions: Option<Vec<RuleAction>>,
    pub schedule: Option<Vec<ScheduleWindow>>,
    pub cooldown_minutes: Option<i64>,
    pub escalations: Option<Vec<EscalationStep>>,
    pub is_active: Option<bool>,
}

/// A computed metric value for one item.
#[derive(Debug, Clone, PartialEq)]
enum MetricValue {
    Number(Decimal),
    Text(String),
}

/// Evaluates configured rules against live ledger state on a polling cycle.
pub struct AlertRuleEngine {
    inventory: Arc<dyn InventoryStore>,
    store: Arc<dyn AlertStore>,
    alerts: Arc<AlertService>,
    poll_interval: Duration,
    shutdown: Notify,
}

impl AlertRuleEngine {
    /// Create a new AlertRuleEngine instance.
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        store: Arc<dyn AlertStore>,
        alerts: Arc<AlertService>,
        poll_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            inventory,
            store,
            alerts,
            poll_interval,
            shutdown: Notify::new(),
        })
    }

    // ========================================================================
    // Rule administration
    // ========================================================================

    pub async fn create_rule(&self, input: CreateRuleInput) -> AppResult<AlertRule> {
        input.validate().map_err(|e| AppError::Validation {
            field: "rule".to_string(),
            message: e.to_string(),
        })?;
        if input.conditions.is_empty() {
            return Err(AppError::Validation {
                field: "conditions".to_string(),
                message: "a rule needs at least one condition".to_string(),
            });
        }

        let now = Utc::now();
        let rule = AlertRule {
            id: Uuid::new_v4(),
            name: input.name,
            category: input.category,
            severity: input.severity,
            conditions: input.conditions,
            actions: input.actions,
            schedule: input.schedule,
            cooldown_minutes: input.cooldown_minutes,
            escalations: input.escalations,
            is_active: true,
            last_triggered_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_rule(&rule).await?;

        tracing::info!(rule_id = %rule.id, name = %rule.name, "alert rule created");
        Ok(rule)
    }

    pub async fn update_rule(&self, rule_id: Uuid, input: UpdateRuleInput) -> AppResult<AlertRule> {
        let mut rule = self
            .store
            .get_rule(rule_id)
            .await?
            .ok_or(AppError::RuleNotFound(rule_id))?;

        if let Some(name) = input.name {
            rule.name = name;
        }
        if let Some(category) = input.category {
            rule.category = category;
        }
        if let Some(severity) = input.severity {
            rule.severity = severity;
        }
        if let Some(conditions) = input.conditions {
            if conditions.is_empty() {
                return Err(AppError::Validation {
                    field: "conditions".to_string(),
                    message: "a rule needs at least one condition".to_string(),
                });
            }
            rule.conditions = conditions;
        }
        if let Some(actions) = input.actions {
            rule.actions = actions;
        }
        if let Some(schedule) = input.schedule {
            rule.schedule = schedule;
        }
        if let Some(cooldown) = input.cooldown_minutes {
            if cooldown < 0 {
                return Err(AppError::Validation {
                    field: "cooldown_minutes".to_string(),
                    message: "cooldown cannot be negative".to_string(),
                });
            }
            rule.cooldown_minutes = cooldown;
        }
        if let Some(escalations) = input.escalations {
            rule.escalations = escalations;
        }
        if let Some(active) = input.is_active {
            rule.is_active = active;
        }
        rule.updated_at = Utc::now();

        self.store.update_rule(&rule).await?;
        Ok(rule)
    }

    pub async fn set_rule_active(&self, rule_id: Uuid, active: bool) -> AppResult<AlertRule> {
        self.update_rule(
            rule_id,
            UpdateRuleInput {
                is_active: Some(active),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn get_rule(&self, rule_id: Uuid) -> AppResult<AlertRule> {
        self.store
            .get_rule(rule_id)
            .await?
            .ok_or(AppError::RuleNotFound(rule_id))
    }

    pub async fn list_rules(&self) -> AppResult<Vec<AlertRule>> {
        Ok(self.store.list_rules(false).await?)
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// One evaluation sweep over all active rules. Returns how many rules
    /// triggered a new alert.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> usize {
        let rules = match self.store.list_rules(true).await {
            Ok(rules) => rules,
            Err(e) => {
                tracing::error!(error = %e, "failed to load rules; skipping cycle");
                return 0;
            }
        };

        let mut triggered = 0;
        for rule in rules {
            match self.evaluate_rule(&rule, now).await {
                Ok(true) => triggered += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        rule_id = %rule.id,
                        error = %e,
                        "rule evaluation failed; retrying next cycle"
                    );
                }
            }
        }
        triggered
    }

    async fn evaluate_rule(&self, rule: &AlertRule, now: DateTime<Utc>) -> AppResult<bool> {
        if !rule.in_schedule(now) {
            return Ok(false);
        }
        if rule.in_cooldown(now) {
            return Ok(false);
        }

        let Some(item) = self.find_match(rule, now).await? else {
            return Ok(false);
        };

        let request = AlertRequest {
            rule_id: Some(rule.id),
            item_id: Some(item.id),
            kind: format!("rule:{}", rule.id),
            category: rule.category,
            severity: rule.severity,
            title: rule.name.clone(),
            message: format!("Rule '{}' matched for item {}", rule.name, item.id),
            actions: rule.actions.clone(),
            escalations: rule.escalations.clone(),
        };

        let raised = self.alerts.raise(request).await?;
        if raised.is_some() {
            self.store.record_rule_trigger(rule.id, now).await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// First non-retired item for which every condition of the rule holds.
    async fn find_match(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> AppResult<Option<InventoryItem>> {
        let items = self.inventory.list_items(None).await?;
        for item in items {
            if item.retired {
                continue;
            }
            if self.item_matches(rule, &item, now).await? {
                return Ok(Some(item));
            }
        }
        Ok(None)
    }

    async fn item_matches(
        &self,
        rule: &AlertRule,
        item: &InventoryItem,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        for condition in &rule.conditions {
            if condition.item_id.map(|id| id != item.id).unwrap_or(false) {
                return Ok(false);
            }
            if condition
                .store_id
                .map(|id| id != item.store_id)
                .unwrap_or(false)
            {
                return Ok(false);
            }
            let value = self.metric_value(condition.metric, item, now).await?;
            if !compare(value, condition.op, &condition.value) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn metric_value(
        &self,
        metric: RuleMetric,
        item: &InventoryItem,
        now: DateTime<Utc>,
    ) -> AppResult<Option<MetricValue>> {
        let day_ago = now - chrono::Duration::hours(24);
        let value = match metric {
            RuleMetric::CurrentStock => Some(MetricValue::Number(item.current_stock.into())),
            RuleMetric::AvailableStock => Some(MetricValue::Number(item.available_stock().into())),
            RuleMetric::ReservedStock => Some(MetricValue::Number(item.reserved_stock.into())),
            RuleMetric::StockValue => Some(MetricValue::Number(item.value())),
            RuleMetric::UnitCost => Some(MetricValue::Number(item.unit_cost)),
            RuleMetric::DaysUntilExpiry => {
                let lots = self.inventory.active_lots(item.id).await?;
                let today = now.date_naive();
                lots.iter()
                    .filter_map(|l| l.expiry_date)
                    .map(|expiry| (expiry - today).num_days())
                    .min()
                    .map(|days| MetricValue::Number(days.into()))
            }
            RuleMetric::Outflow24h => {
                let flow = self
                    .inventory
                    .movement_flow_since(item.id, day_ago, false)
                    .await?;
                Some(MetricValue::Number(flow.into()))
            }
            RuleMetric::Inflow24h => {
                let flow = self
                    .inventory
                    .movement_flow_since(item.id, day_ago, true)
                    .await?;
                Some(MetricValue::Number(flow.into()))
            }
            RuleMetric::ProductId => Some(MetricValue::Text(item.product_id.to_string())),
            RuleMetric::StoreId => Some(MetricValue::Text(item.store_id.to_string())),
        };
        Ok(value)
    }

    // ========================================================================
    // Polling loop
    // ========================================================================

    /// Start the background evaluation loop. Returns the task handle; call
    /// `stop` and await the handle for a clean shutdown.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        let engine = self;
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = engine.poll_interval.as_secs(),
                "alert rule engine started"
            );

            let mut tick = tokio::time::interval(engine.poll_interval);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = engine.shutdown.notified() => {
                        break;
                    }
                    _ = tick.tick() => {
                        let triggered = engine.run_cycle(Utc::now()).await;
                        if triggered > 0 {
                            tracing::info!(triggered, "rule sweep raised alerts");
                        }
                    }
                }
            }

            tracing::info!("alert rule engine stopped");
        })
    }

    /// Request the polling loop to stop after the current sweep.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }
}

/// A condition with no computable metric (e.g. no lot has an expiry date)
/// does not hold.
fn compare(actual: Option<MetricValue>, op: Comparison, expected: &ConditionValue) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (actual, expected) {
        (MetricValue::Number(a), ConditionValue::Number(b)) => match op {
            Comparison::Gt => a > *b,
            Comparison::Gte => a >= *b,
            Comparison::Lt => a < *b,
            Comparison::Lte => a <= *b,
            Comparison::Eq => a == *b,
            Comparison::Contains => false,
        },
        (MetricValue::Text(a), ConditionValue::Text(b)) => match op {
            Comparison::Eq => a == *b,
            Comparison::Contains => a.contains(b.as_str()),
            _ => false,
        },
        _ => false,
    }
}
