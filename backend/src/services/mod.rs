//! Core services: the stock ledger and the alerting pipeline

pub mod alerts;
pub mod dispatch;
pub mod escalation;
pub mod ledger;
pub mod rules;
pub mod threshold;

pub use alerts::{AlertRequest, AlertService};
pub use dispatch::{ActionExecutor, ActionHooks, LogDispatcher, NotificationDispatcher};
pub use escalation::EscalationScheduler;
pub use ledger::{CreateItemInput, ReconciliationReport, RecordMovementInput, StockLedger};
pub use rules::{AlertRuleEngine, CreateRuleInput, UpdateRuleInput};
