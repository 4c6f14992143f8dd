//! Error taxonomy for the inventory core
//!
//! Business-rule violations (`ItemNotFound`, `InsufficientStock`) surface to
//! the caller synchronously and are never retried internally. Gateway
//! failures during a mutation also surface, since a failed write must not be
//! assumed applied. Action execution failures are non-fatal to sibling
//! actions and to the alert lifecycle.

use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("inventory item {0} not found")]
    ItemNotFound(Uuid),

    #[error("alert rule {0} not found")]
    RuleNotFound(Uuid),

    #[error("alert {0} not found")]
    AlertNotFound(Uuid),

    #[error("insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: Uuid,
        requested: i64,
        available: i64,
    },

    #[error("concurrent modification of item {0} detected")]
    ConcurrencyConflict(Uuid),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("validation error on {field}: {message}")]
    Validation { field: String, message: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("action execution failed: {0}")]
    ActionExecution(String),
}

/// Result type alias for service methods
pub type AppResult<T> = Result<T, AppError>;
