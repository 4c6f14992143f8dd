//! Shared domain models for the restaurant operations inventory core
//!
//! This crate contains the types shared between the backend services and any
//! external caller of the core (order fulfillment, the administrative
//! surface). It deliberately carries no persistence dependencies.

pub mod models;

pub use models::*;
