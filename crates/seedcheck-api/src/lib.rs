//! SeedCheck API - REST API server
//!
//! This crate provides the REST API for SeedCheck: submitting
//! deliverability tests, reading their results, and running standalone
//! domain validations.

pub mod error;
pub mod handlers;
pub mod routes;

pub use routes::{create_router, AppState};
