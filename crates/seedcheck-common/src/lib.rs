//! SeedCheck Common - shared types, errors, and configuration
//!
//! This crate holds the data model for deliverability tests (placements,
//! DNS validation results, spam scores), the workspace-wide error type,
//! and the TOML configuration layer.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{
    DispatchOutcome, DkimCheck, DmarcCheck, DmarcPolicy, DnsValidationResult, EmailAddress,
    ExecutionMode, PlacementResult, SpamRule, SpamScoreResult, SpfCheck, TestId, TestRecord,
    TestStatus,
};
