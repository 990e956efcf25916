//! Error types for SeedCheck

use thiserror::Error;

/// Main error type for SeedCheck
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Placement check error: {0}")]
    Placement(String),

    #[error("DNS error: {0}")]
    Dns(String),

    #[error("Spam check error: {0}")]
    SpamCheck(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for SeedCheck
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Storage(_) => 500,
            Error::Dispatch(_) => 502,
            Error::Placement(_) => 502,
            Error::Dns(_) => 502,
            Error::SpamCheck(_) => 502,
            Error::Validation(_) => 422,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Storage(_) => "STORAGE_ERROR",
            Error::Dispatch(_) => "DISPATCH_ERROR",
            Error::Placement(_) => "PLACEMENT_ERROR",
            Error::Dns(_) => "DNS_ERROR",
            Error::SpamCheck(_) => "SPAM_CHECK_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
