//! Standalone domain validation handler

use axum::{
    extract::{Path, Query, State},
    Json,
};
use seedcheck_common::types::DnsValidationResult;
use seedcheck_common::Error;
use seedcheck_core::dns::is_valid_domain;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::routes::AppState;

/// Domain validation query parameters
#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    /// DKIM selector to check; common selectors are probed when absent
    pub selector: Option<String>,
}

/// Validate SPF, DKIM, and DMARC for a domain without sending anything
pub async fn validate_domain(
    State(state): State<Arc<AppState>>,
    Path(domain): Path<String>,
    Query(query): Query<ValidateQuery>,
) -> ApiResult<Json<DnsValidationResult>> {
    if !is_valid_domain(&domain) {
        return Err(Error::Validation(format!("Invalid domain name: {}", domain)).into());
    }

    let result = state
        .validator
        .validate(&domain, query.selector.as_deref())
        .await;

    Ok(Json(result))
}
