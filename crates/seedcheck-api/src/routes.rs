//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use seedcheck_core::{DnsValidator, TestPipeline, TestStore};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{domains, health, tests};

/// Shared state handed to every handler
pub struct AppState {
    pub store: Arc<dyn TestStore>,
    pub pipeline: Arc<TestPipeline>,
    pub validator: Arc<DnsValidator>,
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no state required)
    let health_routes = Router::new().route("/", get(health::health));

    // Test routes
    let test_routes = Router::new()
        .route("/", post(tests::create_test))
        .route("/", get(tests::list_tests))
        .route("/:id", get(tests::get_test));

    // Standalone domain validation
    let domain_routes = Router::new().route("/:domain/validate", get(domains::validate_domain));

    let api_v1 = Router::new()
        .nest("/tests", test_routes)
        .nest("/domains", domain_routes)
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
