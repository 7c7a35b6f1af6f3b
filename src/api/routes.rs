//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics, operations, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/metrics", get(metrics))
        // Engine endpoints
        .route("/api/v1/status", get(status))
        .route("/api/v1/operations", get(operations))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
