//! HTTP API handlers.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};

use crate::arbitrage::{CoordinatorStats, ExecutionCoordinator};
use crate::trading::{InMemoryLedger, LedgerSummary, Operation, OperationStatus};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is polling.
    pub ready: Arc<AtomicBool>,
    /// Terminal operations.
    pub ledger: Arc<InMemoryLedger>,
    /// Execution coordinator, for budget and counters.
    pub coordinator: Arc<ExecutionCoordinator>,
    /// Prometheus exporter handle, when metrics are installed.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(ledger: Arc<InMemoryLedger>, coordinator: Arc<ExecutionCoordinator>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            ledger,
            coordinator,
            prometheus: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether service is ready.
    pub ready: bool,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// Operations holding an execution slot.
    pub in_flight: usize,
    /// Execution slots.
    pub max_concurrent: usize,
    /// Coordinator counters.
    pub coordinator: CoordinatorStats,
    /// Ledger totals.
    pub ledger: LedgerSummary,
}

/// Query for the operations listing.
#[derive(Debug, Deserialize)]
pub struct OperationsQuery {
    /// Filter by status (`completed` or `failed`).
    pub status: Option<String>,
}

/// Error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let is_ready = state.is_ready();
    let response = ReadyResponse { ready: is_ready };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns engine status and totals.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let budget = state.coordinator.budget();
    let status = if state.is_ready() { "running" } else { "starting" };

    Json(StatusResponse {
        status,
        in_flight: budget.in_flight(),
        max_concurrent: budget.max(),
        coordinator: state.coordinator.stats(),
        ledger: state.ledger.summary(),
    })
}

/// Recorded operations, optionally filtered by status.
pub async fn operations(
    State(state): State<AppState>,
    Query(query): Query<OperationsQuery>,
) -> Response {
    let Some(raw) = query.status else {
        return Json(state.ledger.all()).into_response();
    };

    match OperationStatus::from_str(&raw) {
        Ok(status) => {
            let ops: Vec<Operation> = state.ledger.with_status(status);
            Json(ops).into_response()
        }
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("unknown status '{raw}'"),
            }),
        )
            .into_response(),
    }
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.prometheus {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics exporter not installed").into_response(),
    }
}
