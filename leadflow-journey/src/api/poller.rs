//! Reconciliation poller endpoints

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use crate::poller::{PollOutcome, PollerStatus};
use crate::AppState;

/// POST /api/poller/run
///
/// Runs one reconciliation pass now. Returns `skipped: true` when a timer
/// run is already in flight.
pub async fn run_poller(State(state): State<AppState>) -> Json<PollOutcome> {
    info!("Manual reconciliation run requested");
    let outcome = state.poller.poll_once().await;

    if let Some(err) = &outcome.error {
        *state.last_error.write().await = Some(err.clone());
    }
    Json(outcome)
}

/// GET /api/poller/status
pub async fn poller_status(State(state): State<AppState>) -> Json<PollerStatus> {
    Json(state.poller.status().await)
}

/// Build poller routes
pub fn poller_routes() -> Router<AppState> {
    Router::new()
        .route("/api/poller/run", post(run_poller))
        .route("/api/poller/status", get(poller_status))
}
