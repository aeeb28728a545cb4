//! leadflow-journey library interface
//!
//! Lead journey aggregation, pipeline classification, timeline synthesis and
//! the compliance reconciliation poller. Exposed as a library for integration
//! testing; `main.rs` wires it to SQLite and axum.

pub mod aggregator;
pub mod api;
pub mod classifier;
pub mod db;
pub mod error;
pub mod poller;
pub mod service;
pub mod sources;
pub mod timeline;

pub use crate::error::{ApiError, ApiResult};
pub use crate::poller::ReconciliationPoller;
pub use crate::service::JourneyService;

use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub journeys: Arc<JourneyService>,
    pub poller: Arc<ReconciliationPoller>,
    /// Tenant used when a request has no `?tenant=`
    pub default_tenant: Option<String>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        journeys: Arc<JourneyService>,
        poller: Arc<ReconciliationPoller>,
        default_tenant: Option<String>,
    ) -> Self {
        Self {
            journeys,
            poller,
            default_tenant,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::journey_routes())
        .merge(api::poller_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
