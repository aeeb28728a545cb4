//! Journey read endpoints
//!
//! Thin wrappers over [`JourneyService`](crate::service::JourneyService).
//! The tenant comes from `?tenant=`, falling back to the configured default.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use leadflow_common::{LeadJourney, PipelineStage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    pub tenant: Option<String>,
}

impl TenantQuery {
    fn resolve(self, state: &AppState) -> ApiResult<String> {
        self.tenant
            .filter(|t| !t.trim().is_empty())
            .or_else(|| state.default_tenant.clone())
            .ok_or_else(|| ApiError::BadRequest("tenant is required (?tenant=)".to_string()))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JourneysResponse {
    pub tenant_id: String,
    pub count: usize,
    pub journeys: Vec<LeadJourney>,
}

/// One pipeline column
#[derive(Debug, Serialize)]
pub struct StageCount {
    pub stage: PipelineStage,
    pub label: &'static str,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCountsResponse {
    pub tenant_id: String,
    pub total: usize,
    /// Every stage, in pipeline order
    pub stages: Vec<StageCount>,
}

/// GET /api/journeys
pub async fn list_journeys(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<JourneysResponse>> {
    let tenant_id = query.resolve(&state)?;
    let journeys = state.journeys.aggregate_lead_journeys(&tenant_id).await;
    debug!(tenant_id = %tenant_id, count = journeys.len(), "Listed journeys");

    Ok(Json(JourneysResponse {
        tenant_id,
        count: journeys.len(),
        journeys,
    }))
}

/// GET /api/journeys/by-phone/:phone
pub async fn journey_by_phone(
    State(state): State<AppState>,
    Path(phone): Path<String>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<LeadJourney>> {
    let tenant_id = query.resolve(&state)?;
    state
        .journeys
        .get_lead_journey_by_phone(&tenant_id, &phone)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no journey for phone {}", phone)))
}

/// GET /api/pipeline/counts
pub async fn pipeline_counts(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<StageCountsResponse>> {
    let tenant_id = query.resolve(&state)?;
    let counts = state.journeys.get_pipeline_stage_counts(&tenant_id).await;

    let stages: Vec<StageCount> = counts
        .into_iter()
        .map(|(stage, count)| StageCount {
            stage,
            label: stage.label(),
            count,
        })
        .collect();

    Ok(Json(StageCountsResponse {
        tenant_id,
        total: stages.iter().map(|s| s.count).sum(),
        stages,
    }))
}

/// Build journey routes
pub fn journey_routes() -> Router<AppState> {
    Router::new()
        .route("/api/journeys", get(list_journeys))
        .route("/api/journeys/by-phone/:phone", get(journey_by_phone))
        .route("/api/pipeline/counts", get(pipeline_counts))
}
