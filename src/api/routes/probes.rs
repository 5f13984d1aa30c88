//! Probe endpoints

use axum::{
    Json,
    extract::{Path, Query, State},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
    types::ProbeQuery,
};
use crate::probes::ProbeResult;

/// GET /pulse/probes
pub async fn list_probes(State(state): State<ApiState>) -> Json<Vec<ProbeResult>> {
    Json(state.service.get_all_probes(false).await)
}

/// GET /pulse/probes/deep
pub async fn list_deep_probes(State(state): State<ApiState>) -> Json<Vec<ProbeResult>> {
    Json(state.service.get_all_probes(true).await)
}

/// GET /pulse/probes/:name?deep=bool
pub async fn get_probe(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(query): Query<ProbeQuery>,
) -> ApiResult<Json<ProbeResult>> {
    state
        .service
        .get_probe(&name, query.deep)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("probe '{name}' not found")))
}
