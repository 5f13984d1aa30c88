//! Health check endpoints

use axum::{Json, extract::State};

use crate::api::state::ApiState;
use crate::health::SystemHealth;

/// GET /pulse/health
///
/// Shallow probes reduced to one status, plus process stats
pub async fn system_health(State(state): State<ApiState>) -> Json<SystemHealth> {
    Json(state.service.aggregator().get_system_health().await)
}

/// GET /pulse/health/deep
pub async fn deep_health(State(state): State<ApiState>) -> Json<SystemHealth> {
    Json(state.service.aggregator().get_deep_health().await)
}
