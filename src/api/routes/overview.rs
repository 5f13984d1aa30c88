//! Overview and module endpoints

use std::collections::BTreeMap;

use axum::{Json, extract::State};

use crate::ModuleHealth;
use crate::api::state::ApiState;
use crate::service::PulseOverview;

/// GET /pulse
pub async fn get_overview(State(state): State<ApiState>) -> Json<PulseOverview> {
    Json(state.service.get_pulse_overview().await)
}

/// GET /pulse/modules
pub async fn get_modules(State(state): State<ApiState>) -> Json<BTreeMap<String, ModuleHealth>> {
    Json(state.service.get_module_health().await)
}
