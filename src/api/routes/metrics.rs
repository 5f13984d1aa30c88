//! Metric endpoints

use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};

use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};
use crate::metrics::MetricsSnapshotMap;
use crate::service::{HistoricalMetric, HistoryQuery};

/// GET /pulse/metrics
///
/// Raw collector contents, one entry per label set
pub async fn get_metrics(State(state): State<ApiState>) -> Json<MetricsSnapshotMap> {
    Json(state.service.get_metrics_snapshot())
}

/// GET /pulse/metrics/history?metric=&period=&from=&to=
pub async fn get_history(
    State(state): State<ApiState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<HistoricalMetric>>> {
    let Query(query) = query.map_err(|e| ApiError::InvalidRequest(e.body_text()))?;
    Ok(Json(state.service.get_historical_metrics(&query).await?))
}
