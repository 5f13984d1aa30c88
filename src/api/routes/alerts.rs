//! Alert configuration and lifecycle endpoints

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use crate::alerts::{AlertConfig, AlertConfigInput, AlertEvent};
use crate::api::{
    error::{ApiError, ApiResult},
    middleware::auth::CallerIdentity,
    state::ApiState,
    types::{AlertsResponse, EventsQuery, ResolveRequest, TransitionResponse, TriggerRequest},
};

const DEFAULT_EVENTS_LIMIT: usize = 50;

/// Unparseable ids cannot name an existing alert
fn parse_alert_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("alert {raw} not found")))
}

/// Optional JSON body; an empty body means all defaults
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}

/// GET /pulse/alerts
///
/// Every configuration plus the most recent events across all alerts
pub async fn list_alerts(State(state): State<ApiState>) -> ApiResult<Json<AlertsResponse>> {
    let engine = state.engine();
    Ok(Json(AlertsResponse {
        alerts: engine.list_alerts().await?,
        recent_events: engine.recent_events().await?,
    }))
}

/// POST /pulse/alerts
pub async fn create_alert(
    State(state): State<ApiState>,
    body: Result<Json<AlertConfigInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<AlertConfig>)> {
    let Json(input) = body?;
    let config = state.engine().create_alert(input).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

/// GET /pulse/alerts/:id
pub async fn get_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AlertConfig>> {
    let id = parse_alert_id(&id)?;
    Ok(Json(state.engine().get_alert(id).await?))
}

/// PUT /pulse/alerts/:id
pub async fn update_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Result<Json<AlertConfigInput>, JsonRejection>,
) -> ApiResult<Json<AlertConfig>> {
    let id = parse_alert_id(&id)?;
    let Json(input) = body?;
    Ok(Json(state.engine().update_alert(id, input).await?))
}

/// DELETE /pulse/alerts/:id
pub async fn delete_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_alert_id(&id)?;
    state.engine().delete_alert(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /pulse/alerts/:id/trigger
///
/// Fires the alert regardless of its condition and cooldown
pub async fn trigger_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    caller: Option<Extension<CallerIdentity>>,
    body: Bytes,
) -> ApiResult<Json<TransitionResponse>> {
    let id = parse_alert_id(&id)?;
    let request: TriggerRequest = optional_body(&body)?;

    let mut details = request.details.unwrap_or_else(|| json!({}));
    if let Some(object) = details.as_object_mut() {
        object.insert("manual".to_string(), json!(true));
        if let Some(Extension(caller)) = caller {
            object.insert("triggeredBy".to_string(), json!(caller.subject()));
        }
    }

    let triggered = state.engine().trigger_manual_alert(id, Some(details)).await?;
    Ok(Json(TransitionResponse {
        changed: true,
        event: Some(triggered.event),
        deliveries: triggered.deliveries,
    }))
}

/// POST /pulse/alerts/:id/resolve
///
/// Body `{"eventId": ...}` is optional. Resolving an alert without an
/// open trigger succeeds with `changed: false`.
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<TransitionResponse>> {
    let id = parse_alert_id(&id)?;
    let request: ResolveRequest = optional_body(&body)?;

    let response = match state.engine().resolve_alert(id, request.event_id).await? {
        Some(resolved) => TransitionResponse {
            changed: true,
            event: Some(resolved.event),
            deliveries: resolved.deliveries,
        },
        None => TransitionResponse {
            changed: false,
            event: None,
            deliveries: Vec::new(),
        },
    };
    Ok(Json(response))
}

/// GET /pulse/alerts/:id/events?limit=
pub async fn alert_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<Vec<AlertEvent>>> {
    let id = parse_alert_id(&id)?;
    let limit = query.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    Ok(Json(state.engine().alert_events(id, limit).await?))
}
