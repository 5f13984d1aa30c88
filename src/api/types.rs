//! Request and response bodies of the pulse API

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::alerts::{AlertConfig, AlertEvent, ChannelResult};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeQuery {
    #[serde(default)]
    pub deep: bool,
}

/// GET /pulse/alerts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsResponse {
    pub alerts: Vec<AlertConfig>,
    pub recent_events: Vec<AlertEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerRequest {
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub event_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResponse {
    /// Whether a new event was appended
    pub changed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<AlertEvent>,
    pub deliveries: Vec<ChannelResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}
