//! REST API and SSE stream for the pulse dashboard
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **PulseService** behind shared state for every query
//! - **SSE** for overview updates and alert transitions
//!
//! ## Endpoints
//!
//! - `GET /pulse` - Overview
//! - `GET /pulse/health`, `GET /pulse/health/deep` - System health
//! - `GET /pulse/probes`, `GET /pulse/probes/deep`, `GET /pulse/probes/:name` - Probe results
//! - `GET /pulse/modules` - Module health
//! - `GET /pulse/metrics`, `GET /pulse/metrics/history` - Collector contents and history
//! - `GET|POST /pulse/alerts`, `GET|PUT|DELETE /pulse/alerts/:id` - Alert configuration
//! - `POST /pulse/alerts/:id/trigger`, `POST /pulse/alerts/:id/resolve`,
//!   `GET /pulse/alerts/:id/events` - Alert lifecycle
//! - `GET /pulse/events` - Server-Sent Events

pub mod error;
pub mod middleware;
pub mod routes;
pub mod sse;
pub mod state;
pub mod types;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSettings;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for dashboard
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiSettings::default().into()
    }
}

impl From<ApiSettings> for ApiConfig {
    fn from(settings: ApiSettings) -> Self {
        Self {
            bind_addr: settings.bind_addr,
            auth_token: settings.auth_token,
            enable_cors: settings.enable_cors,
        }
    }
}

/// Every pulse route with its layers applied
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use routes::{alerts, health, metrics, overview, probes};

    let mut app = Router::new()
        .route("/pulse", get(overview::get_overview))
        .route("/pulse/modules", get(overview::get_modules))
        .route("/pulse/health", get(health::system_health))
        .route("/pulse/health/deep", get(health::deep_health))
        .route("/pulse/probes", get(probes::list_probes))
        .route("/pulse/probes/deep", get(probes::list_deep_probes))
        .route("/pulse/probes/:name", get(probes::get_probe))
        .route("/pulse/metrics", get(metrics::get_metrics))
        .route("/pulse/metrics/history", get(metrics::get_history))
        .route(
            "/pulse/alerts",
            get(alerts::list_alerts).post(alerts::create_alert),
        )
        .route(
            "/pulse/alerts/:id",
            get(alerts::get_alert)
                .put(alerts::update_alert)
                .delete(alerts::delete_alert),
        )
        .route("/pulse/alerts/:id/trigger", post(alerts::trigger_alert))
        .route("/pulse/alerts/:id/resolve", post(alerts::resolve_alert))
        .route("/pulse/alerts/:id/events", get(alerts::alert_events))
        .route("/pulse/events", get(sse::events_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    if let Some(token) = &config.auth_token {
        app = app.layer(axum::middleware::from_fn_with_state(
            token.clone(),
            middleware::auth::auth_middleware,
        ));
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
