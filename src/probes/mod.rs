//! Health probes for external dependencies
//!
//! Every dependency gets two [`HealthProbe`] instances: a cheap shallow check
//! run on every scheduler cycle, and a deep check that exercises the
//! dependency end to end and only runs on demand.
//!
//! Probes talk to their collaborators through narrow read-only client traits
//! ([`DatabaseClient`], [`CacheClient`], [`QueueInspector`]) so tests can
//! substitute fakes.
//!
//! ## Failure model
//!
//! A probe reports an unreachable or misconfigured dependency as an unhealthy
//! [`ProbeResult`]. Returning a [`ProbeError`] is reserved for failures of the
//! probe itself; the [`ProbeRegistry`] converts those, panics and timeouts into
//! unhealthy results as well, so a fan-out never aborts.

pub mod cache;
pub mod database;
pub mod gateway;
pub mod llm;
pub mod queue;
pub mod registry;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use cache::{CacheClient, CacheProbe};
pub use database::{DatabaseClient, DatabaseProbe};
pub use gateway::GatewayProbe;
pub use llm::{LlmProvider, LlmProviderProbe};
pub use queue::{QueueInspector, QueueProbe};
pub use registry::ProbeRegistry;

/// Timeout applied to every deep network call
pub const DEEP_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of a single probe invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub name: String,
    pub healthy: bool,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub deep: bool,
    pub checked_at: DateTime<Utc>,
}

impl ProbeResult {
    pub fn healthy(name: impl Into<String>, deep: bool, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            healthy: true,
            latency_ms,
            message: None,
            details: None,
            deep,
            checked_at: Utc::now(),
        }
    }

    pub fn unhealthy(
        name: impl Into<String>,
        deep: bool,
        latency_ms: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            healthy: false,
            latency_ms,
            message: Some(message.into()),
            details: None,
            deep,
            checked_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Failure of the probe machinery itself
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe misconfigured: {0}")]
    Misconfigured(String),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &str;

    fn is_deep(&self) -> bool;

    async fn check(&self) -> Result<ProbeResult, ProbeError>;
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Run `fut` under a deadline, mapping expiry to an unhealthy result
pub(crate) async fn with_deadline<F>(
    name: &str,
    deep: bool,
    timeout: Duration,
    fut: F,
) -> Result<ProbeResult, ProbeError>
where
    F: std::future::Future<Output = Result<ProbeResult, ProbeError>>,
{
    let start = Instant::now();
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Ok(ProbeResult::unhealthy(
            name,
            deep,
            elapsed_ms(start),
            format!("timed out after {}ms", timeout.as_millis()),
        )),
    }
}
