//! Messaging gateway probe

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::instrument;

use super::{DEEP_CALL_TIMEOUT, HealthProbe, ProbeError, ProbeResult, elapsed_ms};

pub const GATEWAY_PROBE: &str = "whatsapp";

/// Probe for the WhatsApp gateway.
///
/// The shallow check verifies the gateway is configured; the deep check calls
/// its `/health` endpoint.
pub struct GatewayProbe {
    base_url: Option<String>,
    token: Option<String>,
    client: Client,
    deep: bool,
}

impl GatewayProbe {
    pub fn new(base_url: Option<String>, token: Option<String>, client: Client, deep: bool) -> Self {
        Self {
            base_url,
            token,
            client,
            deep,
        }
    }
}

#[async_trait]
impl HealthProbe for GatewayProbe {
    fn name(&self) -> &str {
        GATEWAY_PROBE
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    #[instrument(skip(self), fields(deep = self.deep))]
    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        let Some(base_url) = self.base_url.as_deref().filter(|url| !url.is_empty()) else {
            return Ok(ProbeResult::unhealthy(
                GATEWAY_PROBE,
                self.deep,
                0.0,
                "whatsapp gateway not configured",
            ));
        };

        if !self.deep {
            return Ok(ProbeResult::healthy(GATEWAY_PROBE, false, 0.0));
        }

        let url = format!("{}/health", base_url.trim_end_matches('/'));
        let mut request = self.client.get(&url).timeout(DEEP_CALL_TIMEOUT);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("timed out after {}ms", DEEP_CALL_TIMEOUT.as_millis())
                } else {
                    format!("request failed: {e}")
                };
                return Ok(ProbeResult::unhealthy(
                    GATEWAY_PROBE,
                    true,
                    elapsed_ms(start),
                    message,
                ));
            }
        };

        let latency = elapsed_ms(start);
        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let details = json!({ "status": status.as_u16(), "body": body });

        if status.is_success() {
            Ok(ProbeResult::healthy(GATEWAY_PROBE, true, latency).with_details(details))
        } else {
            Ok(ProbeResult::unhealthy(
                GATEWAY_PROBE,
                true,
                latency,
                format!("gateway returned HTTP {}", status.as_u16()),
            )
            .with_details(details))
        }
    }
}
