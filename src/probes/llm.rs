//! LLM provider probes
//!
//! One probe pair per configured provider, named `llm-<provider>`. The shallow
//! check only verifies that a key is configured. The deep check lists the
//! provider's models, which proves both reachability and key validity.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use super::{DEEP_CALL_TIMEOUT, HealthProbe, ProbeError, ProbeResult, elapsed_ms};

/// Connection settings for one LLM provider
#[derive(Debug, Clone, Deserialize)]
pub struct LlmProvider {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Header carrying the key; `Authorization: Bearer` when unset
    #[serde(default)]
    pub api_key_header: Option<String>,
}

impl LlmProvider {
    fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}

pub struct LlmProviderProbe {
    provider: LlmProvider,
    probe_name: String,
    client: Client,
    deep: bool,
}

impl LlmProviderProbe {
    pub fn new(provider: LlmProvider, client: Client, deep: bool) -> Self {
        Self {
            probe_name: format!("llm-{}", provider.name),
            provider,
            client,
            deep,
        }
    }

    fn not_configured(&self) -> ProbeResult {
        ProbeResult::unhealthy(
            &self.probe_name,
            self.deep,
            0.0,
            format!("{} not configured", self.provider.name),
        )
    }

    async fn list_models(&self, api_key: &str) -> Result<ProbeResult, ProbeError> {
        let url = format!("{}/models", self.provider.base_url.trim_end_matches('/'));
        let start = Instant::now();

        let request = self.client.get(&url).timeout(DEEP_CALL_TIMEOUT);
        let request = match &self.provider.api_key_header {
            Some(header) => request.header(header.as_str(), api_key),
            None => request.bearer_auth(api_key),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(ProbeResult::unhealthy(
                    &self.probe_name,
                    true,
                    elapsed_ms(start),
                    format!("timed out after {}ms", DEEP_CALL_TIMEOUT.as_millis()),
                ));
            }
            Err(e) => {
                return Ok(ProbeResult::unhealthy(
                    &self.probe_name,
                    true,
                    elapsed_ms(start),
                    format!("request failed: {e}"),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(ProbeResult::unhealthy(
                &self.probe_name,
                true,
                elapsed_ms(start),
                format!("{} returned HTTP {}", self.provider.name, status.as_u16()),
            )
            .with_details(json!({ "status": status.as_u16(), "url": url })));
        }

        let latency = elapsed_ms(start);
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let models = body
            .get("data")
            .and_then(Value::as_array)
            .map(|models| models.len());
        debug!("{} listed {:?} models", self.provider.name, models);

        Ok(ProbeResult::healthy(&self.probe_name, true, latency)
            .with_details(json!({ "status": status.as_u16(), "models": models })))
    }
}

#[async_trait]
impl HealthProbe for LlmProviderProbe {
    fn name(&self) -> &str {
        &self.probe_name
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    #[instrument(skip(self), fields(provider = %self.provider.name, deep = self.deep))]
    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        let Some(api_key) = self.provider.api_key() else {
            return Ok(self.not_configured());
        };

        if !self.deep {
            return Ok(ProbeResult::healthy(&self.probe_name, false, 0.0)
                .with_message("api key configured"));
        }

        self.list_models(api_key).await
    }
}
