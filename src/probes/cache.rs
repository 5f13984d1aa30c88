//! Key-value cache probe

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;

use super::{DEEP_CALL_TIMEOUT, HealthProbe, ProbeError, ProbeResult, elapsed_ms, with_deadline};

pub const CACHE_PROBE: &str = "cache";

#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn ping(&self) -> anyhow::Result<()>;

    /// Write `value` under `key` with a short expiry, read it back and delete it
    async fn round_trip(&self, key: &str, value: &str) -> anyhow::Result<Option<String>>;
}

#[cfg(feature = "storage-redis")]
#[async_trait]
impl CacheClient for redis::aio::ConnectionManager {
    async fn ping(&self) -> anyhow::Result<()> {
        let mut conn = self.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn round_trip(&self, key: &str, value: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.clone();
        let (read,): (Option<String>,) = redis::pipe()
            .cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(30)
            .ignore()
            .cmd("GET")
            .arg(key)
            .cmd("DEL")
            .arg(key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(read)
    }
}

pub struct CacheProbe {
    client: Arc<dyn CacheClient>,
    deep: bool,
}

impl CacheProbe {
    pub fn shallow(client: Arc<dyn CacheClient>) -> Self {
        Self {
            client,
            deep: false,
        }
    }

    pub fn deep(client: Arc<dyn CacheClient>) -> Self {
        Self { client, deep: true }
    }

    async fn deep_check(&self) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();
        let key = format!("pulse:probe:{}", Uuid::new_v4());
        let value = Uuid::new_v4().to_string();

        let result = match self.client.round_trip(&key, &value).await {
            Ok(Some(read)) if read == value => {
                ProbeResult::healthy(CACHE_PROBE, true, elapsed_ms(start))
            }
            Ok(Some(_)) => ProbeResult::unhealthy(
                CACHE_PROBE,
                true,
                elapsed_ms(start),
                "read back a different value",
            ),
            Ok(None) => ProbeResult::unhealthy(
                CACHE_PROBE,
                true,
                elapsed_ms(start),
                "written key was not readable",
            ),
            Err(e) => ProbeResult::unhealthy(
                CACHE_PROBE,
                true,
                elapsed_ms(start),
                format!("round trip failed: {e}"),
            ),
        };

        Ok(result.with_details(json!({ "key": key })))
    }
}

#[async_trait]
impl HealthProbe for CacheProbe {
    fn name(&self) -> &str {
        CACHE_PROBE
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    #[instrument(skip(self), fields(deep = self.deep))]
    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        if self.deep {
            return with_deadline(CACHE_PROBE, true, DEEP_CALL_TIMEOUT, self.deep_check()).await;
        }

        let start = Instant::now();
        Ok(match self.client.ping().await {
            Ok(()) => ProbeResult::healthy(CACHE_PROBE, false, elapsed_ms(start)),
            Err(e) => ProbeResult::unhealthy(
                CACHE_PROBE,
                false,
                elapsed_ms(start),
                format!("ping failed: {e}"),
            ),
        })
    }
}
