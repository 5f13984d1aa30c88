//! Relational database probe

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tracing::{instrument, trace};

use super::{DEEP_CALL_TIMEOUT, HealthProbe, ProbeError, ProbeResult, elapsed_ms, with_deadline};

pub const DATABASE_PROBE: &str = "database";

/// Connection pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
}

/// Read-only view of the database the probe needs
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Cheapest possible round trip
    async fn ping(&self) -> anyhow::Result<()>;

    /// Number of user tables, used by the deep check to touch the catalog
    async fn table_count(&self) -> anyhow::Result<i64>;

    fn pool_stats(&self) -> PoolStats;
}

#[cfg(feature = "storage-sqlite")]
#[async_trait]
impl DatabaseClient for sqlx::SqlitePool {
    async fn ping(&self) -> anyhow::Result<()> {
        sqlx::query("SELECT 1").execute(self).await?;
        Ok(())
    }

    async fn table_count(&self) -> anyhow::Result<i64> {
        use sqlx::Row;

        let row = sqlx::query("SELECT COUNT(*) AS tables FROM sqlite_master WHERE type = 'table'")
            .fetch_one(self)
            .await?;
        Ok(row.get::<i64, _>("tables"))
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.size(),
            idle: self.num_idle() as u32,
        }
    }
}

pub struct DatabaseProbe {
    client: Arc<dyn DatabaseClient>,
    deep: bool,
}

impl DatabaseProbe {
    pub fn shallow(client: Arc<dyn DatabaseClient>) -> Self {
        Self {
            client,
            deep: false,
        }
    }

    pub fn deep(client: Arc<dyn DatabaseClient>) -> Self {
        Self { client, deep: true }
    }

    async fn deep_check(&self) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();
        if let Err(e) = self.client.ping().await {
            return Ok(ProbeResult::unhealthy(
                DATABASE_PROBE,
                true,
                elapsed_ms(start),
                format!("ping failed: {e}"),
            ));
        }

        let tables = match self.client.table_count().await {
            Ok(tables) => tables,
            Err(e) => {
                return Ok(ProbeResult::unhealthy(
                    DATABASE_PROBE,
                    true,
                    elapsed_ms(start),
                    format!("catalog query failed: {e}"),
                ));
            }
        };

        Ok(ProbeResult::healthy(DATABASE_PROBE, true, elapsed_ms(start)).with_details(json!({
            "tables": tables,
            "pool": self.client.pool_stats(),
        })))
    }
}

#[async_trait]
impl HealthProbe for DatabaseProbe {
    fn name(&self) -> &str {
        DATABASE_PROBE
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    #[instrument(skip(self), fields(deep = self.deep))]
    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        if self.deep {
            return with_deadline(DATABASE_PROBE, true, DEEP_CALL_TIMEOUT, self.deep_check()).await;
        }

        let start = Instant::now();
        let result = match self.client.ping().await {
            Ok(()) => ProbeResult::healthy(DATABASE_PROBE, false, elapsed_ms(start)),
            Err(e) => ProbeResult::unhealthy(
                DATABASE_PROBE,
                false,
                elapsed_ms(start),
                format!("ping failed: {e}"),
            ),
        };
        trace!("database ping took {:.2}ms", result.latency_ms);
        Ok(result)
    }
}
