//! Job queue backlog probe
//!
//! Queues are Redis lists. A queue is healthy while its backlog stays at or
//! under the configured limit; the deep check also inspects the matching
//! `{queue}:failed` dead-letter list.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::instrument;

use super::{DEEP_CALL_TIMEOUT, HealthProbe, ProbeError, ProbeResult, elapsed_ms, with_deadline};

pub const QUEUE_PROBE: &str = "queue";

#[async_trait]
pub trait QueueInspector: Send + Sync {
    /// Number of jobs waiting in `queue`
    async fn depth(&self, queue: &str) -> anyhow::Result<u64>;
}

#[cfg(feature = "storage-redis")]
#[async_trait]
impl QueueInspector for redis::aio::ConnectionManager {
    async fn depth(&self, queue: &str) -> anyhow::Result<u64> {
        let mut conn = self.clone();
        let depth: u64 = redis::cmd("LLEN").arg(queue).query_async(&mut conn).await?;
        Ok(depth)
    }
}

pub struct QueueProbe {
    inspector: Arc<dyn QueueInspector>,
    queues: Vec<String>,
    max_depth: u64,
    deep: bool,
}

impl QueueProbe {
    pub fn new(
        inspector: Arc<dyn QueueInspector>,
        queues: Vec<String>,
        max_depth: u64,
        deep: bool,
    ) -> Self {
        Self {
            inspector,
            queues,
            max_depth,
            deep,
        }
    }

    async fn inspect(&self) -> Result<ProbeResult, ProbeError> {
        let start = Instant::now();
        let mut depths = Map::new();
        let mut problems = Vec::new();

        for queue in &self.queues {
            let depth = match self.inspector.depth(queue).await {
                Ok(depth) => depth,
                Err(e) => {
                    return Ok(ProbeResult::unhealthy(
                        QUEUE_PROBE,
                        self.deep,
                        elapsed_ms(start),
                        format!("failed to inspect {queue}: {e}"),
                    ));
                }
            };
            if depth > self.max_depth {
                problems.push(format!(
                    "{queue} backlog {depth} exceeds {}",
                    self.max_depth
                ));
            }

            let mut entry = json!({ "depth": depth });
            if self.deep {
                let failed_queue = format!("{queue}:failed");
                match self.inspector.depth(&failed_queue).await {
                    Ok(failed) => {
                        entry["failed"] = json!(failed);
                        if failed > 0 {
                            problems.push(format!("{failed_queue} holds {failed} jobs"));
                        }
                    }
                    Err(e) => problems.push(format!("failed to inspect {failed_queue}: {e}")),
                }
            }
            depths.insert(queue.clone(), entry);
        }

        let latency = elapsed_ms(start);
        let result = if problems.is_empty() {
            ProbeResult::healthy(QUEUE_PROBE, self.deep, latency)
        } else {
            ProbeResult::unhealthy(QUEUE_PROBE, self.deep, latency, problems.join("; "))
        };
        Ok(result.with_details(Value::Object(depths)))
    }
}

#[async_trait]
impl HealthProbe for QueueProbe {
    fn name(&self) -> &str {
        QUEUE_PROBE
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    #[instrument(skip(self), fields(deep = self.deep))]
    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        if self.queues.is_empty() {
            return Ok(ProbeResult::unhealthy(
                QUEUE_PROBE,
                self.deep,
                0.0,
                "no queues configured",
            ));
        }

        if self.deep {
            with_deadline(QUEUE_PROBE, true, DEEP_CALL_TIMEOUT, self.inspect()).await
        } else {
            self.inspect().await
        }
    }
}
