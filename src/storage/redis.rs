//! Redis time-series backend
//!
//! ## Key layout
//!
//! - `pulse:snapshots:{period}`: sorted set of JSON snapshots scored by
//!   timestamp in milliseconds, trimmed to the period's retention on write
//! - `pulse:points:{metric}`: sorted set of `{ts_ms}:{value}` members, capped
//!   by rank at [`MAX_POINTS_PER_METRIC`]
//! - `pulse:errors:{module}:{type}`: hash with `count`, `last_occurred` and
//!   `last_message`, expiring 24h after the last occurrence
//! - `pulse:errors:{module}`: set of error types seen for the module
//!
//! Every write is sent as one atomic pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tracing::{debug, instrument};

use super::backend::{ERROR_SUMMARY_TTL_SECS, MAX_POINTS_PER_METRIC, TimeSeriesBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{ErrorSummary, MetricsSnapshot, SnapshotPeriod, TimeSeriesPoint};

const KEY_PREFIX: &str = "pulse";

fn snapshots_key(period: SnapshotPeriod) -> String {
    format!("{KEY_PREFIX}:snapshots:{period}")
}

fn points_key(metric: &str) -> String {
    format!("{KEY_PREFIX}:points:{metric}")
}

fn error_types_key(module: &str) -> String {
    format!("{KEY_PREFIX}:errors:{module}")
}

fn error_key(module: &str, error_type: &str) -> String {
    format!("{KEY_PREFIX}:errors:{module}:{error_type}")
}

fn point_member(point: &TimeSeriesPoint) -> String {
    format!("{}:{}", point.timestamp.timestamp_millis(), point.value)
}

fn parse_point_member(member: &str) -> Option<TimeSeriesPoint> {
    let (ts, value) = member.split_once(':')?;
    let timestamp = Utc.timestamp_millis_opt(ts.parse().ok()?).single()?;
    Some(TimeSeriesPoint {
        timestamp,
        value: value.parse().ok()?,
    })
}

#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
}

impl RedisBackend {
    pub async fn new(redis_url: &str) -> StorageResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| StorageError::InvalidConfig(format!("{redis_url}: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("connected to redis at {redis_url}");
        Ok(Self { manager })
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Connection shared with the cache and queue probes
    pub fn manager(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub async fn ping(&self) -> StorageResult<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl TimeSeriesBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    #[instrument(skip(self, snapshot), fields(period = %snapshot.period))]
    async fn store_snapshot(&self, snapshot: &MetricsSnapshot) -> StorageResult<()> {
        let key = snapshots_key(snapshot.period);
        let score = snapshot.timestamp.timestamp_millis();
        let retention = snapshot.period.retention();
        let cutoff = score - retention.as_millis() as i64;
        let payload = serde_json::to_string(snapshot)?;

        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(score)
            .arg(payload)
            .ignore()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(format!("({cutoff}"))
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(retention.as_secs())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_snapshots(
        &self,
        period: SnapshotPeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricsSnapshot>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn
            .zrangebyscore(
                snapshots_key(period),
                from.timestamp_millis(),
                to.timestamp_millis(),
            )
            .await?;

        members
            .iter()
            .map(|json| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }

    async fn store_point(&self, metric: &str, point: TimeSeriesPoint) -> StorageResult<()> {
        let key = points_key(metric);
        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(point.timestamp.timestamp_millis())
            .arg(point_member(&point))
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(-(MAX_POINTS_PER_METRIC as i64) - 1)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_points(
        &self,
        metric: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<TimeSeriesPoint>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn
            .zrangebyscore(points_key(metric), from.timestamp_millis(), to.timestamp_millis())
            .await?;

        Ok(members
            .iter()
            .filter_map(|m| parse_point_member(m))
            .collect())
    }

    async fn record_error(
        &self,
        module: &str,
        error_type: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let key = error_key(module, error_type);
        let types_key = error_types_key(module);

        let mut conn = self.manager.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("HINCRBY")
            .arg(&key)
            .arg("count")
            .arg(1)
            .ignore()
            .cmd("HSET")
            .arg(&key)
            .arg("last_occurred")
            .arg(at.to_rfc3339())
            .arg("last_message")
            .arg(message)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(ERROR_SUMMARY_TTL_SECS)
            .ignore()
            .cmd("SADD")
            .arg(&types_key)
            .arg(error_type)
            .ignore()
            .cmd("EXPIRE")
            .arg(&types_key)
            .arg(ERROR_SUMMARY_TTL_SECS)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_errors(&self, module: &str) -> StorageResult<Vec<ErrorSummary>> {
        let mut conn = self.manager.clone();
        let types: Vec<String> = conn.smembers(error_types_key(module)).await?;

        let mut summaries = Vec::with_capacity(types.len());
        for error_type in types {
            let fields: HashMap<String, String> =
                conn.hgetall(error_key(module, &error_type)).await?;

            // hash expired before the type set did
            let Some(summary) = summary_from_fields(&error_type, &fields) else {
                let _: () = conn.srem(error_types_key(module), &error_type).await?;
                continue;
            };
            summaries.push(summary);
        }

        summaries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.error_type.cmp(&b.error_type))
        });
        Ok(summaries)
    }
}

fn summary_from_fields(error_type: &str, fields: &HashMap<String, String>) -> Option<ErrorSummary> {
    let count = fields.get("count")?.parse().ok()?;
    let last_occurred = DateTime::parse_from_rfc3339(fields.get("last_occurred")?)
        .ok()?
        .with_timezone(&Utc);

    Some(ErrorSummary {
        error_type: error_type.to_string(),
        count,
        last_occurred,
        last_message: fields.get("last_message").cloned().unwrap_or_default(),
    })
}
