//! In-memory storage backend (no persistence)
//!
//! Ring buffers behind a `RwLock`. Used as the fallback mirror of the durable
//! backend and on its own in tests.
//!
//! ## Limitations
//!
//! - **No persistence**: all data is lost on restart
//! - **Limited capacity**: at most [`MAX_SNAPSHOTS`] snapshots and
//!   [`MAX_POINTS_PER_METRIC`] points per metric, oldest evicted first

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::trace;

use super::backend::{ERROR_SUMMARY_TTL_SECS, MAX_POINTS_PER_METRIC, TimeSeriesBackend};
use super::error::StorageResult;
use super::schema::{ErrorSummary, MetricsSnapshot, SnapshotPeriod, TimeSeriesPoint};

/// Maximum snapshots kept in memory across all period classes
pub const MAX_SNAPSHOTS: usize = 1000;

#[derive(Debug, Default)]
struct Inner {
    snapshots: VecDeque<MetricsSnapshot>,
    points: HashMap<String, VecDeque<TimeSeriesPoint>>,
    /// module -> error type -> summary
    errors: HashMap<String, HashMap<String, ErrorSummary>>,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshots.len()
    }
}

fn is_live(summary: &ErrorSummary, now: DateTime<Utc>) -> bool {
    now - summary.last_occurred < Duration::seconds(ERROR_SUMMARY_TTL_SECS)
}

#[async_trait]
impl TimeSeriesBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store_snapshot(&self, snapshot: &MetricsSnapshot) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.snapshots.push_back(snapshot.clone());
        while inner.snapshots.len() > MAX_SNAPSHOTS {
            inner.snapshots.pop_front();
        }
        trace!("memory backend holds {} snapshots", inner.snapshots.len());
        Ok(())
    }

    async fn get_snapshots(
        &self,
        period: SnapshotPeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricsSnapshot>> {
        let inner = self.inner.read().await;
        let mut snapshots: Vec<MetricsSnapshot> = inner
            .snapshots
            .iter()
            .filter(|s| s.period == period && s.timestamp >= from && s.timestamp <= to)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.timestamp);
        Ok(snapshots)
    }

    async fn store_point(&self, metric: &str, point: TimeSeriesPoint) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let window = inner.points.entry(metric.to_string()).or_default();
        window.push_back(point);
        while window.len() > MAX_POINTS_PER_METRIC {
            window.pop_front();
        }
        Ok(())
    }

    async fn get_points(
        &self,
        metric: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<TimeSeriesPoint>> {
        let inner = self.inner.read().await;
        let mut points: Vec<TimeSeriesPoint> = inner
            .points
            .get(metric)
            .map(|window| {
                window
                    .iter()
                    .filter(|p| p.timestamp >= from && p.timestamp <= to)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }

    async fn record_error(
        &self,
        module: &str,
        error_type: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        let by_type = inner.errors.entry(module.to_string()).or_default();

        match by_type.get_mut(error_type) {
            Some(summary) if is_live(summary, at) => {
                summary.count += 1;
                summary.last_occurred = at;
                summary.last_message = message.to_string();
            }
            _ => {
                by_type.insert(
                    error_type.to_string(),
                    ErrorSummary {
                        error_type: error_type.to_string(),
                        count: 1,
                        last_occurred: at,
                        last_message: message.to_string(),
                    },
                );
            }
        }
        Ok(())
    }

    async fn get_errors(&self, module: &str) -> StorageResult<Vec<ErrorSummary>> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;

        let Some(by_type) = inner.errors.get_mut(module) else {
            return Ok(Vec::new());
        };
        by_type.retain(|_, summary| is_live(summary, now));

        let mut summaries: Vec<ErrorSummary> = by_type.values().cloned().collect();
        summaries.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.error_type.cmp(&b.error_type))
        });
        Ok(summaries)
    }
}
