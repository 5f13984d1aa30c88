//! Storage backend trait definition
//!
//! Both the durable Redis store and the in-memory ring buffers implement
//! [`TimeSeriesBackend`]. The [`TimeSeriesStorage`](super::TimeSeriesStorage)
//! facade layers the degrade-on-failure policy on top.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{ErrorSummary, MetricsSnapshot, SnapshotPeriod, TimeSeriesPoint};

/// Per-metric point window kept by every backend
pub const MAX_POINTS_PER_METRIC: usize = 3600;

/// How long an error summary survives without new occurrences
pub const ERROR_SUMMARY_TTL_SECS: i64 = 24 * 60 * 60;

/// Trait for time-series backends
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared across the
/// scheduler and request handlers.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Implementations convert their native
/// errors into `StorageError` variants.
#[async_trait]
pub trait TimeSeriesBackend: Send + Sync {
    /// Short backend name for logs and status reports
    fn name(&self) -> &'static str;

    async fn store_snapshot(&self, snapshot: &MetricsSnapshot) -> StorageResult<()>;

    /// Snapshots of one period class with `from <= timestamp <= to`, oldest first
    async fn get_snapshots(
        &self,
        period: SnapshotPeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricsSnapshot>>;

    async fn store_point(&self, metric: &str, point: TimeSeriesPoint) -> StorageResult<()>;

    /// Points of one metric with `from <= timestamp <= to`, oldest first
    async fn get_points(
        &self,
        metric: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<TimeSeriesPoint>>;

    /// Bump the counter of `error_type` within `module`
    async fn record_error(
        &self,
        module: &str,
        error_type: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Live error summaries of a module, most frequent first
    async fn get_errors(&self, module: &str) -> StorageResult<Vec<ErrorSummary>>;
}
