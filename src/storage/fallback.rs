//! Durable-first storage with in-memory fallback
//!
//! [`TimeSeriesStorage`] wraps an optional durable backend and an in-memory
//! mirror:
//!
//! - **Writes** go to the durable backend while it is preferred, and are
//!   always mirrored to memory. The first durable error degrades the facade.
//! - **Reads** consult only the preferred backend. A durable read error
//!   degrades the facade and retries once against memory in the same call.
//! - **Errors** surface only when memory fails as well.
//!
//! Degradation is sticky for the lifetime of the process unless
//! [`TimeSeriesStorage::restore_durable`] is called.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::backend::TimeSeriesBackend;
use super::error::{StorageError, StorageResult};
use super::memory::MemoryBackend;
use super::schema::{ErrorSummary, MetricsSnapshot, SnapshotPeriod, TimeSeriesPoint};

/// Which backend currently serves reads and receives primary writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendState {
    Preferred,
    Degraded,
}

/// Observed outcome of a durable backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    DurableSucceeded,
    DurableFailed,
    Restored,
}

impl BackendState {
    /// Pure state transition. Only a failure or an explicit restore moves it.
    pub fn next(self, event: BackendEvent) -> Self {
        match (self, event) {
            (_, BackendEvent::DurableFailed) => BackendState::Degraded,
            (_, BackendEvent::Restored) => BackendState::Preferred,
            (state, BackendEvent::DurableSucceeded) => state,
        }
    }

    fn from_flag(preferred: bool) -> Self {
        if preferred {
            BackendState::Preferred
        } else {
            BackendState::Degraded
        }
    }
}

/// Facade status as reported in the overview
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    pub durable_configured: bool,
    pub durable_backend: Option<String>,
    pub state: BackendState,
}

pub struct TimeSeriesStorage {
    durable: Option<Arc<dyn TimeSeriesBackend>>,
    fallback: Arc<dyn TimeSeriesBackend>,
    durable_preferred: AtomicBool,
}

impl TimeSeriesStorage {
    pub fn new(durable: Option<Arc<dyn TimeSeriesBackend>>) -> Self {
        Self::with_fallback(durable, Arc::new(MemoryBackend::new()))
    }

    pub fn with_fallback(
        durable: Option<Arc<dyn TimeSeriesBackend>>,
        fallback: Arc<dyn TimeSeriesBackend>,
    ) -> Self {
        let durable_preferred = AtomicBool::new(durable.is_some());
        Self {
            durable,
            fallback,
            durable_preferred,
        }
    }

    /// Storage with the in-memory backend only
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub fn state(&self) -> BackendState {
        BackendState::from_flag(self.durable_preferred.load(Ordering::Acquire))
    }

    pub fn status(&self) -> StorageStatus {
        StorageStatus {
            durable_configured: self.durable.is_some(),
            durable_backend: self.durable.as_ref().map(|d| d.name().to_string()),
            state: self.state(),
        }
    }

    fn apply(&self, event: BackendEvent) {
        let before = self.state();
        let after = before.next(event);
        if before == after {
            return;
        }

        self.durable_preferred
            .store(after == BackendState::Preferred, Ordering::Release);
        match after {
            BackendState::Degraded => warn!("durable storage degraded, serving from memory"),
            BackendState::Preferred => info!("durable storage restored"),
        }
    }

    /// Re-enable the durable backend after an operator confirmed it is back
    pub fn restore_durable(&self) {
        if self.durable.is_some() {
            self.apply(BackendEvent::Restored);
        }
    }

    /// Durable backend if it is currently preferred
    fn preferred(&self) -> Option<&Arc<dyn TimeSeriesBackend>> {
        match self.state() {
            BackendState::Preferred => self.durable.as_ref(),
            BackendState::Degraded => None,
        }
    }

    /// Run a write against the preferred durable backend, then mirror it to
    /// memory. Fails only when nothing accepted the write.
    async fn write<'a, F, Fut>(&'a self, what: &str, op: F) -> StorageResult<()>
    where
        F: Fn(&'a Arc<dyn TimeSeriesBackend>) -> Fut,
        Fut: std::future::Future<Output = StorageResult<()>>,
    {
        let mut durable_err = None;
        let mut durable_ok = false;

        if let Some(durable) = self.preferred() {
            match op(durable).await {
                Ok(()) => {
                    durable_ok = true;
                    self.apply(BackendEvent::DurableSucceeded);
                }
                Err(e) => {
                    warn!("durable {what} failed: {e}");
                    self.apply(BackendEvent::DurableFailed);
                    durable_err = Some(e);
                }
            }
        }

        match op(&self.fallback).await {
            Ok(()) => Ok(()),
            Err(e) if durable_ok => {
                warn!("memory mirror of {what} failed: {e}");
                Ok(())
            }
            Err(e) => {
                error!("{what} failed on every backend: {e}");
                Err(match durable_err {
                    Some(durable) => StorageError::Unavailable {
                        durable: durable.to_string(),
                        fallback: e.to_string(),
                    },
                    None => e,
                })
            }
        }
    }

    /// Run a read against the preferred backend, retrying once against
    /// memory when the durable backend fails.
    async fn read<'a, T, F, Fut>(&'a self, what: &str, op: F) -> StorageResult<T>
    where
        F: Fn(&'a Arc<dyn TimeSeriesBackend>) -> Fut,
        Fut: std::future::Future<Output = StorageResult<T>>,
    {
        let Some(durable) = self.preferred() else {
            return op(&self.fallback).await;
        };

        match op(durable).await {
            Ok(value) => Ok(value),
            Err(durable_err) => {
                warn!("durable {what} failed, retrying from memory: {durable_err}");
                self.apply(BackendEvent::DurableFailed);
                op(&self.fallback)
                    .await
                    .map_err(|e| StorageError::Unavailable {
                        durable: durable_err.to_string(),
                        fallback: e.to_string(),
                    })
            }
        }
    }

    pub async fn store_snapshot(&self, snapshot: &MetricsSnapshot) -> StorageResult<()> {
        self.write("snapshot write", |b| b.store_snapshot(snapshot))
            .await
    }

    pub async fn get_snapshots(
        &self,
        period: SnapshotPeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricsSnapshot>> {
        self.read("snapshot read", |b| b.get_snapshots(period, from, to))
            .await
    }

    /// Most recent snapshot of a period class within its retention horizon
    pub async fn latest_snapshot(
        &self,
        period: SnapshotPeriod,
    ) -> StorageResult<Option<MetricsSnapshot>> {
        let now = Utc::now();
        let from = now
            - chrono::Duration::from_std(period.retention())
                .unwrap_or_else(|_| chrono::Duration::days(30));
        let snapshots = self.get_snapshots(period, from, now).await?;
        Ok(snapshots.into_iter().max_by_key(|s| s.timestamp))
    }

    /// Store one sample; `timestamp` defaults to now
    pub async fn store_point(
        &self,
        metric: &str,
        value: f64,
        timestamp: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let point = TimeSeriesPoint {
            timestamp: timestamp.unwrap_or_else(Utc::now),
            value,
        };
        self.write("point write", |b| b.store_point(metric, point))
            .await
    }

    pub async fn get_points(
        &self,
        metric: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<TimeSeriesPoint>> {
        self.read("point read", |b| b.get_points(metric, from, to))
            .await
    }

    pub async fn record_error(
        &self,
        module: &str,
        error_type: &str,
        message: &str,
    ) -> StorageResult<()> {
        let at = Utc::now();
        self.write("error write", |b| {
            b.record_error(module, error_type, message, at)
        })
        .await
    }

    pub async fn get_errors(&self, module: &str) -> StorageResult<Vec<ErrorSummary>> {
        self.read("error read", |b| b.get_errors(module)).await
    }
}
