//! Time-series persistence for snapshots, points and error summaries
//!
//! ## Design
//!
//! - **Trait-based**: [`TimeSeriesBackend`] allows swapping implementations
//! - **Async**: all operations are async so they can sit on the scheduler path
//! - **Degrading**: [`TimeSeriesStorage`] prefers the durable backend and falls
//!   back to memory on the first durable error
//!
//! ## Backends
//!
//! - **Redis** (`storage-redis` feature): durable, server-side retention
//! - **In-Memory**: bounded ring buffers, always present as the mirror
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pulse::storage::{RedisBackend, TimeSeriesStorage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let redis = RedisBackend::new("redis://127.0.0.1/").await?;
//!     let storage = TimeSeriesStorage::new(Some(Arc::new(redis)));
//!     storage.store_point("probe.cache.latency_ms", 1.2, None).await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod fallback;
pub mod memory;
#[cfg(feature = "storage-redis")]
pub mod redis;
pub mod schema;

pub use backend::TimeSeriesBackend;
pub use error::{StorageError, StorageResult};
pub use fallback::{BackendEvent, BackendState, StorageStatus, TimeSeriesStorage};
pub use memory::MemoryBackend;
#[cfg(feature = "storage-redis")]
pub use self::redis::RedisBackend;
pub use schema::{ErrorSummary, MetricsSnapshot, SnapshotPeriod, TimeSeriesPoint};
