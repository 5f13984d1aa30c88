//! Error types for storage operations

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend connection failed
    #[error("failed to connect to storage backend: {0}")]
    ConnectionFailed(String),

    /// Backend query or command failed
    #[error("storage query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("database migration failed: {0}")]
    MigrationFailed(String),

    /// Invalid configuration
    #[error("invalid storage configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot or point serialization/deserialization error
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Backend-specific error
    #[error("storage backend error: {0}")]
    BackendError(String),

    /// Both the preferred backend and the fallback failed
    #[error("storage unavailable: durable backend failed ({durable}), fallback failed ({fallback})")]
    Unavailable { durable: String, fallback: String },
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::QueryFailed("no rows found".to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StorageError::ConnectionFailed(err.to_string())
            }
            _ => StorageError::QueryFailed(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::MigrationFailed(err.to_string())
    }
}

#[cfg(feature = "storage-redis")]
impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            StorageError::ConnectionFailed(err.to_string())
        } else {
            StorageError::QueryFailed(err.to_string())
        }
    }
}
