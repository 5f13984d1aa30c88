//! SQLite alert repository
//!
//! Durable storage for alert configurations and events.
//!
//! - **WAL mode**: reads from the API do not block event appends
//! - **Migrations**: schema versioned with `sqlx::migrate!`
//! - **Append order**: events carry an autoincrement `seq`, which defines
//!   "most recent" independently of wall-clock timestamps

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::model::{AlertConfig, AlertEvent, AlertStatus};
use super::repository::{AlertRepository, MAX_EVENTS_PER_ALERT};
use crate::storage::{StorageError, StorageResult};

pub struct SqliteAlertRepository {
    pool: Pool<Sqlite>,
}

impl SqliteAlertRepository {
    /// Open (or create) the database file and run migrations
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();
        info!("opening alert database at {db_path}");

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, running migrations on it
    pub async fn from_pool(pool: Pool<Sqlite>) -> StorageResult<Self> {
        debug!("running alert migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

fn parse_uuid(raw: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StorageError::QueryFailed(format!("bad id '{raw}': {e}")))
}

fn config_from_row(row: &SqliteRow) -> StorageResult<AlertConfig> {
    Ok(AlertConfig {
        id: parse_uuid(row.get("id"))?,
        name: row.get("name"),
        condition: serde_json::from_str(row.get("condition_json"))?,
        channels: serde_json::from_str(row.get("channels"))?,
        recipients: serde_json::from_str(row.get("recipients"))?,
        cooldown_seconds: row.get::<i64, _>("cooldown_seconds").max(0) as u64,
        enabled: row.get::<i64, _>("enabled") != 0,
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

fn event_from_row(row: &SqliteRow) -> StorageResult<AlertEvent> {
    let status = match row.get::<&str, _>("status") {
        "resolved" => AlertStatus::Resolved,
        _ => AlertStatus::Triggered,
    };
    let details = row
        .get::<Option<&str>, _>("details")
        .map(serde_json::from_str)
        .transpose()?;
    let trigger_event_id = row
        .get::<Option<&str>, _>("trigger_event_id")
        .map(parse_uuid)
        .transpose()?;

    Ok(AlertEvent {
        id: parse_uuid(row.get("id"))?,
        alert_id: parse_uuid(row.get("alert_id"))?,
        alert_name: row.get("alert_name"),
        condition: serde_json::from_str(row.get("condition_json"))?,
        triggered_at: from_millis(row.get("triggered_at")),
        resolved_at: row.get::<Option<i64>, _>("resolved_at").map(from_millis),
        status,
        channels: serde_json::from_str(row.get("channels"))?,
        details,
        trigger_event_id,
    })
}

const EVENT_COLUMNS: &str = "id, alert_id, alert_name, condition_json, triggered_at, resolved_at, \
                             status, channels, details, trigger_event_id";

#[async_trait]
impl AlertRepository for SqliteAlertRepository {
    async fn list_configs(&self) -> StorageResult<Vec<AlertConfig>> {
        let rows = sqlx::query("SELECT * FROM alert_configs ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(config_from_row).collect()
    }

    async fn get_config(&self, id: Uuid) -> StorageResult<Option<AlertConfig>> {
        let row = sqlx::query("SELECT * FROM alert_configs WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(config_from_row).transpose()
    }

    #[instrument(skip(self, config), fields(id = %config.id))]
    async fn insert_config(&self, config: &AlertConfig) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO alert_configs (
                id, name, condition_json, channels, recipients,
                cooldown_seconds, enabled, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(config.id.to_string())
        .bind(&config.name)
        .bind(serde_json::to_string(&config.condition)?)
        .bind(serde_json::to_string(&config.channels)?)
        .bind(serde_json::to_string(&config.recipients)?)
        .bind(config.cooldown_seconds as i64)
        .bind(config.enabled as i64)
        .bind(to_millis(&config.created_at))
        .bind(to_millis(&config.updated_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, config), fields(id = %config.id))]
    async fn update_config(&self, config: &AlertConfig) -> StorageResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE alert_configs SET
                name = ?, condition_json = ?, channels = ?, recipients = ?,
                cooldown_seconds = ?, enabled = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&config.name)
        .bind(serde_json::to_string(&config.condition)?)
        .bind(serde_json::to_string(&config.channels)?)
        .bind(serde_json::to_string(&config.recipients)?)
        .bind(config.cooldown_seconds as i64)
        .bind(config.enabled as i64)
        .bind(to_millis(&config.updated_at))
        .bind(config.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn delete_config(&self, id: Uuid) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM alert_events WHERE alert_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM alert_configs WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, event), fields(alert_id = %event.alert_id, status = event.status.as_str()))]
    async fn append_event(&self, event: &AlertEvent) -> StorageResult<()> {
        let alert_id = event.alert_id.to_string();
        let details = event
            .details
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO alert_events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(event.id.to_string())
        .bind(&alert_id)
        .bind(&event.alert_name)
        .bind(serde_json::to_string(&event.condition)?)
        .bind(to_millis(&event.triggered_at))
        .bind(event.resolved_at.as_ref().map(to_millis))
        .bind(event.status.as_str())
        .bind(serde_json::to_string(&event.channels)?)
        .bind(details)
        .bind(event.trigger_event_id.map(|id| id.to_string()))
        .execute(&mut *tx)
        .await?;

        let pruned = sqlx::query(
            r#"
            DELETE FROM alert_events
            WHERE alert_id = ? AND seq NOT IN (
                SELECT seq FROM alert_events
                WHERE alert_id = ?
                ORDER BY seq DESC
                LIMIT ?
            )
            "#,
        )
        .bind(&alert_id)
        .bind(&alert_id)
        .bind(MAX_EVENTS_PER_ALERT as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if pruned.rows_affected() > 0 {
            debug!("pruned {} old events", pruned.rows_affected());
        }
        Ok(())
    }

    async fn latest_event(&self, alert_id: Uuid) -> StorageResult<Option<AlertEvent>> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM alert_events WHERE alert_id = ? ORDER BY seq DESC LIMIT 1"
        ))
        .bind(alert_id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn events_for(&self, alert_id: Uuid, limit: usize) -> StorageResult<Vec<AlertEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM alert_events WHERE alert_id = ? ORDER BY seq DESC LIMIT ?"
        ))
        .bind(alert_id.to_string())
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AlertEvent>> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM alert_events ORDER BY seq DESC LIMIT ?"
        ))
        .bind(limit.min(i64::MAX as usize) as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }
}
