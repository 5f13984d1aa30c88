//! Persistence of alert configurations and events
//!
//! Events are append-only. The most recent event of an alert, in append
//! order, determines its current state. Each alert keeps at most
//! [`MAX_EVENTS_PER_ALERT`] events; older ones are pruned on append.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::model::{AlertConfig, AlertEvent};
use crate::storage::StorageResult;

pub const MAX_EVENTS_PER_ALERT: usize = 100;

#[async_trait]
pub trait AlertRepository: Send + Sync {
    /// All configurations, oldest first
    async fn list_configs(&self) -> StorageResult<Vec<AlertConfig>>;

    async fn get_config(&self, id: Uuid) -> StorageResult<Option<AlertConfig>>;

    async fn insert_config(&self, config: &AlertConfig) -> StorageResult<()>;

    /// Returns `false` when no configuration with that id exists
    async fn update_config(&self, config: &AlertConfig) -> StorageResult<bool>;

    /// Delete a configuration together with its events.
    /// Returns `false` when no configuration with that id exists.
    async fn delete_config(&self, id: Uuid) -> StorageResult<bool>;

    async fn append_event(&self, event: &AlertEvent) -> StorageResult<()>;

    async fn latest_event(&self, alert_id: Uuid) -> StorageResult<Option<AlertEvent>>;

    /// Events of one alert, newest first
    async fn events_for(&self, alert_id: Uuid, limit: usize) -> StorageResult<Vec<AlertEvent>>;

    /// Events across all alerts, newest first
    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AlertEvent>>;
}

#[derive(Debug, Default)]
struct Inner {
    configs: BTreeMap<Uuid, AlertConfig>,
    /// Append order across all alerts
    events: VecDeque<AlertEvent>,
}

/// Repository without persistence, used in tests and when no database is set
#[derive(Debug, Default)]
pub struct MemoryAlertRepository {
    inner: RwLock<Inner>,
}

impl MemoryAlertRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AlertRepository for MemoryAlertRepository {
    async fn list_configs(&self) -> StorageResult<Vec<AlertConfig>> {
        let inner = self.inner.read().await;
        let mut configs: Vec<AlertConfig> = inner.configs.values().cloned().collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }

    async fn get_config(&self, id: Uuid) -> StorageResult<Option<AlertConfig>> {
        Ok(self.inner.read().await.configs.get(&id).cloned())
    }

    async fn insert_config(&self, config: &AlertConfig) -> StorageResult<()> {
        self.inner
            .write()
            .await
            .configs
            .insert(config.id, config.clone());
        Ok(())
    }

    async fn update_config(&self, config: &AlertConfig) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.configs.get_mut(&config.id) {
            Some(existing) => {
                *existing = config.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_config(&self, id: Uuid) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;
        if inner.configs.remove(&id).is_none() {
            return Ok(false);
        }
        inner.events.retain(|e| e.alert_id != id);
        Ok(true)
    }

    async fn append_event(&self, event: &AlertEvent) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.events.push_back(event.clone());

        let count = inner
            .events
            .iter()
            .filter(|e| e.alert_id == event.alert_id)
            .count();
        if count > MAX_EVENTS_PER_ALERT {
            let mut excess = count - MAX_EVENTS_PER_ALERT;
            inner.events.retain(|e| {
                if excess > 0 && e.alert_id == event.alert_id {
                    excess -= 1;
                    false
                } else {
                    true
                }
            });
        }
        Ok(())
    }

    async fn latest_event(&self, alert_id: Uuid) -> StorageResult<Option<AlertEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .find(|e| e.alert_id == alert_id)
            .cloned())
    }

    async fn events_for(&self, alert_id: Uuid, limit: usize) -> StorageResult<Vec<AlertEvent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .events
            .iter()
            .rev()
            .filter(|e| e.alert_id == alert_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AlertEvent>> {
        let inner = self.inner.read().await;
        Ok(inner.events.iter().rev().take(limit).cloned().collect())
    }
}
