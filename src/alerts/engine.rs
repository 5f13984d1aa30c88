//! Alert evaluation and lifecycle
//!
//! Each alert moves `idle -> triggered -> (cooldown) -> idle`. Resolution is
//! a separate transition requested from outside; evaluation never
//! auto-resolves.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::channels::{AlertNotification, ChannelDispatcher, ChannelResult};
use super::cooldown::CooldownTracker;
use super::model::{AlertCondition, AlertConfig, AlertConfigInput, AlertEvent, AlertStatus};
use super::repository::AlertRepository;
use super::validation::{ValidationErrors, validate};
use crate::metrics::MetricsSnapshotMap;
use crate::probes::ProbeResult;
use crate::storage::StorageError;

pub const RECENT_EVENTS_LIMIT: usize = 20;
const TRANSITION_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type AlertResult<T> = Result<T, AlertError>;

/// Inputs a condition is evaluated against
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub probes: HashMap<String, ProbeResult>,
    pub metrics: MetricsSnapshotMap,
}

impl EvaluationContext {
    pub fn new(probes: Vec<ProbeResult>, metrics: MetricsSnapshotMap) -> Self {
        Self {
            probes: probes.into_iter().map(|p| (p.name.clone(), p)).collect(),
            metrics,
        }
    }
}

/// Whether the condition holds, with diagnostics describing why
pub fn condition_holds(condition: &AlertCondition, context: &EvaluationContext) -> Option<Value> {
    match condition {
        AlertCondition::ProbeUnhealthy { target } => {
            let probe = context.probes.get(target)?;
            (!probe.healthy).then(|| {
                json!({
                    "probe": target,
                    "message": probe.message,
                    "latencyMs": probe.latency_ms,
                })
            })
        }
        AlertCondition::ProbeDegraded { target } => {
            let probe = context.probes.get(target)?;
            let message = probe.message.as_deref().filter(|m| !m.is_empty())?;
            (!probe.healthy).then(|| {
                json!({
                    "probe": target,
                    "message": message,
                    "latencyMs": probe.latency_ms,
                })
            })
        }
        AlertCondition::MetricThreshold {
            target,
            operator,
            value,
        } => {
            let entry = context.metrics.get(target)?.first()?;
            let observed = entry.metric.scalar();
            operator.compare(observed, *value).then(|| {
                json!({
                    "metric": target,
                    "observed": observed,
                    "threshold": value,
                    "operator": operator,
                })
            })
        }
    }
}

/// An appended event together with its delivery outcome
#[derive(Debug, Clone, Serialize)]
pub struct TriggeredAlert {
    pub event: AlertEvent,
    pub deliveries: Vec<ChannelResult>,
}

pub struct AlertEngine {
    repository: Arc<dyn AlertRepository>,
    cooldowns: CooldownTracker,
    dispatcher: ChannelDispatcher,
    transitions: broadcast::Sender<AlertEvent>,
    /// Held while reading an alert's latest event and appending the next one
    transition_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AlertEngine {
    pub fn new(repository: Arc<dyn AlertRepository>, dispatcher: ChannelDispatcher) -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        Self {
            repository,
            cooldowns: CooldownTracker::new(),
            dispatcher,
            transitions,
            transition_locks: DashMap::new(),
        }
    }

    /// Receive every triggered and resolved event from now on
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.transitions.subscribe()
    }

    pub fn is_on_cooldown(&self, alert_id: Uuid) -> bool {
        self.cooldowns.is_on_cooldown(alert_id)
    }

    /// Trigger every enabled alert whose condition holds and which is not
    /// cooling down. A storage failure on one alert does not stop the others.
    #[instrument(skip_all)]
    pub async fn evaluate_alerts(
        &self,
        context: &EvaluationContext,
    ) -> AlertResult<Vec<TriggeredAlert>> {
        let configs = self.repository.list_configs().await?;
        let mut triggered = Vec::new();

        for config in configs.iter().filter(|c| c.enabled) {
            let Some(details) = condition_holds(&config.condition, context) else {
                continue;
            };
            if !self.cooldowns.try_start(config.id, config.cooldown_seconds) {
                debug!(alert = %config.name, "condition holds but alert is cooling down");
                continue;
            }

            info!(alert = %config.name, "alert triggered: {}", config.condition.describe());
            let event = AlertEvent::triggered(config, Some(details));
            if let Err(e) = self.record_locked(&event).await {
                error!(alert = %config.name, "failed to record triggered event: {e}");
                self.cooldowns.clear(config.id);
                continue;
            }
            triggered.push(self.deliver(config, event).await);
        }

        Ok(triggered)
    }

    /// Trigger regardless of condition and cooldown. Does not start a cooldown.
    #[instrument(skip(self, details))]
    pub async fn trigger_manual_alert(
        &self,
        alert_id: Uuid,
        details: Option<Value>,
    ) -> AlertResult<TriggeredAlert> {
        let config = self.require_config(alert_id).await?;
        info!(alert = %config.name, "manual trigger");

        let details = details.unwrap_or_else(|| json!({ "manual": true }));
        let event = AlertEvent::triggered(&config, Some(details));
        self.record_locked(&event).await?;
        Ok(self.deliver(&config, event).await)
    }

    /// Resolve the alert's latest triggered event.
    ///
    /// Returns `Ok(None)` when there is nothing to resolve: no events, the
    /// latest is already resolved, or `event_id` names a different event.
    #[instrument(skip(self))]
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
        event_id: Option<Uuid>,
    ) -> AlertResult<Option<TriggeredAlert>> {
        let config = self.require_config(alert_id).await?;

        let lock = self.transition_lock(alert_id);
        let resolution = {
            let _guard = lock.lock().await;

            let Some(latest) = self.repository.latest_event(alert_id).await? else {
                debug!(alert = %config.name, "no events to resolve");
                return Ok(None);
            };
            if latest.status == AlertStatus::Resolved {
                debug!(alert = %config.name, "already resolved");
                return Ok(None);
            }
            if let Some(event_id) = event_id
                && event_id != latest.id
            {
                warn!(alert = %config.name, "resolve requested for stale event {event_id}");
                return Ok(None);
            }

            let resolution = latest.resolution();
            self.record(&resolution).await?;
            resolution
        };

        info!(alert = %config.name, "alert resolved");
        Ok(Some(self.deliver(&config, resolution).await))
    }

    fn transition_lock(&self, alert_id: Uuid) -> Arc<Mutex<()>> {
        self.transition_locks.entry(alert_id).or_default().clone()
    }

    async fn record_locked(&self, event: &AlertEvent) -> AlertResult<()> {
        let lock = self.transition_lock(event.alert_id);
        let _guard = lock.lock().await;
        self.record(event).await
    }

    /// Append and publish. Callers hold the alert's transition lock.
    async fn record(&self, event: &AlertEvent) -> AlertResult<()> {
        self.repository.append_event(event).await?;
        let _ = self.transitions.send(event.clone());
        Ok(())
    }

    /// Runs outside the transition lock
    async fn deliver(&self, config: &AlertConfig, event: AlertEvent) -> TriggeredAlert {
        let notification = AlertNotification::from_event(&event, &config.recipients);
        let deliveries = self.dispatcher.dispatch(&event.channels, &notification).await;
        TriggeredAlert { event, deliveries }
    }

    async fn require_config(&self, alert_id: Uuid) -> AlertResult<AlertConfig> {
        self.repository
            .get_config(alert_id)
            .await?
            .ok_or(AlertError::NotFound(alert_id))
    }

    pub async fn create_alert(&self, input: AlertConfigInput) -> AlertResult<AlertConfig> {
        validate(&input)?;
        let config = AlertConfig::from_input(input);
        self.repository.insert_config(&config).await?;
        info!(alert = %config.name, id = %config.id, "alert created");
        Ok(config)
    }

    pub async fn update_alert(
        &self,
        alert_id: Uuid,
        input: AlertConfigInput,
    ) -> AlertResult<AlertConfig> {
        validate(&input)?;
        let mut config = self.require_config(alert_id).await?;
        config.apply(input);
        if !self.repository.update_config(&config).await? {
            return Err(AlertError::NotFound(alert_id));
        }
        Ok(config)
    }

    pub async fn delete_alert(&self, alert_id: Uuid) -> AlertResult<()> {
        if self.repository.delete_config(alert_id).await? {
            self.transition_locks.remove(&alert_id);
            info!(id = %alert_id, "alert deleted");
            Ok(())
        } else {
            Err(AlertError::NotFound(alert_id))
        }
    }

    pub async fn get_alert(&self, alert_id: Uuid) -> AlertResult<AlertConfig> {
        self.require_config(alert_id).await
    }

    pub async fn list_alerts(&self) -> AlertResult<Vec<AlertConfig>> {
        Ok(self.repository.list_configs().await?)
    }

    pub async fn alert_events(&self, alert_id: Uuid, limit: usize) -> AlertResult<Vec<AlertEvent>> {
        self.require_config(alert_id).await?;
        Ok(self.repository.events_for(alert_id, limit).await?)
    }

    pub async fn recent_events(&self) -> AlertResult<Vec<AlertEvent>> {
        Ok(self.repository.recent_events(RECENT_EVENTS_LIMIT).await?)
    }

    /// Latest event of every alert that is currently triggered
    pub async fn active_alerts(&self) -> AlertResult<Vec<AlertEvent>> {
        let mut active = Vec::new();
        for config in self.repository.list_configs().await? {
            if let Some(event) = self.repository.latest_event(config.id).await?
                && event.status == AlertStatus::Triggered
            {
                active.push(event);
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::alerts::channels::UiChannel;
    use crate::alerts::model::{ChannelKind, ComparisonOperator};
    use crate::alerts::repository::MemoryAlertRepository;
    use crate::metrics::MetricCollector;
    use crate::storage::StorageResult;

    fn engine() -> AlertEngine {
        let (ui, _) = UiChannel::new(16);
        AlertEngine::new(
            Arc::new(MemoryAlertRepository::new()),
            ChannelDispatcher::new().with_channel(Arc::new(ui)),
        )
    }

    fn input(condition: AlertCondition, cooldown_seconds: u64) -> AlertConfigInput {
        AlertConfigInput {
            name: "test alert".to_string(),
            condition,
            channels: vec![ChannelKind::Ui],
            recipients: vec![],
            cooldown_seconds,
            enabled: true,
        }
    }

    fn probe_context(name: &str, healthy: bool, message: Option<&str>) -> EvaluationContext {
        let mut result = if healthy {
            ProbeResult::healthy(name, false, 3.0)
        } else {
            ProbeResult::unhealthy(name, false, 3.0, "down")
        };
        result.message = message.map(str::to_string);
        EvaluationContext::new(vec![result], MetricsSnapshotMap::new())
    }

    #[test]
    fn test_probe_conditions() {
        let unhealthy = AlertCondition::ProbeUnhealthy {
            target: "cache".into(),
        };
        let degraded = AlertCondition::ProbeDegraded {
            target: "cache".into(),
        };

        assert!(condition_holds(&unhealthy, &probe_context("cache", false, None)).is_some());
        assert!(condition_holds(&unhealthy, &probe_context("cache", true, None)).is_none());
        assert!(condition_holds(&unhealthy, &probe_context("other", false, None)).is_none());

        assert!(condition_holds(&degraded, &probe_context("cache", false, None)).is_none());
        assert!(condition_holds(&degraded, &probe_context("cache", false, Some(""))).is_none());
        assert!(
            condition_holds(&degraded, &probe_context("cache", false, Some("refused"))).is_some()
        );
    }

    #[test]
    fn test_metric_threshold_reads_first_series() {
        let collector = MetricCollector::new();
        collector.observe_histogram("db.query.latency", 600.0, &[]);
        collector.observe_histogram("db.query.latency", 10.0, &[("table", "users")]);
        let context = EvaluationContext::new(vec![], collector.get_snapshot());

        let condition = AlertCondition::MetricThreshold {
            target: "db.query.latency".into(),
            operator: ComparisonOperator::Gte,
            value: 500.0,
        };
        let details = condition_holds(&condition, &context).unwrap();
        assert_eq!(details["observed"], json!(600.0));

        let missing = AlertCondition::MetricThreshold {
            target: "absent".into(),
            operator: ComparisonOperator::Gte,
            value: 0.0,
        };
        assert!(condition_holds(&missing, &context).is_none());
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_second_trigger() {
        let engine = engine();
        let config = engine
            .create_alert(input(
                AlertCondition::ProbeUnhealthy {
                    target: "cache".into(),
                },
                60,
            ))
            .await
            .unwrap();
        let context = probe_context("cache", false, None);

        assert_eq!(engine.evaluate_alerts(&context).await.unwrap().len(), 1);
        assert_eq!(engine.evaluate_alerts(&context).await.unwrap().len(), 0);
        assert_eq!(engine.alert_events(config.id, 10).await.unwrap().len(), 1);
        assert!(engine.is_on_cooldown(config.id));
    }

    #[tokio::test]
    async fn test_disabled_alerts_are_skipped() {
        let engine = engine();
        let mut disabled = input(
            AlertCondition::ProbeUnhealthy {
                target: "cache".into(),
            },
            0,
        );
        disabled.enabled = false;
        engine.create_alert(disabled).await.unwrap();

        let triggered = engine
            .evaluate_alerts(&probe_context("cache", false, None))
            .await
            .unwrap();
        assert!(triggered.is_empty());
    }

    #[tokio::test]
    async fn test_manual_trigger_and_resolve() {
        let engine = engine();
        let mut transitions = engine.subscribe();
        let config = engine
            .create_alert(input(
                AlertCondition::ProbeUnhealthy {
                    target: "cache".into(),
                },
                60,
            ))
            .await
            .unwrap();

        assert_matches!(engine.resolve_alert(config.id, None).await, Ok(None));

        let triggered = engine.trigger_manual_alert(config.id, None).await.unwrap();
        assert!(triggered.deliveries.iter().all(|d| d.success));
        assert!(!engine.is_on_cooldown(config.id));
        assert_eq!(engine.active_alerts().await.unwrap().len(), 1);

        let stale = engine
            .resolve_alert(config.id, Some(Uuid::new_v4()))
            .await
            .unwrap();
        assert!(stale.is_none());

        let resolved = engine
            .resolve_alert(config.id, Some(triggered.event.id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resolved.event.trigger_event_id, Some(triggered.event.id));
        assert!(engine.active_alerts().await.unwrap().is_empty());
        assert_matches!(engine.resolve_alert(config.id, None).await, Ok(None));

        assert_eq!(transitions.recv().await.unwrap().status, AlertStatus::Triggered);
        assert_eq!(transitions.recv().await.unwrap().status, AlertStatus::Resolved);
    }

    /// Memory repository whose appends can be switched to fail
    #[derive(Default)]
    struct FlakyRepository {
        inner: MemoryAlertRepository,
        fail_appends: AtomicBool,
    }

    #[async_trait]
    impl AlertRepository for FlakyRepository {
        async fn list_configs(&self) -> StorageResult<Vec<AlertConfig>> {
            self.inner.list_configs().await
        }

        async fn get_config(&self, id: Uuid) -> StorageResult<Option<AlertConfig>> {
            self.inner.get_config(id).await
        }

        async fn insert_config(&self, config: &AlertConfig) -> StorageResult<()> {
            self.inner.insert_config(config).await
        }

        async fn update_config(&self, config: &AlertConfig) -> StorageResult<bool> {
            self.inner.update_config(config).await
        }

        async fn delete_config(&self, id: Uuid) -> StorageResult<bool> {
            self.inner.delete_config(id).await
        }

        async fn append_event(&self, event: &AlertEvent) -> StorageResult<()> {
            if self.fail_appends.load(Ordering::SeqCst) {
                return Err(StorageError::BackendError("disk full".to_string()));
            }
            self.inner.append_event(event).await
        }

        async fn latest_event(&self, alert_id: Uuid) -> StorageResult<Option<AlertEvent>> {
            self.inner.latest_event(alert_id).await
        }

        async fn events_for(&self, alert_id: Uuid, limit: usize) -> StorageResult<Vec<AlertEvent>> {
            self.inner.events_for(alert_id, limit).await
        }

        async fn recent_events(&self, limit: usize) -> StorageResult<Vec<AlertEvent>> {
            self.inner.recent_events(limit).await
        }
    }

    #[tokio::test]
    async fn test_failed_append_does_not_start_cooldown() {
        let repository = Arc::new(FlakyRepository::default());
        let engine = AlertEngine::new(repository.clone(), ChannelDispatcher::new());
        let config = engine
            .create_alert(input(
                AlertCondition::ProbeUnhealthy {
                    target: "cache".into(),
                },
                60,
            ))
            .await
            .unwrap();
        let context = probe_context("cache", false, None);

        repository.fail_appends.store(true, Ordering::SeqCst);
        assert!(engine.evaluate_alerts(&context).await.unwrap().is_empty());
        assert!(!engine.is_on_cooldown(config.id));

        repository.fail_appends.store(false, Ordering::SeqCst);
        assert_eq!(engine.evaluate_alerts(&context).await.unwrap().len(), 1);
        assert!(engine.is_on_cooldown(config.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_resolves_record_one_resolution() {
        let engine = Arc::new(engine());
        let config = engine
            .create_alert(input(
                AlertCondition::ProbeUnhealthy {
                    target: "cache".into(),
                },
                0,
            ))
            .await
            .unwrap();

        for _ in 0..10 {
            engine.trigger_manual_alert(config.id, None).await.unwrap();

            let attempts: Vec<_> = (0..8)
                .map(|_| {
                    let engine = engine.clone();
                    tokio::spawn(async move { engine.resolve_alert(config.id, None).await })
                })
                .collect();

            let mut resolved = 0;
            for attempt in attempts {
                if attempt.await.unwrap().unwrap().is_some() {
                    resolved += 1;
                }
            }
            assert_eq!(resolved, 1);
        }

        let events = engine.alert_events(config.id, 100).await.unwrap();
        let resolutions = events
            .iter()
            .filter(|e| e.status == AlertStatus::Resolved)
            .count();
        assert_eq!(events.len(), 20);
        assert_eq!(resolutions, 10);
    }

    #[tokio::test]
    async fn test_unknown_ids_and_invalid_input() {
        let engine = engine();
        let id = Uuid::new_v4();

        assert_matches!(engine.get_alert(id).await, Err(AlertError::NotFound(_)));
        assert_matches!(engine.delete_alert(id).await, Err(AlertError::NotFound(_)));
        assert_matches!(
            engine.trigger_manual_alert(id, None).await,
            Err(AlertError::NotFound(_))
        );
        assert_matches!(
            engine.resolve_alert(id, None).await,
            Err(AlertError::NotFound(_))
        );

        let mut invalid = input(
            AlertCondition::ProbeUnhealthy {
                target: "cache".into(),
            },
            0,
        );
        invalid.channels.clear();
        assert_matches!(
            engine.create_alert(invalid).await,
            Err(AlertError::Validation(_))
        );
    }
}
