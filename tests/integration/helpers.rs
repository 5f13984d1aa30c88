//! Helper functions for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse::{
    alerts::{
        AlertCondition, AlertConfigInput, AlertEngine, ChannelDispatcher, ChannelKind,
        ComparisonOperator, MemoryAlertRepository, UiChannel,
    },
    health::{HealthAggregator, default_modules},
    metrics::MetricCollector,
    probes::{HealthProbe, ProbeError, ProbeRegistry, ProbeResult},
    service::PulseService,
    storage::{
        ErrorSummary, MetricsSnapshot, SnapshotPeriod, StorageError, StorageResult,
        TimeSeriesBackend, TimeSeriesPoint, TimeSeriesStorage,
    },
};

#[derive(Debug, Clone, Copy)]
pub enum Outcome {
    Pass,
    Unhealthy,
    Fail,
}

/// Probe with a fixed outcome
pub struct StaticProbe {
    name: String,
    deep: bool,
    outcome: Outcome,
}

impl StaticProbe {
    pub fn arc(name: &str, deep: bool, outcome: Outcome) -> Arc<dyn HealthProbe> {
        Arc::new(Self {
            name: name.to_string(),
            deep,
            outcome,
        })
    }
}

#[async_trait]
impl HealthProbe for StaticProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_deep(&self) -> bool {
        self.deep
    }

    async fn check(&self) -> Result<ProbeResult, ProbeError> {
        match self.outcome {
            Outcome::Pass => Ok(ProbeResult::healthy(&self.name, self.deep, 2.0)),
            Outcome::Unhealthy => Ok(ProbeResult::unhealthy(
                &self.name,
                self.deep,
                3.0,
                "connection refused",
            )),
            Outcome::Fail => Err(ProbeError::Internal("probe crashed".to_string())),
        }
    }
}

/// Durable backend that rejects every call and counts attempts
#[derive(Default)]
pub struct BrokenBackend {
    pub calls: AtomicUsize,
}

impl BrokenBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StorageError::BackendError("connection reset".to_string()))
    }
}

#[async_trait]
impl TimeSeriesBackend for BrokenBackend {
    fn name(&self) -> &'static str {
        "broken"
    }

    async fn store_snapshot(&self, _snapshot: &MetricsSnapshot) -> StorageResult<()> {
        self.fail()
    }

    async fn get_snapshots(
        &self,
        _period: SnapshotPeriod,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> StorageResult<Vec<MetricsSnapshot>> {
        self.fail()
    }

    async fn store_point(&self, _metric: &str, _point: TimeSeriesPoint) -> StorageResult<()> {
        self.fail()
    }

    async fn get_points(
        &self,
        _metric: &str,
        _from: DateTime<Utc>,
        _to: DateTime<Utc>,
    ) -> StorageResult<Vec<TimeSeriesPoint>> {
        self.fail()
    }

    async fn record_error(
        &self,
        _module: &str,
        _error_type: &str,
        _message: &str,
        _at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.fail()
    }

    async fn get_errors(&self, _module: &str) -> StorageResult<Vec<ErrorSummary>> {
        self.fail()
    }
}

pub fn registry(probes: Vec<Arc<dyn HealthProbe>>) -> ProbeRegistry {
    let mut registry = ProbeRegistry::new();
    for probe in probes {
        registry.register(probe);
    }
    registry
}

/// Service wired with in-memory alerts and the UI channel only
pub fn build_service(registry: ProbeRegistry, storage: TimeSeriesStorage) -> Arc<PulseService> {
    let collector = Arc::new(MetricCollector::new());
    let storage = Arc::new(storage);
    let probes = Arc::new(registry);
    let aggregator = Arc::new(HealthAggregator::new(
        collector.clone(),
        storage.clone(),
        probes.clone(),
        default_modules(),
    ));

    let (ui, _) = UiChannel::new(16);
    let dispatcher = ChannelDispatcher::new().with_channel(Arc::new(ui));
    let engine = Arc::new(AlertEngine::new(
        Arc::new(MemoryAlertRepository::new()),
        dispatcher,
    ));

    Arc::new(PulseService::new(
        collector, storage, probes, aggregator, engine,
    ))
}

pub fn in_memory_service() -> Arc<PulseService> {
    build_service(
        registry(vec![StaticProbe::arc("database", false, Outcome::Pass)]),
        TimeSeriesStorage::in_memory(),
    )
}

pub fn latency_alert(name: &str, threshold: f64) -> AlertConfigInput {
    AlertConfigInput {
        name: name.to_string(),
        condition: AlertCondition::MetricThreshold {
            target: "db.query.latency".to_string(),
            operator: ComparisonOperator::Gte,
            value: threshold,
        },
        channels: vec![ChannelKind::Ui],
        recipients: Vec::new(),
        cooldown_seconds: 300,
        enabled: true,
    }
}

pub fn probe_alert(name: &str, probe: &str) -> AlertConfigInput {
    AlertConfigInput {
        name: name.to_string(),
        condition: AlertCondition::ProbeUnhealthy {
            target: probe.to_string(),
        },
        channels: vec![ChannelKind::Ui],
        recipients: Vec::new(),
        cooldown_seconds: 300,
        enabled: true,
    }
}
