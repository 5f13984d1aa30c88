//! Periodic health cycle and point-in-time queries
//!
//! One cycle runs shallow probes, recomputes module health, persists the
//! snapshots that are due, evaluates alerts and publishes the resulting
//! overview to streaming subscribers. Everything else in here is a read over
//! the components the service was built from.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, error, instrument, warn};

use crate::alerts::{AlertEngine, AlertEvent, EvaluationContext};
use crate::health::{HealthAggregator, ProcessStats, summarize_probes};
use crate::metrics::{MetricCollector, MetricsSnapshotMap};
use crate::probes::{ProbeRegistry, ProbeResult};
use crate::storage::{
    MetricsSnapshot, SnapshotPeriod, StorageError, StorageStatus, TimeSeriesPoint,
    TimeSeriesStorage,
};
use crate::{HealthStatus, ModuleHealth};

pub const CYCLE_DURATION_METRIC: &str = "pulse.cycle.duration";
const UPDATE_CAPACITY: usize = 16;
const DEFAULT_POINT_WINDOW_HOURS: i64 = 1;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Everything the dashboard shows at a glance
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseOverview {
    pub status: HealthStatus,
    pub generated_at: DateTime<Utc>,
    pub probes: Vec<ProbeResult>,
    pub modules: BTreeMap<String, ModuleHealth>,
    pub process: ProcessStats,
    pub storage: StorageStatus,
    pub active_alerts: Vec<AlertEvent>,
}

/// Query of `get_historical_metrics`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub metric: Option<String>,
    pub period: Option<SnapshotPeriod>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// One time series of a historical query
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalMetric {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<SnapshotPeriod>,
    pub points: Vec<TimeSeriesPoint>,
}

/// Module a probe's failures are attributed to
fn module_for_probe(probe: &str) -> &str {
    if probe.starts_with("llm-") {
        "llm"
    } else {
        probe
    }
}

pub struct PulseService {
    collector: Arc<MetricCollector>,
    storage: Arc<TimeSeriesStorage>,
    probes: Arc<ProbeRegistry>,
    aggregator: Arc<HealthAggregator>,
    engine: Arc<AlertEngine>,
    latest: RwLock<Option<PulseOverview>>,
    updates: broadcast::Sender<PulseOverview>,
    last_stored: Mutex<HashMap<SnapshotPeriod, DateTime<Utc>>>,
}

impl PulseService {
    pub fn new(
        collector: Arc<MetricCollector>,
        storage: Arc<TimeSeriesStorage>,
        probes: Arc<ProbeRegistry>,
        aggregator: Arc<HealthAggregator>,
        engine: Arc<AlertEngine>,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            collector,
            storage,
            probes,
            aggregator,
            engine,
            latest: RwLock::new(None),
            updates,
            last_stored: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &Arc<MetricCollector> {
        &self.collector
    }

    pub fn storage(&self) -> &Arc<TimeSeriesStorage> {
        &self.storage
    }

    pub fn engine(&self) -> &Arc<AlertEngine> {
        &self.engine
    }

    pub fn aggregator(&self) -> &Arc<HealthAggregator> {
        &self.aggregator
    }

    /// Overviews published at the end of every cycle
    pub fn subscribe_updates(&self) -> broadcast::Receiver<PulseOverview> {
        self.updates.subscribe()
    }

    /// Period classes whose last snapshot is at least one interval old
    fn due_periods(&self, now: DateTime<Utc>) -> Vec<SnapshotPeriod> {
        let Ok(last_stored) = self.last_stored.lock() else {
            return SnapshotPeriod::ALL.to_vec();
        };
        SnapshotPeriod::ALL
            .into_iter()
            .filter(|period| match last_stored.get(period) {
                None => true,
                Some(last) => {
                    let interval =
                        Duration::from_std(period.interval()).unwrap_or_else(|_| Duration::days(1));
                    now - *last >= interval
                }
            })
            .collect()
    }

    fn mark_stored(&self, period: SnapshotPeriod, at: DateTime<Utc>) {
        if let Ok(mut last_stored) = self.last_stored.lock() {
            last_stored.insert(period, at);
        }
    }

    /// Run one full cycle and publish its overview
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> PulseOverview {
        let timer = self.collector.start_timer(CYCLE_DURATION_METRIC, &[]);

        let probes = self.probes.run_probes(false).await;
        for probe in probes.iter().filter(|p| !p.healthy) {
            let message = probe.message.as_deref().unwrap_or("probe failed");
            if let Err(e) = self
                .storage
                .record_error(module_for_probe(&probe.name), "probe_failure", message)
                .await
            {
                warn!("failed to record probe failure of {}: {e}", probe.name);
            }
        }

        let modules = self.aggregator.get_all_module_health().await;
        let now = Utc::now();

        for period in self.due_periods(now) {
            let snapshot = MetricsSnapshot {
                timestamp: now,
                period,
                modules: modules.clone(),
            };
            match self.storage.store_snapshot(&snapshot).await {
                Ok(()) => {
                    debug!("stored {period} snapshot");
                    self.mark_stored(period, now);
                }
                Err(e) => error!("failed to store {period} snapshot: {e}"),
            }
        }

        let process = self.aggregator.process_stats();
        self.store_points(&probes, &process, now).await;

        let context = EvaluationContext::new(probes.clone(), self.collector.get_snapshot());
        if let Err(e) = self.engine.evaluate_alerts(&context).await {
            error!("alert evaluation failed: {e}");
        }

        let overview = self.assemble(probes, modules, process).await;
        *self.latest.write().await = Some(overview.clone());
        let _ = self.updates.send(overview.clone());

        let elapsed = timer.stop();
        debug!("cycle finished in {elapsed:.1}ms");
        overview
    }

    async fn store_points(&self, probes: &[ProbeResult], process: &ProcessStats, now: DateTime<Utc>) {
        let mut points: Vec<(String, f64)> = probes
            .iter()
            .map(|p| (format!("probe.{}.latency_ms", p.name), p.latency_ms))
            .collect();
        points.push(("process.memory_bytes".to_string(), process.memory_bytes as f64));
        points.push(("process.cpu_percent".to_string(), process.cpu_percent));

        for (metric, value) in points {
            if let Err(e) = self.storage.store_point(&metric, value, Some(now)).await {
                warn!("failed to store point {metric}: {e}");
            }
        }
    }

    async fn assemble(
        &self,
        probes: Vec<ProbeResult>,
        modules: BTreeMap<String, ModuleHealth>,
        process: ProcessStats,
    ) -> PulseOverview {
        let status = modules
            .values()
            .map(|m| m.status)
            .fold(summarize_probes(&probes), HealthStatus::worst);

        let active_alerts = self.engine.active_alerts().await.unwrap_or_else(|e| {
            warn!("active alerts unavailable: {e}");
            Vec::new()
        });

        PulseOverview {
            status,
            generated_at: Utc::now(),
            probes,
            modules,
            process,
            storage: self.storage.status(),
            active_alerts,
        }
    }

    /// Latest published overview, computed on demand before the first cycle
    pub async fn get_pulse_overview(&self) -> PulseOverview {
        if let Some(overview) = self.latest.read().await.clone() {
            return overview;
        }
        let probes = self.probes.run_probes(false).await;
        let modules = self.aggregator.get_all_module_health().await;
        let process = self.aggregator.process_stats();
        self.assemble(probes, modules, process).await
    }

    pub async fn get_all_probes(&self, deep: bool) -> Vec<ProbeResult> {
        self.probes.run_probes(deep).await
    }

    pub async fn get_probe(&self, name: &str, deep: bool) -> Option<ProbeResult> {
        self.probes.run_probe(name, deep).await
    }

    pub async fn get_module_health(&self) -> BTreeMap<String, ModuleHealth> {
        self.aggregator.get_all_module_health().await
    }

    pub fn get_metrics_snapshot(&self) -> MetricsSnapshotMap {
        self.collector.get_snapshot()
    }

    /// Stored history.
    ///
    /// With a `period`, every module metric found in that period's snapshots
    /// becomes a series, optionally narrowed to `metric`. Without a period the
    /// raw points of `metric` are returned.
    #[instrument(skip(self))]
    pub async fn get_historical_metrics(
        &self,
        query: &HistoryQuery,
    ) -> Result<Vec<HistoricalMetric>, ServiceError> {
        let to = query.to.unwrap_or_else(Utc::now);

        if let Some(period) = query.period {
            let from = query.from.unwrap_or_else(|| {
                to - Duration::from_std(period.retention()).unwrap_or_else(|_| Duration::days(30))
            });
            if from > to {
                return Err(ServiceError::InvalidQuery("from must not be after to".into()));
            }
            let snapshots = self.storage.get_snapshots(period, from, to).await?;
            return Ok(series_from_snapshots(&snapshots, period, query.metric.as_deref()));
        }

        let Some(metric) = &query.metric else {
            return Err(ServiceError::InvalidQuery(
                "either metric or period is required".into(),
            ));
        };
        let from = query
            .from
            .unwrap_or_else(|| to - Duration::hours(DEFAULT_POINT_WINDOW_HOURS));
        if from > to {
            return Err(ServiceError::InvalidQuery("from must not be after to".into()));
        }

        let points = self.storage.get_points(metric, from, to).await?;
        Ok(vec![HistoricalMetric {
            name: metric.clone(),
            module: None,
            period: None,
            points,
        }])
    }
}

fn series_from_snapshots(
    snapshots: &[MetricsSnapshot],
    period: SnapshotPeriod,
    metric: Option<&str>,
) -> Vec<HistoricalMetric> {
    let mut series: BTreeMap<(String, String), Vec<TimeSeriesPoint>> = BTreeMap::new();

    for snapshot in snapshots {
        for (module, health) in &snapshot.modules {
            for (name, reading) in &health.metrics {
                if metric.is_some_and(|m| m != name) {
                    continue;
                }
                series
                    .entry((module.clone(), name.clone()))
                    .or_default()
                    .push(TimeSeriesPoint {
                        timestamp: snapshot.timestamp,
                        value: reading.value,
                    });
            }
        }
    }

    series
        .into_iter()
        .map(|((module, name), mut points)| {
            points.sort_by_key(|p| p.timestamp);
            HistoricalMetric {
                name,
                module: Some(module),
                period: Some(period),
                points,
            }
        })
        .collect()
}
