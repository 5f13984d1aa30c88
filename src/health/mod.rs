//! Module and system health aggregation
//!
//! Module health is derived from the metric collector and the accumulated
//! error summaries. Each module watches a list of metrics with static
//! `{warning, critical}` thresholds; the module status is the worst status of
//! its metrics, escalated by recent errors:
//!
//! - more than [`ERROR_UNHEALTHY_THRESHOLD`] errors: unhealthy
//! - any error on an otherwise healthy module: degraded
//!
//! System health is derived from probe results: healthy when every probe
//! passes, unhealthy when none pass and degraded in between.

pub mod process;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::metrics::MetricCollector;
use crate::probes::{ProbeRegistry, ProbeResult};
use crate::storage::TimeSeriesStorage;
use crate::{HealthStatus, MetricReading, ModuleHealth};

pub use process::{ProcessSampler, ProcessStats};

/// Error count above which a module is unhealthy regardless of its metrics
pub const ERROR_UNHEALTHY_THRESHOLD: u64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub metric: String,
    pub warning: f64,
    pub critical: f64,
}

impl MetricThresholds {
    pub fn new(metric: &str, warning: f64, critical: f64) -> Self {
        Self {
            metric: metric.to_string(),
            warning,
            critical,
        }
    }

    pub fn classify(&self, value: f64) -> HealthStatus {
        if value >= self.critical {
            HealthStatus::Unhealthy
        } else if value >= self.warning {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDefinition {
    pub name: String,
    pub metrics: Vec<MetricThresholds>,
}

/// Built-in module definitions, thresholds in milliseconds
pub fn default_modules() -> Vec<ModuleDefinition> {
    let module = |name: &str, metrics: Vec<MetricThresholds>| ModuleDefinition {
        name: name.to_string(),
        metrics,
    };

    vec![
        module(
            "database",
            vec![MetricThresholds::new("db.query.latency", 200.0, 1000.0)],
        ),
        module(
            "cache",
            vec![MetricThresholds::new("cache.operation.latency", 50.0, 250.0)],
        ),
        module(
            "llm",
            vec![MetricThresholds::new("llm.request.latency", 10_000.0, 30_000.0)],
        ),
        module(
            "queue",
            vec![
                MetricThresholds::new("queue.job.duration", 30_000.0, 120_000.0),
                MetricThresholds::new("queue.depth", 100.0, 1000.0),
            ],
        ),
        module(
            "whatsapp",
            vec![MetricThresholds::new("whatsapp.send.latency", 2000.0, 10_000.0)],
        ),
        module(
            "api",
            vec![MetricThresholds::new("http.request.duration", 500.0, 2000.0)],
        ),
    ]
}

/// Probe-derived health of the whole system
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub deep: bool,
    pub probes: Vec<ProbeResult>,
    pub process: ProcessStats,
    pub checked_at: DateTime<Utc>,
}

/// Reduce probe results: all pass is healthy, none pass is unhealthy
pub fn summarize_probes(results: &[ProbeResult]) -> HealthStatus {
    let passing = results.iter().filter(|r| r.healthy).count();
    if passing == results.len() {
        HealthStatus::Healthy
    } else if passing == 0 {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Degraded
    }
}

pub struct HealthAggregator {
    collector: Arc<MetricCollector>,
    storage: Arc<TimeSeriesStorage>,
    probes: Arc<ProbeRegistry>,
    modules: Vec<ModuleDefinition>,
    process: ProcessSampler,
}

impl HealthAggregator {
    pub fn new(
        collector: Arc<MetricCollector>,
        storage: Arc<TimeSeriesStorage>,
        probes: Arc<ProbeRegistry>,
        modules: Vec<ModuleDefinition>,
    ) -> Self {
        Self {
            collector,
            storage,
            probes,
            modules,
            process: ProcessSampler::new(),
        }
    }

    pub fn modules(&self) -> &[ModuleDefinition] {
        &self.modules
    }

    /// Worst value of `metric` across its label series. Histograms
    /// contribute their p95, counters and gauges their current value.
    /// Unseen metrics read as zero.
    fn metric_value(&self, metric: &str) -> f64 {
        let histograms = self.collector.histogram_series(metric);
        if !histograms.is_empty() {
            return histograms
                .iter()
                .map(|(_, h)| h.p95)
                .fold(0.0, f64::max);
        }

        self.collector
            .counter_series(metric)
            .into_iter()
            .chain(self.collector.gauge_series(metric))
            .map(|(_, value)| value)
            .fold(0.0, f64::max)
    }

    fn evaluate(&self, definition: &ModuleDefinition) -> (HealthStatus, BTreeMap<String, MetricReading>) {
        let mut status = HealthStatus::Healthy;
        let mut readings = BTreeMap::new();

        for thresholds in &definition.metrics {
            let value = self.metric_value(&thresholds.metric);
            let metric_status = thresholds.classify(value);
            status = status.worst(metric_status);
            readings.insert(
                thresholds.metric.clone(),
                MetricReading {
                    value,
                    status: metric_status,
                },
            );
        }

        (status, readings)
    }

    /// Health of one module, `None` for unknown module names
    #[instrument(skip(self))]
    pub async fn get_module_health(&self, module: &str) -> Option<ModuleHealth> {
        let definition = self.modules.iter().find(|m| m.name == module)?;
        let (mut status, metrics) = self.evaluate(definition);

        let error_summaries = self.storage.get_errors(module).await.unwrap_or_else(|e| {
            warn!("error summaries unavailable for {module}: {e}");
            Vec::new()
        });
        let error_count: u64 = error_summaries.iter().map(|s| s.count).sum();

        if error_count > ERROR_UNHEALTHY_THRESHOLD {
            status = HealthStatus::Unhealthy;
        } else if error_count > 0 && status == HealthStatus::Healthy {
            status = HealthStatus::Degraded;
        }

        Some(ModuleHealth {
            name: definition.name.clone(),
            status,
            metrics,
            error_summaries,
            last_updated: Utc::now(),
        })
    }

    pub async fn get_all_module_health(&self) -> BTreeMap<String, ModuleHealth> {
        let mut all = BTreeMap::new();
        for definition in &self.modules {
            if let Some(health) = self.get_module_health(&definition.name).await {
                all.insert(definition.name.clone(), health);
            }
        }
        all
    }

    pub fn process_stats(&self) -> ProcessStats {
        self.process.sample()
    }

    /// Health derived from already collected probe results
    pub fn system_health_from(&self, probes: Vec<ProbeResult>, deep: bool) -> SystemHealth {
        SystemHealth {
            status: summarize_probes(&probes),
            deep,
            probes,
            process: self.process_stats(),
            checked_at: Utc::now(),
        }
    }

    pub async fn get_system_health(&self) -> SystemHealth {
        let probes = self.probes.run_probes(false).await;
        self.system_health_from(probes, false)
    }

    pub async fn get_deep_health(&self) -> SystemHealth {
        let probes = self.probes.run_probes(true).await;
        self.system_health_from(probes, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregator(collector: Arc<MetricCollector>, storage: Arc<TimeSeriesStorage>) -> HealthAggregator {
        HealthAggregator::new(
            collector,
            storage,
            Arc::new(ProbeRegistry::new()),
            default_modules(),
        )
    }

    fn probe(healthy: bool) -> ProbeResult {
        if healthy {
            ProbeResult::healthy("p", false, 1.0)
        } else {
            ProbeResult::unhealthy("p", false, 1.0, "down")
        }
    }

    #[test]
    fn test_thresholds_classify() {
        let t = MetricThresholds::new("x", 100.0, 500.0);
        assert_eq!(t.classify(99.0), HealthStatus::Healthy);
        assert_eq!(t.classify(100.0), HealthStatus::Degraded);
        assert_eq!(t.classify(500.0), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_summarize_probes() {
        assert_eq!(summarize_probes(&[]), HealthStatus::Healthy);
        assert_eq!(summarize_probes(&[probe(true), probe(true)]), HealthStatus::Healthy);
        assert_eq!(summarize_probes(&[probe(true), probe(false)]), HealthStatus::Degraded);
        assert_eq!(summarize_probes(&[probe(false), probe(false)]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_module_uses_worst_p95() {
        let collector = Arc::new(MetricCollector::new());
        collector.observe_histogram("db.query.latency", 10.0, &[("op", "read")]);
        collector.observe_histogram("db.query.latency", 300.0, &[("op", "write")]);

        let aggregator = aggregator(collector, Arc::new(TimeSeriesStorage::in_memory()));
        let health = aggregator.get_module_health("database").await.unwrap();

        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.metrics["db.query.latency"].value, 300.0);
    }

    #[tokio::test]
    async fn test_labeled_gauges_count_towards_module_health() {
        let collector = Arc::new(MetricCollector::new());
        collector.set_gauge("queue.depth", 12.0, &[("queue", "email")]);
        collector.set_gauge("queue.depth", 1500.0, &[("queue", "whatsapp")]);

        let aggregator = aggregator(collector, Arc::new(TimeSeriesStorage::in_memory()));
        let health = aggregator.get_module_health("queue").await.unwrap();

        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.metrics["queue.depth"].value, 1500.0);
    }

    #[tokio::test]
    async fn test_errors_escalate_status() {
        let storage = Arc::new(TimeSeriesStorage::in_memory());
        let aggregator = aggregator(Arc::new(MetricCollector::new()), storage.clone());

        storage.record_error("cache", "timeout", "slow").await.unwrap();
        let health = aggregator.get_module_health("cache").await.unwrap();
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.error_summaries.len(), 1);

        for _ in 0..10 {
            storage.record_error("cache", "timeout", "slow").await.unwrap();
        }
        let health = aggregator.get_module_health("cache").await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_unknown_module_is_none() {
        let aggregator = aggregator(
            Arc::new(MetricCollector::new()),
            Arc::new(TimeSeriesStorage::in_memory()),
        );
        assert!(aggregator.get_module_health("nope").await.is_none());
        assert_eq!(aggregator.get_all_module_health().await.len(), 6);
    }
}
