//! In-process metric collection
//!
//! The [`MetricCollector`] keeps counters, gauges and histograms keyed by
//! `(name, labels)`. Every recording operation is a total function: it never
//! fails and never blocks on I/O, so instrumentation can be sprinkled through
//! request handlers freely.
//!
//! ## Concurrency
//!
//! Series live in sharded maps. An increment or observation holds the write
//! guard of a single entry, so it is indivisible with respect to other writers
//! of the same series. Percentile reads clone the live sample buffer under the
//! guard and sort the copy after releasing it.

pub mod histogram;
pub mod labels;

use std::collections::BTreeMap;
use std::time::Instant;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use histogram::{BucketCount, Histogram, HistogramSnapshot};
pub use labels::{DEFAULT_LABEL_KEY, Labels, SeriesKey};

/// A single metric value, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metric {
    Counter { value: f64 },
    Gauge { value: f64 },
    Histogram(HistogramSnapshot),
}

impl Metric {
    /// Scalar used for threshold comparisons.
    ///
    /// Counters and gauges expose their value, histograms their p95.
    pub fn scalar(&self) -> f64 {
        match self {
            Metric::Counter { value } | Metric::Gauge { value } => *value,
            Metric::Histogram(snapshot) => snapshot.p95,
        }
    }
}

/// One series in an exported snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricEntry {
    pub labels: Labels,
    #[serde(flatten)]
    pub metric: Metric,
}

/// Exported view of every series, grouped by metric name
pub type MetricsSnapshotMap = BTreeMap<String, Vec<MetricEntry>>;

#[derive(Debug, Clone)]
struct Series<T> {
    labels: Labels,
    value: T,
}

impl<T> Series<T> {
    fn new(labels: &[(&str, &str)], value: T) -> Self {
        Self {
            labels: labels::to_labels(labels),
            value,
        }
    }
}

/// Label-keyed store of counters, gauges and histograms
#[derive(Debug, Default)]
pub struct MetricCollector {
    counters: DashMap<SeriesKey, Series<f64>>,
    gauges: DashMap<SeriesKey, Series<f64>>,
    histograms: DashMap<SeriesKey, Series<Histogram>>,
}

impl MetricCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to a counter. Negative or non-finite deltas are ignored so
    /// counters stay non-decreasing until [`MetricCollector::reset`].
    pub fn inc_counter(&self, name: &str, delta: f64, labels: &[(&str, &str)]) {
        if !delta.is_finite() || delta < 0.0 {
            trace!("ignoring counter delta {delta} for {name}");
            return;
        }

        self.counters
            .entry(SeriesKey::new(name, labels))
            .or_insert_with(|| Series::new(labels, 0.0))
            .value += delta;
    }

    pub fn set_gauge(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        if !value.is_finite() {
            return;
        }

        self.gauges
            .entry(SeriesKey::new(name, labels))
            .or_insert_with(|| Series::new(labels, 0.0))
            .value = value;
    }

    pub fn inc_gauge(&self, name: &str, delta: f64, labels: &[(&str, &str)]) {
        if !delta.is_finite() {
            return;
        }

        self.gauges
            .entry(SeriesKey::new(name, labels))
            .or_insert_with(|| Series::new(labels, 0.0))
            .value += delta;
    }

    pub fn dec_gauge(&self, name: &str, delta: f64, labels: &[(&str, &str)]) {
        self.inc_gauge(name, -delta, labels);
    }

    pub fn observe_histogram(&self, name: &str, value: f64, labels: &[(&str, &str)]) {
        self.histograms
            .entry(SeriesKey::new(name, labels))
            .or_insert_with(|| Series::new(labels, Histogram::new()))
            .value
            .observe(value);
    }

    pub fn get_counter(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.counters
            .get(&SeriesKey::new(name, labels))
            .map(|series| series.value)
            .unwrap_or(0.0)
    }

    pub fn get_gauge(&self, name: &str, labels: &[(&str, &str)]) -> f64 {
        self.gauges
            .get(&SeriesKey::new(name, labels))
            .map(|series| series.value)
            .unwrap_or(0.0)
    }

    /// Summary of a histogram; all zeros when the series was never observed
    pub fn get_histogram(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSnapshot {
        let copy = self
            .histograms
            .get(&SeriesKey::new(name, labels))
            .map(|series| series.value.clone());

        copy.map(|histogram| histogram.snapshot())
            .unwrap_or_else(HistogramSnapshot::empty)
    }

    /// Every label combination recorded for a counter name
    pub fn counter_series(&self, name: &str) -> Vec<(Labels, f64)> {
        scalar_series(&self.counters, name)
    }

    /// Every label combination recorded for a gauge name
    pub fn gauge_series(&self, name: &str) -> Vec<(Labels, f64)> {
        scalar_series(&self.gauges, name)
    }

    /// Every label combination recorded for a histogram name
    pub fn histogram_series(&self, name: &str) -> Vec<(Labels, HistogramSnapshot)> {
        let copies: Vec<(Labels, Histogram)> = self
            .histograms
            .iter()
            .filter(|entry| entry.key().name == name)
            .map(|entry| (entry.labels.clone(), entry.value.clone()))
            .collect();

        copies
            .into_iter()
            .map(|(labels, histogram)| (labels, histogram.snapshot()))
            .collect()
    }

    /// Start timing an operation. The elapsed milliseconds are recorded into
    /// the `name` histogram when [`Timer::stop`] is called.
    pub fn start_timer<'a>(&'a self, name: &str, labels: &[(&str, &str)]) -> Timer<'a> {
        Timer {
            collector: self,
            name: name.to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
        }
    }

    /// Export every series, one entry per label combination.
    ///
    /// Entries are ordered by label set, so an unlabeled series comes first.
    pub fn get_snapshot(&self) -> MetricsSnapshotMap {
        let mut snapshot: MetricsSnapshotMap = BTreeMap::new();

        for entry in self.counters.iter() {
            snapshot
                .entry(entry.key().name.clone())
                .or_default()
                .push(MetricEntry {
                    labels: entry.labels.clone(),
                    metric: Metric::Counter { value: entry.value },
                });
        }

        for entry in self.gauges.iter() {
            snapshot
                .entry(entry.key().name.clone())
                .or_default()
                .push(MetricEntry {
                    labels: entry.labels.clone(),
                    metric: Metric::Gauge { value: entry.value },
                });
        }

        let histograms: Vec<(String, Labels, Histogram)> = self
            .histograms
            .iter()
            .map(|entry| {
                (
                    entry.key().name.clone(),
                    entry.labels.clone(),
                    entry.value.clone(),
                )
            })
            .collect();

        for (name, labels, histogram) in histograms {
            snapshot.entry(name).or_default().push(MetricEntry {
                labels,
                metric: Metric::Histogram(histogram.snapshot()),
            });
        }

        for entries in snapshot.values_mut() {
            entries.sort_by(|a, b| a.labels.cmp(&b.labels));
        }

        snapshot
    }

    /// Drop every series
    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.histograms.clear();
    }
}

/// Running timer bound to a histogram series.
///
/// `stop` consumes the timer, so a measurement is recorded at most once.
/// Dropping a timer without stopping it records nothing.
#[derive(Debug)]
#[must_use = "a timer records nothing unless stopped"]
pub struct Timer<'a> {
    collector: &'a MetricCollector,
    name: String,
    labels: Vec<(String, String)>,
    started: Instant,
}

impl Timer<'_> {
    /// Record the elapsed time and return it in milliseconds
    pub fn stop(self) -> f64 {
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let labels: Vec<(&str, &str)> = self
            .labels
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.collector
            .observe_histogram(&self.name, elapsed_ms, &labels);
        elapsed_ms
    }
}

fn scalar_series(map: &DashMap<SeriesKey, Series<f64>>, name: &str) -> Vec<(Labels, f64)> {
    map.iter()
        .filter(|entry| entry.key().name == name)
        .map(|entry| (entry.labels.clone(), entry.value))
        .collect()
}
