//! Bounded histogram with percentile computation
//!
//! Raw samples live in a fixed-capacity ring buffer: the arena grows until it
//! reaches capacity, after which each new sample overwrites the oldest one.
//! Summary statistics and percentiles are recomputed from a sorted copy of the
//! retained samples on every read.
//!
//! Bucket counts are cumulative and maintained at write time: each bucket
//! counts every sample `<=` its boundary.

use serde::{Deserialize, Serialize};

/// Maximum number of raw samples retained per series
pub const SAMPLE_CAPACITY: usize = 10_000;

/// Global bucket boundaries in milliseconds
pub const BUCKET_BOUNDARIES: [f64; 11] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

#[derive(Debug, Clone)]
pub struct Histogram {
    samples: Vec<f64>,
    /// Slot of the oldest sample once the arena is full
    next: usize,
    capacity: usize,
    buckets: [u64; BUCKET_BOUNDARIES.len()],
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_capacity(SAMPLE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity.min(1024)),
            next: 0,
            capacity,
            buckets: [0; BUCKET_BOUNDARIES.len()],
        }
    }

    /// Record one sample. Non-finite values are ignored.
    pub fn observe(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }

        if self.samples.len() < self.capacity {
            self.samples.push(value);
        } else {
            self.samples[self.next] = value;
            self.next = (self.next + 1) % self.capacity;
        }

        for (count, boundary) in self.buckets.iter_mut().zip(BUCKET_BOUNDARIES) {
            if value <= boundary {
                *count += 1;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Retained samples, oldest first
    pub fn samples(&self) -> Vec<f64> {
        let mut ordered = Vec::with_capacity(self.samples.len());
        ordered.extend_from_slice(&self.samples[self.next..]);
        ordered.extend_from_slice(&self.samples[..self.next]);
        ordered
    }

    pub fn snapshot(&self) -> HistogramSnapshot {
        HistogramSnapshot::from_samples(self.samples.clone(), &self.buckets)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Cumulative count for one bucket boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketCount {
    pub le: f64,
    pub count: u64,
}

/// Point-in-time view of a histogram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub bucket_counts: Vec<BucketCount>,
}

impl HistogramSnapshot {
    /// All-zero snapshot, returned for series that were never observed
    pub fn empty() -> Self {
        Self::from_samples(Vec::new(), &[0; BUCKET_BOUNDARIES.len()])
    }

    fn from_samples(mut samples: Vec<f64>, buckets: &[u64; BUCKET_BOUNDARIES.len()]) -> Self {
        let bucket_counts = BUCKET_BOUNDARIES
            .iter()
            .zip(buckets)
            .map(|(le, count)| BucketCount {
                le: *le,
                count: *count,
            })
            .collect();

        if samples.is_empty() {
            return Self {
                count: 0,
                sum: 0.0,
                min: 0.0,
                max: 0.0,
                avg: 0.0,
                p50: 0.0,
                p90: 0.0,
                p95: 0.0,
                p99: 0.0,
                bucket_counts,
            };
        }

        samples.sort_by(f64::total_cmp);

        let count = samples.len();
        let sum: f64 = samples.iter().sum();
        let min = samples[0];
        let max = samples[count - 1];
        // float summation can land a hair outside [min, max]
        let avg = (sum / count as f64).clamp(min, max);

        Self {
            count: count as u64,
            sum,
            min,
            max,
            avg,
            p50: percentile(&samples, 50.0),
            p90: percentile(&samples, 90.0),
            p95: percentile(&samples, 95.0),
            p99: percentile(&samples, 99.0),
            bucket_counts,
        }
    }
}

/// Nearest-rank percentile over an ascending slice
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
    let index = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[index]
}
