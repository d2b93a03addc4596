//! Internal metrics collection.
//!
//! Counters and latency histograms kept in-memory; a snapshot is served
//! as JSON by the operational HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Histogram for latency tracking.
#[derive(Debug)]
pub struct Histogram {
    /// Buckets: 1ms, 5ms, 10ms, 25ms, 50ms, 100ms, 250ms, 500ms, 1s, 5s, 10s
    buckets: [AtomicU64; 11],
    sum: AtomicU64,
    count: AtomicU64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    const BUCKET_BOUNDS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 5000, 10000];

    pub fn new() -> Self {
        Self {
            buckets: Default::default(),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    /// Records a value in milliseconds.
    pub fn observe(&self, ms: u64) {
        self.sum.fetch_add(ms, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        let idx = Self::BUCKET_BOUNDS
            .iter()
            .position(|&bound| ms <= bound)
            .unwrap_or(Self::BUCKET_BOUNDS.len() - 1);
        self.buckets[idx].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }

    pub fn mean(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            0.0
        } else {
            self.sum() as f64 / count as f64
        }
    }

    /// Returns bucket counts.
    pub fn buckets(&self) -> Vec<(u64, u64)> {
        Self::BUCKET_BOUNDS
            .iter()
            .zip(self.buckets.iter())
            .map(|(&bound, count)| (bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingest loop
    pub pages_fetched: Counter,
    pub empty_polls: Counter,
    pub fetch_errors: Counter,
    pub records_published: Counter,
    pub publish_errors: Counter,
    pub translation_failures: Counter,
    pub checkpoint_commits: Counter,

    // Stream side
    pub records_consumed: Counter,
    pub deserialize_errors: Counter,
    pub duplicates_dropped: Counter,
    pub records_filtered: Counter,
    pub windows_completed: Counter,
    pub rows_written: Counter,
    pub sink_retries: Counter,
    pub sink_failures: Counter,

    // Latency histograms
    pub fetch_latency_ms: Histogram,
    pub publish_latency_ms: Histogram,
    pub sink_latency_ms: Histogram,

    // Gauges
    pub ingest_offset: Gauge,
    pub stream_offset: Gauge,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub pages_fetched: u64,
    pub empty_polls: u64,
    pub fetch_errors: u64,
    pub records_published: u64,
    pub publish_errors: u64,
    pub translation_failures: u64,
    pub checkpoint_commits: u64,
    pub records_consumed: u64,
    pub deserialize_errors: u64,
    pub duplicates_dropped: u64,
    pub records_filtered: u64,
    pub windows_completed: u64,
    pub rows_written: u64,
    pub sink_retries: u64,
    pub sink_failures: u64,
    pub fetch_latency_mean_ms: f64,
    pub publish_latency_mean_ms: f64,
    pub sink_latency_mean_ms: f64,
    pub ingest_offset: u64,
    pub stream_offset: u64,
}

impl Metrics {
    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            timestamp: Utc::now(),
            pages_fetched: self.pages_fetched.get(),
            empty_polls: self.empty_polls.get(),
            fetch_errors: self.fetch_errors.get(),
            records_published: self.records_published.get(),
            publish_errors: self.publish_errors.get(),
            translation_failures: self.translation_failures.get(),
            checkpoint_commits: self.checkpoint_commits.get(),
            records_consumed: self.records_consumed.get(),
            deserialize_errors: self.deserialize_errors.get(),
            duplicates_dropped: self.duplicates_dropped.get(),
            records_filtered: self.records_filtered.get(),
            windows_completed: self.windows_completed.get(),
            rows_written: self.rows_written.get(),
            sink_retries: self.sink_retries.get(),
            sink_failures: self.sink_failures.get(),
            fetch_latency_mean_ms: self.fetch_latency_ms.mean(),
            publish_latency_mean_ms: self.publish_latency_ms.mean(),
            sink_latency_mean_ms: self.sink_latency_ms.mean(),
            ingest_offset: self.ingest_offset.get(),
            stream_offset: self.stream_offset.get(),
        }
    }
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
