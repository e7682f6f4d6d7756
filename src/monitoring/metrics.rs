//! Performance Metrics
//!
//! Latency and throughput tracking for serving operations. The rolling
//! window and histogram live under one lock; counters are atomics.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Histogram bucket for latency distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// Upper bound of this bucket (in milliseconds)
    pub le: f64,
    pub count: u64,
}

const BUCKET_BOUNDS_MS: [f64; 10] = [1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, f64::INFINITY];

struct MetricsInner {
    latencies: VecDeque<f64>,
    histogram: Vec<HistogramBucket>,
    /// (timestamp, items) per recorded call, last 100 kept
    throughput_samples: VecDeque<(Instant, u64)>,
}

/// Performance metrics collector shared by every engine operation
pub struct PerformanceMetrics {
    window_size: usize,
    inner: RwLock<MetricsInner>,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    total_items: AtomicU64,
    start_time: Instant,
}

impl std::fmt::Debug for PerformanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMetrics")
            .field("window_size", &self.window_size)
            .field("total_requests", &self.total_requests())
            .field("total_errors", &self.total_errors())
            .finish()
    }
}

impl PerformanceMetrics {
    /// Create a collector keeping the last `window_size` latencies
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size: window_size.max(1),
            inner: RwLock::new(MetricsInner {
                latencies: VecDeque::with_capacity(window_size.min(10_000)),
                histogram: BUCKET_BOUNDS_MS
                    .iter()
                    .map(|&le| HistogramBucket { le, count: 0 })
                    .collect(),
                throughput_samples: VecDeque::with_capacity(100),
            }),
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            total_items: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a completed request and the number of records it processed
    pub fn record_request(&self, latency_ms: f64, items: u64) {
        let mut inner = self.inner.write();
        inner.latencies.push_back(latency_ms);
        if inner.latencies.len() > self.window_size {
            inner.latencies.pop_front();
        }
        if let Some(bucket) = inner.histogram.iter_mut().find(|b| latency_ms <= b.le) {
            bucket.count += 1;
        }
        inner.throughput_samples.push_back((Instant::now(), items));
        while inner.throughput_samples.len() > 100 {
            inner.throughput_samples.pop_front();
        }
        drop(inner);

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_items.fetch_add(items, Ordering::Relaxed);
    }

    /// Record a failed request
    pub fn record_error(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency(&self) -> f64 {
        let inner = self.inner.read();
        if inner.latencies.is_empty() {
            0.0
        } else {
            inner.latencies.iter().sum::<f64>() / inner.latencies.len() as f64
        }
    }

    /// Percentile latency over the window, by quickselect
    pub fn percentile_latency(&self, percentile: f64) -> f64 {
        let mut data: Vec<f64> = self.inner.read().latencies.iter().copied().collect();
        if data.is_empty() {
            return 0.0;
        }
        let idx = ((percentile / 100.0) * (data.len() - 1) as f64) as usize;
        let idx = idx.min(data.len() - 1);
        data.select_nth_unstable_by(idx, |a, b| {
            a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
        });
        data[idx]
    }

    pub fn p50_latency(&self) -> f64 {
        self.percentile_latency(50.0)
    }

    pub fn p95_latency(&self) -> f64 {
        self.percentile_latency(95.0)
    }

    pub fn p99_latency(&self) -> f64 {
        self.percentile_latency(99.0)
    }

    /// Records processed per second across the recent samples
    pub fn throughput(&self) -> f64 {
        let inner = self.inner.read();
        let (Some(first), Some(last)) = (inner.throughput_samples.front(), inner.throughput_samples.back()) else {
            return 0.0;
        };
        let duration = last.0.duration_since(first.0).as_secs_f64();
        if inner.throughput_samples.len() < 2 || duration <= 0.0 {
            return 0.0;
        }
        let items: u64 = inner.throughput_samples.iter().map(|(_, c)| c).sum();
        items as f64 / duration
    }

    pub fn error_rate(&self) -> f64 {
        let requests = self.total_requests();
        if requests == 0 {
            0.0
        } else {
            self.total_errors() as f64 / requests as f64
        }
    }

    pub fn histogram(&self) -> Vec<HistogramBucket> {
        self.inner.read().histogram.clone()
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn total_items(&self) -> u64 {
        self.total_items.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Reset all metrics
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.latencies.clear();
        for bucket in inner.histogram.iter_mut() {
            bucket.count = 0;
        }
        inner.throughput_samples.clear();
        drop(inner);

        self.total_requests.store(0, Ordering::Relaxed);
        self.total_errors.store(0, Ordering::Relaxed);
        self.total_items.store(0, Ordering::Relaxed);
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new(10_000)
    }
}
