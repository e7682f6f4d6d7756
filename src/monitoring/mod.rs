//! Monitoring Module
//!
//! Per-engine latency, throughput and error tracking.

mod metrics;

pub use metrics::{HistogramBucket, PerformanceMetrics};
