//! Counters and latency statistics for the scoring service.

use crate::error::ErrorKind;
use crate::types::prediction::ScoringResponse;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Maximum latency samples retained
const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector for the scoring service
pub struct PipelineMetrics {
    /// Transactions that produced a prediction
    pub transactions_scored: AtomicU64,
    /// Predictions at or above the threshold
    pub fraud_flagged: AtomicU64,
    /// Failed requests by error kind
    errors_by_kind: RwLock<HashMap<ErrorKind, u64>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Fraud probability distribution buckets
    probability_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            transactions_scored: AtomicU64::new(0),
            fraud_flagged: AtomicU64::new(0),
            errors_by_kind: RwLock::new(HashMap::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record the outcome of one request
    pub fn record_response(&self, response: &ScoringResponse, processing_time: Duration) {
        match response {
            ScoringResponse::Ok {
                probability,
                is_fraud,
                ..
            } => self.record_prediction(processing_time, *probability, *is_fraud),
            ScoringResponse::Error { kind, .. } => self.record_error(*kind),
        }
    }

    /// Record a successful prediction
    pub fn record_prediction(&self, processing_time: Duration, probability: f64, is_fraud: bool) {
        self.transactions_scored.fetch_add(1, Ordering::Relaxed);
        if is_fraud {
            self.fraud_flagged.fetch_add(1, Ordering::Relaxed);
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }

        let bucket = (probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record a failed request
    pub fn record_error(&self, kind: ErrorKind) {
        if let Ok(mut errors) = self.errors_by_kind.write() {
            *errors.entry(kind).or_insert(0) += 1;
        }
    }

    pub fn error_count(&self, kind: ErrorKind) -> u64 {
        self.errors_by_kind
            .read()
            .map(|e| e.get(&kind).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[(count as f64 * 0.95) as usize],
            p99_us: sorted[(count as f64 * 0.99) as usize],
            max_us: sorted[count - 1],
        }
    }

    /// Transactions scored per second since start
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.transactions_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or([0; 10])
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let scored = self.transactions_scored.load(Ordering::Relaxed);
        let flagged = self.fraud_flagged.load(Ordering::Relaxed);
        let fraud_rate = if scored > 0 {
            (flagged as f64 / scored as f64) * 100.0
        } else {
            0.0
        };
        let processing = self.get_processing_stats();

        info!(
            scored,
            flagged,
            fraud_rate = format!("{:.1}%", fraud_rate),
            throughput = format!("{:.1} tx/s", self.get_throughput()),
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Scoring summary"
        );

        if let Ok(errors) = self.errors_by_kind.read() {
            for (kind, count) in errors.iter() {
                info!(kind = kind.as_str(), count, "Errors");
            }
        }

        let dist = self.get_probability_distribution();
        let total: u64 = dist.iter().sum();
        if total > 0 {
            for (i, &count) in dist.iter().enumerate() {
                let pct = (count as f64 / total as f64) * 100.0;
                info!(
                    "  p {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    "#".repeat(((pct / 5.0) as usize).min(20))
                );
            }
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Prints a summary on a fixed interval
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
