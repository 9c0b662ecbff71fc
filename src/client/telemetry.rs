//! Operation samples and cluster-level latency metrics

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::client::Operation;
use crate::clock::{Clock, elapsed_between};

/// Window the calculated metrics look back over
pub const METRICS_WINDOW: Duration = Duration::from_secs(60);

/// One finished orchestrator call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sample {
    pub at: DateTime<Utc>,
    pub duration: Duration,
    pub success: bool,
    pub operation: Operation,
}

/// Bounded, time-ordered sample store
///
/// Oldest samples fall out when the buffer is full or older than the
/// retention. Recent-window queries walk from the newest end and stop at the
/// first sample outside the window.
#[derive(Debug)]
pub struct SampleBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
    retention: Duration,
}

impl SampleBuffer {
    pub fn new(capacity: usize, retention: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            retention,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Drop samples older than the retention
    pub fn prune(&mut self, now: DateTime<Utc>) {
        while self
            .samples
            .front()
            .is_some_and(|s| elapsed_between(s.at, now) > self.retention)
        {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples taken within `window` before `now`, newest first
    pub fn recent(&self, now: DateTime<Utc>, window: Duration) -> impl Iterator<Item = &Sample> {
        self.samples
            .iter()
            .rev()
            .take_while(move |s| elapsed_between(s.at, now) <= window)
    }

    pub fn metrics(&self, now: DateTime<Utc>, window: Duration) -> ClusterMetrics {
        let mut durations = Vec::new();
        let mut successes = 0usize;
        for sample in self.recent(now, window) {
            durations.push(sample.duration);
            if sample.success {
                successes += 1;
            }
        }

        let total = durations.len();
        if total == 0 {
            return ClusterMetrics {
                computed_at: Some(now),
                ..ClusterMetrics::default()
            };
        }

        durations.sort_unstable();
        let window_secs = window.as_secs_f64().max(1.0);
        ClusterMetrics {
            p50: percentile(&durations, 0.50),
            p95: percentile(&durations, 0.95),
            p99: percentile(&durations, 0.99),
            error_rate: 1.0 - successes as f64 / total as f64,
            throughput: total as f64 / window_secs,
            sample_count: total,
            computed_at: Some(now),
        }
    }
}

/// Nearest-rank percentile of sorted durations
fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Latency and error picture of the last minute
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClusterMetrics {
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    /// `1 - successes / total`
    pub error_rate: f64,
    /// Requests per second
    pub throughput: f64,
    pub sample_count: usize,
    pub computed_at: Option<DateTime<Utc>>,
}

/// Drains samples into a buffer and publishes fresh metrics on every tick
pub struct MetricsCalculator {
    pub buffer: SampleBuffer,
    pub samples: mpsc::Receiver<Sample>,
    pub output: watch::Sender<ClusterMetrics>,
    pub interval: Duration,
    pub clock: Arc<dyn Clock>,
}

impl MetricsCalculator {
    pub fn recalculate(&mut self) -> ClusterMetrics {
        let now = self.clock.now();
        self.buffer.prune(now);
        let metrics = self.buffer.metrics(now, METRICS_WINDOW);
        self.output.send_replace(metrics);
        metrics
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                sample = self.samples.recv() => match sample {
                    Some(sample) => self.buffer.push(sample),
                    None => break,
                },
                _ = ticker.tick() => {
                    let metrics = self.recalculate();
                    trace!(
                        samples = metrics.sample_count,
                        p99_ms = metrics.p99.as_millis() as u64,
                        error_rate = metrics.error_rate,
                        "Recalculated cluster metrics"
                    );
                }
            }
        }
        debug!("Cluster metrics calculator stopped");
    }
}
