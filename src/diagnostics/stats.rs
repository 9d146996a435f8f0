use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::diagnostics::fps::FpsGauge;

/// Counters for one pipeline run.
///
/// Written by the capture worker, read by the control surface and the relay
/// without locking.
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    frames_observed: AtomicU64,
    frames_processed: AtomicU64,
    frames_dropped: AtomicU64,
    conversion_failures: AtomicU64,
    filter_failures: AtomicU64,
    processing_us: AtomicU64,
    fps: FpsGauge,
}

/// Snapshot of pipeline stats for serialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub fps: f64,
    pub frames_observed: u64,
    pub frames_processed: u64,
    pub frames_dropped: u64,
    pub drop_rate: f64,
    pub conversion_failures: u64,
    pub filter_failures: u64,
    pub processing_time_ms: f64,
    pub uptime_secs: f64,
}

impl PipelineStats {
    /// Create new stats with zeroed counters, publishing fps through `fps`.
    pub fn new(fps: FpsGauge) -> Self {
        Self {
            started: Instant::now(),
            frames_observed: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            conversion_failures: AtomicU64::new(0),
            filter_failures: AtomicU64::new(0),
            processing_us: AtomicU64::new(0),
            fps,
        }
    }

    /// Record a frame taken by the capture worker.
    pub fn record_frame(&self) {
        self.frames_observed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that made it through conversion and filtering.
    pub fn record_processed(&self, elapsed: Duration) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.processing_us
            .store(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record a frame superseded before anyone consumed it.
    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conversion_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filter_failure(&self) {
        self.filter_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fps_gauge(&self) -> &FpsGauge {
        &self.fps
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames_observed.load(Ordering::Relaxed)
    }

    /// Processing time of the most recent frame in milliseconds.
    pub fn processing_time_ms(&self) -> f64 {
        self.processing_us.load(Ordering::Relaxed) as f64 / 1000.0
    }

    /// Drop rate as a percentage (0.0 - 100.0).
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.frames_dropped.load(Ordering::Relaxed);
        let total = self.frames_observed.load(Ordering::Relaxed) + dropped;
        if total == 0 {
            return 0.0;
        }
        (dropped as f64 / total as f64) * 100.0
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> DiagnosticSnapshot {
        DiagnosticSnapshot {
            fps: self.fps.load(),
            frames_observed: self.frames_observed.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            drop_rate: self.drop_rate(),
            conversion_failures: self.conversion_failures.load(Ordering::Relaxed),
            filter_failures: self.filter_failures.load(Ordering::Relaxed),
            processing_time_ms: self.processing_time_ms(),
            uptime_secs: self.started.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new(FpsGauge::new())
    }
}
