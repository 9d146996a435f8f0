use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Length of one measurement window.
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Lock-free published frame rate.
///
/// Stores the bit pattern of an `f64`, so readers always see either the
/// previous or the new value, never a torn one.
#[derive(Debug, Clone, Default)]
pub struct FpsGauge {
    bits: Arc<AtomicU64>,
}

impl FpsGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, fps: f64) {
        self.bits.store(fps.to_bits(), Ordering::Release);
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }
}

/// Rolling one-second frame counter, mutated only by the capture worker.
#[derive(Debug)]
pub struct FpsWindow {
    frame_count: u64,
    window_start: Option<Instant>,
    last_fps: f64,
    gauge: FpsGauge,
}

impl FpsWindow {
    pub fn new(gauge: FpsGauge) -> Self {
        Self {
            frame_count: 0,
            window_start: None,
            last_fps: 0.0,
            gauge,
        }
    }

    /// Count a frame arriving now.
    pub fn observe(&mut self) -> Option<f64> {
        self.observe_at(Instant::now())
    }

    /// Count a frame arriving at `now`.
    ///
    /// The first frame only opens the window. Once the window has
    /// accumulated at least one second, computes `frames * 1000 / elapsed_ms`,
    /// publishes it, and starts a new window at `now`.
    pub fn observe_at(&mut self, now: Instant) -> Option<f64> {
        let Some(start) = self.window_start else {
            self.window_start = Some(now);
            return None;
        };
        self.frame_count += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed < FPS_WINDOW {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let fps = self.frame_count as f64 * 1000.0 / elapsed_ms;
        self.frame_count = 0;
        self.window_start = Some(now);
        self.last_fps = fps;
        self.gauge.publish(fps);
        Some(fps)
    }

    pub fn last_fps(&self) -> f64 {
        self.last_fps
    }

    pub fn gauge(&self) -> &FpsGauge {
        &self.gauge
    }
}
