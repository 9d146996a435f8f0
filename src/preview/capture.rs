use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::camera::types::{ConvertedFrame, Frame};
use crate::diagnostics::fps::FpsWindow;
use crate::diagnostics::stats::PipelineStats;
use crate::error::{FatalErrorCallback, PipelineError};
use crate::filter::{run_filter, FilterOutcome, FrameFilter};
use crate::preview::convert::convert_frame;
use crate::preview::mailbox::{Mailbox, Posted};

/// How long the worker waits on an empty inbox before rechecking shutdown.
const INBOX_POLL: Duration = Duration::from_millis(100);

/// Latest-wins handoff carrying converted frames out of the capture domain.
pub type FrameOutbox = Arc<Mailbox<Arc<ConvertedFrame>>>;

/// Where processed frames go. The relay outbox is optional.
#[derive(Clone)]
pub struct CaptureOutputs {
    pub render: FrameOutbox,
    pub relay: Option<FrameOutbox>,
}

/// Configuration for the frame watchdog timer.
#[derive(Debug, Clone, Copy)]
pub struct WatchdogConfig {
    /// Maximum time to wait for the worker to set `running = true`.
    pub startup_timeout: Duration,
    /// Time to wait for the first frame after the worker is running.
    pub frame_timeout: Duration,
    /// Poll interval for the watchdog thread.
    pub poll_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            frame_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Converts, filters and hands off one frame at a time.
///
/// Owned by the capture worker; the only writer of the fps window.
pub struct FrameProcessor {
    filter: Arc<dyn FrameFilter>,
    filter_enabled: Arc<AtomicBool>,
    fps: FpsWindow,
    stats: Arc<PipelineStats>,
    outputs: CaptureOutputs,
    processed: u64,
    filter_failing: bool,
}

impl FrameProcessor {
    pub fn new(
        filter: Arc<dyn FrameFilter>,
        filter_enabled: Arc<AtomicBool>,
        stats: Arc<PipelineStats>,
        outputs: CaptureOutputs,
    ) -> Self {
        Self {
            filter,
            filter_enabled,
            fps: FpsWindow::new(stats.fps_gauge().clone()),
            stats,
            outputs,
            processed: 0,
            filter_failing: false,
        }
    }

    /// Run one frame through the stage. The source frame is released before
    /// this returns, on every path.
    pub fn process(&mut self, frame: Frame) {
        self.process_at(frame, Instant::now());
    }

    pub(crate) fn process_at(&mut self, frame: Frame, now: Instant) {
        if let Some(fps) = self.fps.observe_at(now) {
            debug!("capture fps {fps:.1}");
        }
        self.stats.record_frame();

        let started = Instant::now();
        let converted = match convert_frame(&frame) {
            Ok(converted) => converted,
            Err(e) => {
                warn!("skipping frame @{}us: {e}", frame.timestamp_us);
                self.stats.record_conversion_failure();
                frame.release();
                return;
            }
        };
        frame.release();

        let converted = Arc::new(converted);
        let output = if self.filter_enabled.load(Ordering::Relaxed) {
            let outcome = run_filter(self.filter.as_ref(), converted);
            self.note_filter_outcome(&outcome);
            outcome.into_frame()
        } else {
            converted
        };
        self.stats.record_processed(started.elapsed());

        if self.processed < 3 {
            debug!(
                "processed frame {} ({}x{}) in {:?}",
                self.processed,
                output.width,
                output.height,
                started.elapsed()
            );
        }
        self.processed += 1;
        self.publish(output);
    }

    /// Warn once when the filter starts failing, not on every frame.
    fn note_filter_outcome(&mut self, outcome: &FilterOutcome) {
        match outcome {
            FilterOutcome::PassedThrough(frame, error) => {
                self.stats.record_filter_failure();
                if !self.filter_failing {
                    warn!(
                        "filter '{}' failing from frame @{}us, passing frames through: {error}",
                        self.filter.name(),
                        frame.timestamp_us
                    );
                    self.filter_failing = true;
                }
            }
            FilterOutcome::Filtered(_) if self.filter_failing => {
                info!("filter '{}' recovered", self.filter.name());
                self.filter_failing = false;
            }
            FilterOutcome::Filtered(_) => {}
        }
    }

    fn publish(&self, frame: Arc<ConvertedFrame>) {
        if let Some(relay) = &self.outputs.relay {
            if relay.post(Arc::clone(&frame)).is_superseded() {
                trace!("relay had not picked up the previous frame");
            }
        }
        match self.outputs.render.post(frame) {
            Posted::Accepted => {}
            Posted::Superseded(stale) => {
                trace!("frame @{}us superseded before drawing", stale.timestamp_us);
                self.stats.record_drop();
            }
            Posted::Closed(_) => trace!("renderer gone, frame discarded"),
        }
    }

    pub fn last_fps(&self) -> f64 {
        self.fps.last_fps()
    }
}

/// Active capture worker plus its watchdog.
pub struct CaptureSession {
    inbox: Arc<Mailbox<Frame>>,
    running: Arc<AtomicBool>,
    /// Signals the watchdog to exit early during teardown.
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    watchdog: Option<JoinHandle<()>>,
}

impl CaptureSession {
    /// Start the capture worker draining `inbox` through `processor`.
    ///
    /// If `on_error` is provided, the watchdog calls it when no frame
    /// arrives within the configured timeout.
    pub fn spawn(
        inbox: Arc<Mailbox<Frame>>,
        mut processor: FrameProcessor,
        watchdog: WatchdogConfig,
        on_error: Option<FatalErrorCallback>,
    ) -> Result<Self, PipelineError> {
        let running = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread = {
            let inbox = Arc::clone(&inbox);
            let running = Arc::clone(&running);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("capture".to_string())
                .spawn(move || {
                    info!("capture thread starting");
                    running.store(true, Ordering::Relaxed);
                    while !shutdown.load(Ordering::Relaxed) && running.load(Ordering::Relaxed) {
                        match inbox.take_timeout(INBOX_POLL) {
                            Some(frame) => processor.process(frame),
                            None if inbox.is_closed() => break,
                            None => {}
                        }
                    }
                    info!("capture thread exiting");
                })
                .map_err(|e| PipelineError::Spawn {
                    thread: "capture",
                    reason: e.to_string(),
                })?
        };

        let watchdog = {
            let inbox = Arc::clone(&inbox);
            let running = Arc::clone(&running);
            let shutdown = Arc::clone(&shutdown);
            std::thread::Builder::new()
                .name("capture-watchdog".to_string())
                .spawn(move || {
                    run_watchdog_with_config(
                        &inbox,
                        &running,
                        &shutdown,
                        on_error.as_ref(),
                        watchdog,
                    );
                })
                .map_err(|e| PipelineError::Spawn {
                    thread: "capture-watchdog",
                    reason: e.to_string(),
                })
        };

        let mut session = Self {
            inbox,
            running,
            shutdown,
            thread: Some(thread),
            watchdog: None,
        };
        match watchdog {
            Ok(handle) => session.watchdog = Some(handle),
            Err(e) => {
                session.stop();
                return Err(e);
            }
        }
        Ok(session)
    }

    /// Check if the capture worker is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn inbox(&self) -> &Arc<Mailbox<Frame>> {
        &self.inbox
    }

    /// Stop the worker, close the inbox and release any frame still in it.
    /// Idempotent: calling stop twice does not panic.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        if let Some(frame) = self.inbox.close() {
            trace!("releasing undelivered frame @{}us", frame.timestamp_us);
            frame.release();
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                error!("capture thread panicked");
            }
        }
        if let Some(handle) = self.watchdog.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Watchdog: waits for the worker to start running, then checks that the
/// inbox sequence advances at least once per `frame_timeout`. Fires
/// `on_error` and stops the worker if the source never delivers or stalls
/// mid-stream.
fn run_watchdog_with_config(
    inbox: &Mailbox<Frame>,
    running: &AtomicBool,
    shutdown: &AtomicBool,
    on_error: Option<&FatalErrorCallback>,
    config: WatchdogConfig,
) {
    let WatchdogConfig {
        startup_timeout,
        frame_timeout,
        poll_interval,
    } = config;
    // Phase 1: wait for `running` to become true
    let start = Instant::now();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            return;
        }
        if running.load(Ordering::Relaxed) {
            break;
        }
        if start.elapsed() >= startup_timeout {
            return;
        }
        std::thread::sleep(poll_interval);
    }

    // Phase 2: the sequence must keep moving while the worker runs
    let mut last_sequence = inbox.sequence();
    let mut last_progress = Instant::now();
    loop {
        if shutdown.load(Ordering::Relaxed) || !running.load(Ordering::Relaxed) {
            return;
        }
        let sequence = inbox.sequence();
        if sequence != last_sequence {
            last_sequence = sequence;
            last_progress = Instant::now();
        } else if last_progress.elapsed() >= frame_timeout {
            if sequence == 0 {
                warn!(
                    "watchdog: no frames received within {}s",
                    frame_timeout.as_secs()
                );
            } else {
                warn!(
                    "watchdog: frames stopped after #{sequence}, none for {}s",
                    frame_timeout.as_secs()
                );
            }
            if let Some(cb) = on_error {
                cb(&PipelineError::WatchdogTimeout(frame_timeout));
            }
            running.store(false, Ordering::Relaxed);
            return;
        }
        std::thread::sleep(poll_interval);
    }
}
