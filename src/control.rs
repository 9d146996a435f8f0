use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::camera::open_source;
use crate::camera::source::{FrameSink, FrameSource};
use crate::camera::types::{Frame, FramePool};
use crate::diagnostics::stats::{DiagnosticSnapshot, PipelineStats};
use crate::error::{FatalErrorCallback, PipelineError};
use crate::filter::{CannyEdgeFilter, FrameFilter};
use crate::preview::capture::{
    CaptureOutputs, CaptureSession, FrameOutbox, FrameProcessor, WatchdogConfig,
};
use crate::preview::mailbox::Mailbox;
use crate::relay::hub::RelayHub;
use crate::relay::publisher::{PublisherConfig, RelayPublisher};
use crate::render::renderer::{RenderCounters, RenderSnapshot};
use crate::render::shader::ShaderSources;
use crate::render::worker::{ContextFactory, RenderWorker, RenderWorkerConfig};
use crate::render::context_factory;
use crate::settings::types::EdgecastConfig;

/// How long `stop` waits for the render thread to acknowledge release.
const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Workers alive between `start` and `stop`.
struct Running {
    capture: CaptureSession,
    render: RenderWorker,
    publisher: Option<RelayPublisher>,
}

/// The control surface: starts and stops the frame pipeline, toggles the
/// filter and exposes telemetry.
pub struct EdgePipeline {
    config: EdgecastConfig,
    source: Box<dyn FrameSource>,
    context_factory: ContextFactory,
    shaders: ShaderSources,
    filter: Arc<dyn FrameFilter>,
    filter_enabled: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    relay: Option<Arc<RelayHub>>,
    fatal_callbacks: Arc<Mutex<Vec<FatalErrorCallback>>>,
    render_counters: Option<Arc<RenderCounters>>,
    running: Option<Running>,
}

impl EdgePipeline {
    /// Build a pipeline from config: the configured source, render backend
    /// and a Canny edge filter.
    pub fn new(config: EdgecastConfig) -> Result<Self, PipelineError> {
        let source = open_source(&config.source)?;
        let factory = context_factory(config.render.backend);
        let filter = Arc::new(CannyEdgeFilter::new(config.filter.edge_params()));
        Ok(Self::with_parts(config, source, factory, filter))
    }

    /// Build a pipeline from explicit parts.
    pub fn with_parts(
        config: EdgecastConfig,
        source: Box<dyn FrameSource>,
        context_factory: ContextFactory,
        filter: Arc<dyn FrameFilter>,
    ) -> Self {
        let filter_enabled = Arc::new(AtomicBool::new(config.filter.enabled));
        Self {
            config,
            source,
            context_factory,
            shaders: ShaderSources::default(),
            filter,
            filter_enabled,
            stats: Arc::new(PipelineStats::default()),
            relay: None,
            fatal_callbacks: Arc::new(Mutex::new(Vec::new())),
            render_counters: None,
            running: None,
        }
    }

    /// Replace the shader pair used on the next `start`.
    pub fn set_shaders(&mut self, shaders: ShaderSources) {
        self.shaders = shaders;
    }

    /// Publish filtered frames to `hub` from the next `start` on.
    pub fn attach_relay(&mut self, hub: Arc<RelayHub>) {
        self.relay = Some(hub);
    }

    /// Register a callback for errors that take a stage down.
    pub fn on_fatal_error(&self, callback: FatalErrorCallback) {
        self.fatal_callbacks.lock().push(callback);
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Spawn the render, capture and relay workers, then start the source.
    ///
    /// A source that fails to bind is reported to the fatal-error callbacks,
    /// everything already spawned is torn down, and the error is returned.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.running.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }
        info!("starting pipeline with {}", self.source.describe());
        let report = self.fatal_reporter();

        let render_box: FrameOutbox = Arc::new(Mailbox::new());
        let render_report = Arc::clone(&report);
        let render = RenderWorker::spawn(
            Arc::clone(&self.context_factory),
            RenderWorkerConfig {
                shaders: self.shaders.clone(),
                viewport: (
                    self.config.render.viewport_width,
                    self.config.render.viewport_height,
                ),
                tick: self.config.render.tick_interval(),
            },
            Arc::clone(&render_box),
            Arc::new(move |e| render_report(&PipelineError::Render(e))),
        )?;
        self.render_counters = Some(Arc::clone(render.counters()));

        let relay_box: Option<FrameOutbox> = self.relay.as_ref().map(|_| Arc::new(Mailbox::new()));
        let inbox: Arc<Mailbox<Frame>> = Arc::new(Mailbox::new());
        let processor = FrameProcessor::new(
            Arc::clone(&self.filter),
            Arc::clone(&self.filter_enabled),
            Arc::clone(&self.stats),
            CaptureOutputs {
                render: render_box,
                relay: relay_box.clone(),
            },
        );
        let watchdog = WatchdogConfig {
            frame_timeout: Duration::from_millis(self.config.watchdog.frame_timeout_ms),
            poll_interval: Duration::from_millis(self.config.watchdog.poll_interval_ms.max(1)),
            ..WatchdogConfig::default()
        };
        let capture = CaptureSession::spawn(
            Arc::clone(&inbox),
            processor,
            watchdog,
            Some(Arc::clone(&report)),
        )?;

        let publisher = match (&self.relay, relay_box) {
            (Some(hub), Some(outbox)) => Some(
                RelayPublisher::spawn(
                    Arc::clone(hub),
                    outbox,
                    Arc::clone(&self.stats),
                    PublisherConfig::from(&self.config.relay),
                )
                .map_err(|e| PipelineError::Spawn {
                    thread: "relay-publisher",
                    reason: e.to_string(),
                })?,
            ),
            _ => None,
        };

        let mut running = Running {
            capture,
            render,
            publisher,
        };

        let pool = FramePool::new(self.config.source.max_in_flight);
        let sink = FrameSink::new(inbox, pool, Arc::clone(&self.stats));
        if let Err(e) = self.source.start(sink) {
            let err = PipelineError::from(e);
            error!("frame source failed to start: {err}");
            report(&err);
            shutdown(self.source.as_mut(), &mut running);
            return Err(err);
        }

        self.running = Some(running);
        info!("pipeline started");
        Ok(())
    }

    /// Stop every stage: source, capture worker (draining its inbox), render
    /// thread (after it acknowledges release), relay publisher. Idempotent.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        shutdown(self.source.as_mut(), &mut running);
        info!("pipeline stopped");
    }

    /// Enable or bypass the filter stage. Takes effect on the next frame.
    pub fn toggle_filter(&self, enabled: bool) {
        let previous = self.filter_enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            info!("filter {}", if enabled { "enabled" } else { "bypassed" });
        }
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled.load(Ordering::Relaxed)
    }

    /// The most recently published frames-per-second value.
    pub fn fps_snapshot(&self) -> f64 {
        self.stats.fps_gauge().load()
    }

    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        self.stats.snapshot()
    }

    /// Renderer counters from the current or most recent run.
    pub fn render_snapshot(&self) -> Option<RenderSnapshot> {
        self.render_counters.as_ref().map(|c| c.snapshot())
    }

    /// Resize the render surface. Ignored while stopped.
    pub fn resize_viewport(&self, width: u32, height: u32) {
        match &self.running {
            Some(running) => running.render.resize(width, height),
            None => warn!("resize ignored, pipeline not running"),
        }
    }

    pub fn stats_handle(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    fn fatal_reporter(&self) -> FatalErrorCallback {
        let callbacks = Arc::clone(&self.fatal_callbacks);
        Arc::new(move |err: &PipelineError| {
            for callback in callbacks.lock().iter() {
                callback(err);
            }
        })
    }
}

impl Drop for EdgePipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

fn shutdown(source: &mut dyn FrameSource, running: &mut Running) {
    source.stop();
    running.capture.stop();
    running.render.release(RELEASE_TIMEOUT);
    if let Some(publisher) = running.publisher.as_mut() {
        publisher.stop();
    }
}
