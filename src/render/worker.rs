use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

use crate::render::context::GpuContext;
use crate::render::error::RenderError;
use crate::render::renderer::{FrameProducer, RenderCounters, Renderer};
use crate::render::shader::ShaderSources;

/// Builds the rendering context on the render thread, for a surface of
/// the given size.
pub type ContextFactory =
    Arc<dyn Fn(u32, u32) -> Result<Box<dyn GpuContext>, RenderError> + Send + Sync>;

/// Receives setup failures that leave the renderer inert.
pub type RenderErrorCallback = Arc<dyn Fn(RenderError) + Send + Sync>;

/// Messages from the control domain to the render thread.
#[derive(Debug)]
pub enum RenderCommand {
    Resize { width: u32, height: u32 },
    InvalidateTexture,
    /// Free every GPU object, acknowledge, then drop the context and exit.
    Release { ack: Sender<()> },
}

#[derive(Clone)]
pub struct RenderWorkerConfig {
    pub shaders: ShaderSources,
    pub viewport: (u32, u32),
    pub tick: Duration,
}

impl Default for RenderWorkerConfig {
    fn default() -> Self {
        Self {
            shaders: ShaderSources::default(),
            viewport: (1280, 720),
            tick: Duration::from_micros(16_667),
        }
    }
}

/// Dedicated thread owning the rendering context, shader program and
/// frame texture.
pub struct RenderWorker {
    commands: Sender<RenderCommand>,
    thread: Option<JoinHandle<()>>,
    counters: Arc<RenderCounters>,
}

impl RenderWorker {
    pub fn spawn(
        factory: ContextFactory,
        config: RenderWorkerConfig,
        producer: FrameProducer,
        on_error: RenderErrorCallback,
    ) -> Result<Self, RenderError> {
        let (commands, inbox) = unbounded();
        let counters = Arc::new(RenderCounters::default());
        let thread_counters = Arc::clone(&counters);

        let thread = std::thread::Builder::new()
            .name("gpu-render".to_string())
            .spawn(move || {
                info!("render thread starting");
                run_render_loop(factory, config, producer, inbox, thread_counters, on_error);
                info!("render thread exiting");
            })
            .map_err(|e| RenderError::Worker(e.to_string()))?;

        Ok(Self {
            commands,
            thread: Some(thread),
            counters,
        })
    }

    pub fn counters(&self) -> &Arc<RenderCounters> {
        &self.counters
    }

    pub fn resize(&self, width: u32, height: u32) {
        let _ = self.commands.send(RenderCommand::Resize { width, height });
    }

    pub fn invalidate_texture(&self) {
        let _ = self.commands.send(RenderCommand::InvalidateTexture);
    }

    /// Ask the render thread to free its GPU objects and wait for the
    /// acknowledgement, then join it. Idempotent.
    ///
    /// Returns false if the thread did not acknowledge within `timeout`. A
    /// thread that misses the deadline is left detached rather than joined.
    pub fn release(&mut self, timeout: Duration) -> bool {
        let Some(handle) = self.thread.take() else {
            return true;
        };
        let (ack, acked) = bounded(1);
        let acknowledged = if self.commands.send(RenderCommand::Release { ack }).is_ok() {
            match acked.recv_timeout(timeout) {
                Ok(()) => true,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "render thread did not acknowledge release within {timeout:?}, \
                         detaching it"
                    );
                    return false;
                }
                Err(RecvTimeoutError::Disconnected) => false,
            }
        } else {
            false
        };
        if handle.join().is_err() {
            error!("render thread panicked");
        }
        acknowledged
    }
}

impl Drop for RenderWorker {
    fn drop(&mut self) {
        self.release(Duration::from_secs(2));
    }
}

fn run_render_loop(
    factory: ContextFactory,
    config: RenderWorkerConfig,
    producer: FrameProducer,
    inbox: Receiver<RenderCommand>,
    counters: Arc<RenderCounters>,
    on_error: RenderErrorCallback,
) {
    let (width, height) = config.viewport;
    let mut renderer = Renderer::with_counters(config.shaders, counters);

    let mut ctx = match factory(width, height) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            error!("failed to create rendering context: {e}");
            on_error(e);
            None
        }
    };
    if let Some(ctx) = ctx.as_deref_mut() {
        renderer.on_surface_changed(ctx, width, height);
        if let Err(e) = renderer.on_surface_created(ctx, Arc::clone(&producer)) {
            on_error(e);
        }
    }

    let ticker = tick(config.tick);
    let mut failing = false;
    loop {
        select! {
            recv(inbox) -> command => match command {
                Ok(RenderCommand::Resize { width, height }) => {
                    if let Some(ctx) = ctx.as_deref_mut() {
                        renderer.on_surface_changed(ctx, width, height);
                    }
                }
                Ok(RenderCommand::InvalidateTexture) => renderer.invalidate_texture(),
                Ok(RenderCommand::Release { ack }) => {
                    shutdown(&mut renderer, &mut ctx);
                    let _ = ack.send(());
                    break;
                }
                Err(_) => {
                    debug!("render command channel closed");
                    shutdown(&mut renderer, &mut ctx);
                    break;
                }
            },
            recv(ticker) -> _ => {
                let Some(ctx) = ctx.as_deref_mut() else { continue };
                match renderer.draw_frame(ctx) {
                    Ok(outcome) => {
                        trace!("draw tick: {outcome:?}");
                        failing = false;
                    }
                    Err(e) if !failing => {
                        warn!("draw failed: {e}");
                        failing = true;
                    }
                    Err(e) => trace!("draw still failing: {e}"),
                }
            },
        }
    }
    // The context drops here, on the thread that created it.
    drop(ctx);
    // Frames posted after teardown are refused.
    drop(producer.close());
}

fn shutdown(renderer: &mut Renderer, ctx: &mut Option<Box<dyn GpuContext>>) {
    match ctx.as_deref_mut() {
        Some(ctx) => renderer.release(ctx),
        None => debug!("no rendering context to release"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::ConvertedFrame;
    use crate::preview::mailbox::Mailbox;
    use crate::render::renderer::RendererState;
    use crate::render::software::SoftwareContext;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn software_factory() -> ContextFactory {
        Arc::new(|w, h| Ok(Box::new(SoftwareContext::new(w, h)) as Box<dyn GpuContext>))
    }

    fn fast_config() -> RenderWorkerConfig {
        RenderWorkerConfig {
            viewport: (8, 8),
            tick: Duration::from_millis(5),
            ..RenderWorkerConfig::default()
        }
    }

    fn collect_errors() -> (RenderErrorCallback, Arc<Mutex<Vec<RenderError>>>) {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let callback: RenderErrorCallback = Arc::new(move |e| sink.lock().push(e));
        (callback, errors)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn worker_uploads_posted_frames_and_releases_on_request() {
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let (on_error, errors) = collect_errors();
        let mut worker = RenderWorker::spawn(
            software_factory(),
            fast_config(),
            Arc::clone(&producer),
            on_error,
        )
        .unwrap();

        producer.post(Arc::new(ConvertedFrame::new(2, 2, 1, vec![50; 16])));
        let counters = Arc::clone(worker.counters());
        assert!(wait_for(|| counters.snapshot().uploads == 1));
        assert!(wait_for(|| counters.snapshot().state == RendererState::Rendering));

        assert!(worker.release(Duration::from_secs(2)));
        assert_eq!(counters.snapshot().state, RendererState::Released);
        assert!(producer.is_closed());
        assert!(errors.lock().is_empty());
        // Second release is a no-op.
        assert!(worker.release(Duration::from_secs(2)));
    }

    #[test]
    fn context_failure_is_reported_and_worker_stays_stoppable() {
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let (on_error, errors) = collect_errors();
        let factory: ContextFactory =
            Arc::new(|_, _| Err(RenderError::Context("no adapter".to_string())));
        let mut worker =
            RenderWorker::spawn(factory, fast_config(), producer, on_error).unwrap();

        assert!(wait_for(|| !errors.lock().is_empty()));
        assert!(matches!(errors.lock()[0], RenderError::Context(_)));
        assert!(worker.release(Duration::from_secs(2)));
        assert_eq!(
            worker.counters().snapshot().state,
            RendererState::Uninitialized
        );
    }

    #[test]
    fn shader_failure_is_reported_and_ticks_are_noops() {
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let (on_error, errors) = collect_errors();
        let config = RenderWorkerConfig {
            shaders: ShaderSources {
                fragment: "broken".to_string(),
                ..ShaderSources::default()
            },
            ..fast_config()
        };
        let mut worker = RenderWorker::spawn(
            software_factory(),
            config,
            Arc::clone(&producer),
            on_error,
        )
        .unwrap();

        assert!(wait_for(|| !errors.lock().is_empty()));
        producer.post(Arc::new(ConvertedFrame::new(1, 1, 1, vec![0; 4])));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(worker.counters().snapshot().draws, 0);
        assert!(worker.release(Duration::from_secs(2)));
    }

    #[test]
    fn dropping_the_worker_releases_it() {
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let (on_error, _errors) = collect_errors();
        let worker = RenderWorker::spawn(
            software_factory(),
            fast_config(),
            Arc::clone(&producer),
            on_error,
        )
        .unwrap();
        let counters = Arc::clone(worker.counters());
        drop(worker);
        assert_eq!(counters.snapshot().state, RendererState::Released);
    }

    #[test]
    fn release_gives_up_on_a_stuck_render_thread() {
        let producer: FrameProducer = Arc::new(Mailbox::new());
        let (on_error, _errors) = collect_errors();
        let (gate_tx, gate_rx) = bounded::<()>(0);
        let factory: ContextFactory = Arc::new(move |w, h| {
            // Blocks context creation until the test opens the gate.
            let _ = gate_rx.recv();
            Ok(Box::new(SoftwareContext::new(w, h)) as Box<dyn GpuContext>)
        });
        let mut worker =
            RenderWorker::spawn(factory, fast_config(), Arc::clone(&producer), on_error).unwrap();

        let started = Instant::now();
        assert!(!worker.release(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_secs(1));
        // Already given up on; a second call does not wait again.
        assert!(worker.release(Duration::from_secs(2)));

        // The detached thread still finishes its teardown once unblocked.
        drop(gate_tx);
        assert!(wait_for(|| producer.is_closed()));
        assert_eq!(
            worker.counters().snapshot().state,
            RendererState::Released
        );
    }
}
