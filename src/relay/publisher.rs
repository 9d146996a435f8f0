use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::camera::types::ConvertedFrame;
use crate::diagnostics::stats::PipelineStats;
use crate::preview::capture::FrameOutbox;
use crate::preview::compress::encode_frame;
use crate::relay::error::RelayError;
use crate::relay::hub::RelayHub;
use crate::relay::message::RelayMessage;
use crate::settings::types::{ImageFormat, RelayConfig};

const OUTBOX_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    pub max_width: u32,
    pub min_interval: Duration,
}

impl From<&RelayConfig> for PublisherConfig {
    fn from(config: &RelayConfig) -> Self {
        Self {
            image_format: config.image_format,
            jpeg_quality: config.jpeg_quality,
            max_width: config.max_width,
            min_interval: Duration::from_millis(config.min_interval_ms),
        }
    }
}

/// Encode one frame into the JSON text sent to viewers.
pub fn build_message(
    frame: &ConvertedFrame,
    stats: &PipelineStats,
    config: &PublisherConfig,
) -> Result<String, RelayError> {
    let image = encode_frame(
        frame,
        config.image_format,
        config.jpeg_quality,
        config.max_width,
    )?;
    RelayMessage::new(&image, stats.fps_gauge().load(), stats.processing_time_ms()).to_json()
}

/// Worker that turns the latest filtered frame into a relay broadcast, at
/// most once per `min_interval`.
pub struct RelayPublisher {
    outbox: FrameOutbox,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl RelayPublisher {
    pub fn spawn(
        hub: Arc<RelayHub>,
        outbox: FrameOutbox,
        stats: Arc<PipelineStats>,
        config: PublisherConfig,
    ) -> Result<Self, RelayError> {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let frames = Arc::clone(&outbox);

        let thread = std::thread::Builder::new()
            .name("relay-publisher".to_string())
            .spawn(move || {
                info!("relay publisher starting");
                let mut sent: u64 = 0;
                let mut last_sent: Option<Instant> = None;
                loop {
                    // Rate limit: wait out the remainder of the interval,
                    // waking early on stop.
                    if let Some(last) = last_sent {
                        let remaining = config.min_interval.saturating_sub(last.elapsed());
                        if !remaining.is_zero() {
                            match stop_rx.recv_timeout(remaining) {
                                Err(RecvTimeoutError::Timeout) => {}
                                _ => break,
                            }
                        }
                    }
                    let Some(frame) = frames.take_timeout(OUTBOX_POLL) else {
                        if frames.is_closed() || stop_requested(&stop_rx) {
                            break;
                        }
                        continue;
                    };
                    if hub.peer_count() == 0 {
                        trace!("no viewers, skipping encode");
                        continue;
                    }
                    match build_message(&frame, &stats, &config) {
                        Ok(text) => {
                            let delivered = hub.broadcast(text);
                            if sent < 3 {
                                debug!("relayed frame {sent} to {delivered} viewers");
                            }
                            sent += 1;
                            last_sent = Some(Instant::now());
                        }
                        Err(e) => warn!("failed to relay frame: {e}"),
                    }
                }
                info!("relay publisher stopped after {sent} frames");
            })
            .map_err(|e| RelayError::Spawn(e.to_string()))?;

        Ok(Self {
            outbox,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop publishing and drop any frame still waiting. Idempotent.
    pub fn stop(&mut self) {
        self.stop.take();
        drop(self.outbox.close());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RelayPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn stop_requested(stop: &crossbeam_channel::Receiver<()>) -> bool {
    matches!(
        stop.try_recv(),
        Err(crossbeam_channel::TryRecvError::Disconnected)
    )
}
