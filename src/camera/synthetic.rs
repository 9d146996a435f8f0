use crossbeam_channel::{bounded, select, tick, Sender};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::camera::error::{CameraError, Result};
use crate::camera::source::{FrameSink, FrameSource};
use crate::camera::types::{Frame, PixelFormat, Plane};

/// Width of one test-pattern bar in pixels.
const BAR_WIDTH: u32 = 32;
/// Pixels the bars shift per frame.
const BAR_SPEED: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub format: PixelFormat,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
            format: PixelFormat::I420,
        }
    }
}

/// A simulated camera emitting moving bars over a vertical gradient.
///
/// Used when no capture hardware is present and throughout the tests.
pub struct SyntheticSource {
    config: SyntheticConfig,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            stop: None,
            thread: None,
        }
    }

    pub fn config(&self) -> SyntheticConfig {
        self.config
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        let c = self.config;
        format!("synthetic {}x{}@{} {}", c.width, c.height, c.fps, c.format)
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.thread.is_some() {
            return Err(CameraError::AlreadyStarted);
        }
        let config = self.config;
        if config.width == 0 || config.height == 0 {
            return Err(CameraError::DeviceUnavailable(format!(
                "invalid resolution {}x{}",
                config.width, config.height
            )));
        }
        if !(config.fps.is_finite() && config.fps > 0.0) {
            return Err(CameraError::DeviceUnavailable(format!(
                "invalid frame rate {}",
                config.fps
            )));
        }

        let (stop_tx, stop_rx) = bounded::<()>(0);
        let thread = std::thread::Builder::new()
            .name("synthetic-source".to_string())
            .spawn(move || {
                info!("synthetic source running");
                let ticker = tick(Duration::from_secs_f64(1.0 / config.fps));
                let started = Instant::now();
                let mut index: u32 = 0;
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let Some(lease) = sink.lease() else {
                                trace!("all frame slots held, skipping capture");
                                continue;
                            };
                            let timestamp_us = started.elapsed().as_micros() as u64;
                            let frame = test_pattern(&config, index, timestamp_us).with_lease(lease);
                            if index < 3 {
                                debug!("synthetic frame {index} delivered");
                            }
                            if !sink.deliver(frame) {
                                break;
                            }
                            index = index.wrapping_add(1);
                        },
                    }
                }
                info!("synthetic source stopped after {index} frames");
            })
            .map_err(|e| CameraError::Spawn(e.to_string()))?;

        self.stop = Some(stop_tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the sender disconnects the stop channel and wakes the thread.
        self.stop.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build one frame of the test pattern in the requested layout.
pub fn test_pattern(config: &SyntheticConfig, index: u32, timestamp_us: u64) -> Frame {
    let (w, h) = (config.width as usize, config.height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let shift = index.wrapping_mul(BAR_SPEED);

    let mut luma = Vec::with_capacity(w * h);
    for y in 0..h {
        let base = 40 + (y * 120 / h.max(1)) as u8;
        luma.extend((0..w).map(|x| {
            let bar = ((x as u32).wrapping_add(shift) / BAR_WIDTH) % 2;
            if bar == 0 {
                base
            } else {
                base.saturating_add(90)
            }
        }));
    }

    let u = vec![128u8; cw * ch];
    let v: Vec<u8> = (0..ch)
        .flat_map(|y| std::iter::repeat_n(112 + (y * 32 / ch.max(1)) as u8, cw))
        .collect();

    let planes = match config.format {
        PixelFormat::I420 => vec![
            Plane::new(luma, w, 1),
            Plane::new(u, cw, 1),
            Plane::new(v, cw, 1),
        ],
        PixelFormat::Nv12 => vec![Plane::new(luma, w, 1), interleave(&u, &v, cw)],
        PixelFormat::Nv21 => vec![Plane::new(luma, w, 1), interleave(&v, &u, cw)],
    };
    Frame::new(config.width, config.height, config.format, timestamp_us, planes)
}

fn interleave(first: &[u8], second: &[u8], chroma_width: usize) -> Plane {
    let data = first
        .iter()
        .zip(second)
        .flat_map(|(a, b)| [*a, *b])
        .collect();
    Plane::new(data, chroma_width * 2, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::FramePool;
    use crate::diagnostics::stats::PipelineStats;
    use crate::preview::convert::convert_frame;
    use crate::preview::mailbox::Mailbox;
    use std::sync::Arc;

    fn config(format: PixelFormat) -> SyntheticConfig {
        SyntheticConfig {
            width: 63,
            height: 17,
            fps: 200.0,
            format,
        }
    }

    #[test]
    fn every_layout_converts_to_the_same_image() {
        let i420 = convert_frame(&test_pattern(&config(PixelFormat::I420), 3, 0)).unwrap();
        let nv12 = convert_frame(&test_pattern(&config(PixelFormat::Nv12), 3, 0)).unwrap();
        let nv21 = convert_frame(&test_pattern(&config(PixelFormat::Nv21), 3, 0)).unwrap();
        assert_eq!(i420.rgba, nv12.rgba);
        assert_eq!(i420.rgba, nv21.rgba);
    }

    #[test]
    fn bars_move_between_frames() {
        let c = config(PixelFormat::I420);
        let a = test_pattern(&c, 0, 0);
        let b = test_pattern(&c, 1, 0);
        assert_ne!(a.planes[0].data, b.planes[0].data);
    }

    #[test]
    fn source_delivers_until_stopped() {
        let inbox = Arc::new(Mailbox::new());
        let pool = FramePool::new(2);
        let sink = FrameSink::new(
            Arc::clone(&inbox),
            Arc::clone(&pool),
            Arc::new(PipelineStats::default()),
        );
        let mut source = SyntheticSource::new(config(PixelFormat::Nv12));
        source.start(sink).unwrap();

        let frame = inbox.take_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!((frame.width, frame.height), (63, 17));
        assert!(frame.is_leased());
        frame.release();

        source.stop();
        source.stop();
        let posted = inbox.sequence();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(inbox.sequence(), posted);
    }

    #[test]
    fn starting_twice_is_rejected() {
        let sink = FrameSink::new(
            Arc::new(Mailbox::new()),
            FramePool::new(1),
            Arc::new(PipelineStats::default()),
        );
        let mut source = SyntheticSource::new(config(PixelFormat::I420));
        source.start(sink.clone()).unwrap();
        assert!(matches!(source.start(sink), Err(CameraError::AlreadyStarted)));
        source.stop();
    }

    #[test]
    fn zero_resolution_fails_setup() {
        let sink = FrameSink::new(
            Arc::new(Mailbox::new()),
            FramePool::new(1),
            Arc::new(PipelineStats::default()),
        );
        let mut source = SyntheticSource::new(SyntheticConfig {
            width: 0,
            ..SyntheticConfig::default()
        });
        assert!(matches!(
            source.start(sink),
            Err(CameraError::DeviceUnavailable(_))
        ));
    }
}
