use crossbeam_channel::bounded;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::camera::error::{CameraError, Result};
use crate::camera::repack::{nv12_planes, yuyv_to_i420};
use crate::camera::source::{FrameSink, FrameSource};
use crate::camera::types::{Frame, PixelFormat};

/// How long `start` waits for the device to open.
const OPEN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub struct WebcamConfig {
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// A capture device opened through nokhwa.
///
/// The camera handle is created and used only on the capture thread; the
/// open result is reported back to `start`.
pub struct WebcamSource {
    config: WebcamConfig,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WebcamSource {
    pub fn new(config: WebcamConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }
}

impl FrameSource for WebcamSource {
    fn describe(&self) -> String {
        let c = self.config;
        format!("webcam #{} {}x{}@{}", c.device_index, c.width, c.height, c.fps)
    }

    fn start(&mut self, sink: FrameSink) -> Result<()> {
        if self.thread.is_some() {
            return Err(CameraError::AlreadyStarted);
        }
        let config = self.config;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);
        let (opened_tx, opened_rx) = bounded::<Result<()>>(1);

        let thread = std::thread::Builder::new()
            .name(format!("webcam-{}", config.device_index))
            .spawn(move || {
                let mut camera = match open_camera(&config) {
                    Ok(camera) => {
                        let _ = opened_tx.send(Ok(()));
                        camera
                    }
                    Err(e) => {
                        error!("failed to open webcam #{}: {e}", config.device_index);
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                info!("webcam #{} streaming {:?}", config.device_index, camera.camera_format());
                capture_loop(&mut camera, &sink, &running);
                if let Err(e) = camera.stop_stream() {
                    warn!("failed to stop webcam stream: {e}");
                }
                info!("webcam #{} stopped", config.device_index);
            })
            .map_err(|e| CameraError::Spawn(e.to_string()))?;
        self.thread = Some(thread);

        let opened = opened_rx
            .recv_timeout(OPEN_TIMEOUT)
            .unwrap_or_else(|_| {
                Err(CameraError::DeviceUnavailable(
                    "timed out opening the device".to_string(),
                ))
            });
        if opened.is_err() {
            self.stop();
        }
        opened
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open_camera(config: &WebcamConfig) -> Result<Camera> {
    let wanted = CameraFormat::new(
        Resolution::new(config.width, config.height),
        FrameFormat::YUYV,
        config.fps,
    );
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(wanted));
    let mut camera = Camera::new(CameraIndex::Index(config.device_index), requested)
        .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
    camera
        .open_stream()
        .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))?;
    Ok(camera)
}

fn capture_loop(camera: &mut Camera, sink: &FrameSink, running: &AtomicBool) {
    let started = Instant::now();
    let mut delivered: u64 = 0;
    while running.load(Ordering::Acquire) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("webcam frame read failed: {e}");
                continue;
            }
        };
        let Some(lease) = sink.lease() else {
            trace!("all frame slots held, skipping capture");
            continue;
        };
        let resolution = buffer.resolution();
        let (width, height) = (resolution.width(), resolution.height());
        let planes = match buffer.source_frame_format() {
            FrameFormat::NV12 => nv12_planes(buffer.buffer(), width, height),
            FrameFormat::YUYV => {
                yuyv_to_i420(buffer.buffer(), width, height).map(|p| (PixelFormat::I420, p))
            }
            other => Err(CameraError::UnsupportedFormat(format!("{other:?}"))),
        };
        let (format, planes) = match planes {
            Ok(planes) => planes,
            Err(e) => {
                warn!("dropping webcam frame: {e}");
                continue;
            }
        };
        let timestamp_us = started.elapsed().as_micros() as u64;
        let frame = Frame::new(width, height, format, timestamp_us, planes).with_lease(lease);
        if delivered < 3 {
            debug!("webcam frame {delivered} delivered ({format} {width}x{height})");
        }
        if !sink.deliver(frame) {
            break;
        }
        delivered += 1;
    }
}
