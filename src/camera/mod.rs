// Camera domain: frame types, sources and the sink they deliver into.

pub mod error;
pub mod repack;
pub mod source;
pub mod synthetic;
pub mod types;
#[cfg(feature = "webcam")]
pub mod webcam;

use crate::camera::error::Result;
use crate::camera::source::FrameSource;
use crate::camera::synthetic::{SyntheticConfig, SyntheticSource};
use crate::settings::types::{SourceConfig, SourceKind};

/// Create the configured source. Nothing is opened until `start`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match config.kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            width: config.width,
            height: config.height,
            fps: config.fps as f64,
            format: config.pixel_format,
        }))),
        #[cfg(feature = "webcam")]
        SourceKind::Webcam => Ok(Box::new(webcam::WebcamSource::new(webcam::WebcamConfig {
            device_index: config.device_index,
            width: config.width,
            height: config.height,
            fps: config.fps,
        }))),
        #[cfg(not(feature = "webcam"))]
        SourceKind::Webcam => Err(error::CameraError::DeviceUnavailable(
            "built without the `webcam` feature".to_string(),
        )),
    }
}
