use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::preview::compress::EncodedImage;
use crate::relay::error::RelayError;

/// One relayed frame plus the stats a viewer displays next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    /// Base64 (standard alphabet, padded) encoded still image.
    pub image: String,
    pub fps: f64,
    /// `"{width}x{height}"` of the encoded image.
    pub resolution: String,
    /// Milliseconds spent converting and filtering the frame.
    pub processing_time: f64,
}

impl RelayMessage {
    pub fn new(image: &EncodedImage, fps: f64, processing_time_ms: f64) -> Self {
        Self {
            image: STANDARD.encode(&image.bytes),
            fps: round1(fps),
            resolution: format!("{}x{}", image.width, image.height),
            processing_time: round1(processing_time_ms),
        }
    }

    pub fn to_json(&self) -> Result<String, RelayError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
