use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::types::PixelFormat;
use crate::filter::EdgeParams;
use crate::render::RenderBackend;

/// Where frames come from.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Synthetic,
    Webcam,
}

/// Still-image encoding used for relayed frames.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub device_index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    /// Frames a source may have in flight before it skips captures.
    pub max_in_flight: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            device_index: 0,
            width: 640,
            height: 480,
            fps: 30,
            pixel_format: PixelFormat::I420,
            max_in_flight: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterConfig {
    pub enabled: bool,
    pub low_threshold: f32,
    pub high_threshold: f32,
    pub blur_sigma: f32,
}

impl FilterConfig {
    pub fn edge_params(&self) -> EdgeParams {
        EdgeParams {
            low_threshold: self.low_threshold,
            high_threshold: self.high_threshold,
            blur_sigma: self.blur_sigma,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        let params = EdgeParams::default();
        Self {
            enabled: true,
            low_threshold: params.low_threshold,
            high_threshold: params.high_threshold,
            blur_sigma: params.blur_sigma,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfig {
    pub backend: RenderBackend,
    pub tick_hz: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl RenderConfig {
    /// Interval between draw ticks. A zero rate is treated as 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            backend: RenderBackend::Auto,
            tick_hz: 60,
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub enabled: bool,
    pub bind: String,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    /// Frames wider than this are downscaled before encoding. 0 disables.
    pub max_width: u32,
    pub min_interval_ms: u64,
    /// Outbound messages buffered per viewer before it starts missing frames.
    pub peer_queue: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1:3000".to_string(),
            image_format: ImageFormat::Jpeg,
            jpeg_quality: 80,
            max_width: 640,
            min_interval_ms: 100,
            peer_queue: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WatchdogSettings {
    pub frame_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            frame_timeout_ms: 5000,
            poll_interval_ms: 250,
        }
    }
}

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgecastConfig {
    pub source: SourceConfig,
    pub filter: FilterConfig,
    pub render: RenderConfig,
    pub relay: RelayConfig,
    pub watchdog: WatchdogSettings,
}
