use image::{GrayImage, RgbaImage};
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};

use crate::camera::types::ConvertedFrame;
use crate::filter::{FilterError, FrameFilter};

/// Tuning for [`CannyEdgeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeParams {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// Gaussian pre-blur; 0 disables it.
    pub blur_sigma: f32,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            blur_sigma: 1.5,
        }
    }
}

/// Canny edge extraction: luma, Gaussian blur, hysteresis thresholds.
///
/// Output is the single-channel edge map replicated into RGB with opaque
/// alpha, so it drops straight into the RGBA texture path.
#[derive(Debug, Clone, Default)]
pub struct CannyEdgeFilter {
    params: EdgeParams,
}

impl CannyEdgeFilter {
    pub fn new(params: EdgeParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> EdgeParams {
        self.params
    }

    fn edges(&self, gray: &GrayImage) -> GrayImage {
        let EdgeParams {
            low_threshold,
            high_threshold,
            blur_sigma,
        } = self.params;
        if blur_sigma > 0.0 {
            canny(&gaussian_blur_f32(gray, blur_sigma), low_threshold, high_threshold)
        } else {
            canny(gray, low_threshold, high_threshold)
        }
    }
}

impl FrameFilter for CannyEdgeFilter {
    fn name(&self) -> &str {
        "canny"
    }

    fn apply(&self, frame: &ConvertedFrame) -> Result<ConvertedFrame, FilterError> {
        let expected = frame.expected_len();
        let rgba = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone()).ok_or(
            FilterError::BufferSize {
                width: frame.width,
                height: frame.height,
                expected,
                actual: frame.rgba.len(),
            },
        )?;

        let gray = image::imageops::grayscale(&rgba);
        let edges = self.edges(&gray);

        let mut out = Vec::with_capacity(expected);
        for value in edges.into_raw() {
            out.extend_from_slice(&[value, value, value, 255]);
        }
        Ok(ConvertedFrame::new(
            frame.width,
            frame.height,
            frame.timestamp_us,
            out,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Left half black, right half white.
    fn vertical_step(width: u32, height: u32) -> ConvertedFrame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                rgba.extend_from_slice(&[v, v, v, 255]);
            }
        }
        ConvertedFrame::new(width, height, 99, rgba)
    }

    #[test]
    fn default_params_match_tuned_values() {
        let params = EdgeParams::default();
        assert_eq!(params.low_threshold, 50.0);
        assert_eq!(params.high_threshold, 150.0);
        assert_eq!(params.blur_sigma, 1.5);
    }

    #[test]
    fn step_edge_is_detected_near_the_boundary() {
        let filter = CannyEdgeFilter::default();
        let out = filter.apply(&vertical_step(32, 16)).unwrap();
        assert_eq!((out.width, out.height), (32, 16));
        assert_eq!(out.timestamp_us, 99);

        let edge_columns: Vec<u32> = out
            .rgba
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, px)| px[0] == 255)
            .map(|(i, _)| i as u32 % 32)
            .collect();
        assert!(!edge_columns.is_empty(), "no edges found");
        assert!(edge_columns.iter().all(|&x| (13..=18).contains(&x)));
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let frame = ConvertedFrame::new(16, 16, 0, vec![128; 16 * 16 * 4]);
        let out = CannyEdgeFilter::default().apply(&frame).unwrap();
        assert!(out.rgba.chunks_exact(4).all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn output_is_opaque_greyscale() {
        let out = CannyEdgeFilter::default()
            .apply(&vertical_step(16, 8))
            .unwrap();
        for px in out.rgba.chunks_exact(4) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn short_buffer_is_an_error() {
        let frame = ConvertedFrame::new(4, 4, 0, vec![0; 10]);
        assert!(matches!(
            CannyEdgeFilter::default().apply(&frame),
            Err(FilterError::BufferSize { expected: 64, .. })
        ));
    }

    #[test]
    fn blur_can_be_disabled() {
        let filter = CannyEdgeFilter::new(EdgeParams {
            blur_sigma: 0.0,
            ..EdgeParams::default()
        });
        let out = filter.apply(&vertical_step(16, 8)).unwrap();
        assert!(out.rgba.chunks_exact(4).any(|px| px[0] == 255));
    }
}
