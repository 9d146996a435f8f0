use thiserror::Error;

use crate::camera::types::{ConvertedFrame, Frame, PixelFormat, Plane};

/// Reasons a frame cannot be converted. The frame is skipped, never read.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("frame has zero dimensions ({width}x{height})")]
    ZeroDimensions { width: u32, height: u32 },

    #[error("{format} frame needs {expected} planes, got {actual}")]
    MissingPlanes {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("plane {index} is empty")]
    EmptyPlane { index: usize },

    #[error("plane {index} has a zero stride")]
    ZeroStride { index: usize },

    #[error("plane {index} holds {actual} bytes but its strides need {required}")]
    ShortPlane {
        index: usize,
        required: usize,
        actual: usize,
    },
}

/// Strided view of one sample stream inside a plane.
struct Samples<'a> {
    index: usize,
    data: &'a [u8],
    offset: usize,
    row_stride: usize,
    pixel_stride: usize,
}

impl<'a> Samples<'a> {
    fn new(index: usize, plane: &'a Plane, offset: usize) -> Result<Self, ConvertError> {
        if plane.data.is_empty() {
            return Err(ConvertError::EmptyPlane { index });
        }
        if plane.row_stride == 0 || plane.pixel_stride == 0 {
            return Err(ConvertError::ZeroStride { index });
        }
        Ok(Self {
            index,
            data: &plane.data,
            offset,
            row_stride: plane.row_stride,
            pixel_stride: plane.pixel_stride,
        })
    }

    /// Check that a `cols` x `rows` grid fits before any sample is read.
    fn check(&self, cols: usize, rows: usize) -> Result<(), ConvertError> {
        let required =
            self.offset + (rows - 1) * self.row_stride + (cols - 1) * self.pixel_stride + 1;
        if self.data.len() < required {
            return Err(ConvertError::ShortPlane {
                index: self.index,
                required,
                actual: self.data.len(),
            });
        }
        Ok(())
    }

    #[inline]
    fn at(&self, col: usize, row: usize) -> u8 {
        self.data[self.offset + row * self.row_stride + col * self.pixel_stride]
    }
}

/// Reassemble a frame's planes into one contiguous NV21 buffer
/// (full-size luma followed by interleaved V/U at half resolution).
///
/// Row and pixel strides are honoured so padded and interleaved layouts
/// produce the same byte sequence.
pub fn pack_nv21(frame: &Frame) -> Result<Vec<u8>, ConvertError> {
    let (width, height) = (frame.width as usize, frame.height as usize);
    if width == 0 || height == 0 {
        return Err(ConvertError::ZeroDimensions {
            width: frame.width,
            height: frame.height,
        });
    }
    let expected = frame.format.plane_count();
    if frame.planes.len() < expected {
        return Err(ConvertError::MissingPlanes {
            format: frame.format,
            expected,
            actual: frame.planes.len(),
        });
    }

    let luma = Samples::new(0, &frame.planes[0], 0)?;
    let (u, v) = match frame.format {
        PixelFormat::I420 => (
            Samples::new(1, &frame.planes[1], 0)?,
            Samples::new(2, &frame.planes[2], 0)?,
        ),
        PixelFormat::Nv12 => (
            Samples::new(1, &frame.planes[1], 0)?,
            Samples::new(1, &frame.planes[1], 1)?,
        ),
        PixelFormat::Nv21 => (
            Samples::new(1, &frame.planes[1], 1)?,
            Samples::new(1, &frame.planes[1], 0)?,
        ),
    };

    let (chroma_w, chroma_h) = (width.div_ceil(2), height.div_ceil(2));
    luma.check(width, height)?;
    u.check(chroma_w, chroma_h)?;
    v.check(chroma_w, chroma_h)?;

    let mut out = Vec::with_capacity(width * height + chroma_w * chroma_h * 2);
    for row in 0..height {
        if luma.pixel_stride == 1 {
            let start = row * luma.row_stride;
            out.extend_from_slice(&luma.data[start..start + width]);
        } else {
            out.extend((0..width).map(|col| luma.at(col, row)));
        }
    }
    for row in 0..chroma_h {
        for col in 0..chroma_w {
            out.push(v.at(col, row));
            out.push(u.at(col, row));
        }
    }
    Ok(out)
}

/// Convert packed NV21 to RGBA using BT.601 fixed-point coefficients.
///
/// Returns an empty Vec if the input is too small for the dimensions.
pub fn convert_nv21_to_rgba(nv21: &[u8], width: usize, height: usize) -> Vec<u8> {
    let chroma_w = width.div_ceil(2);
    let expected = width * height + chroma_w * height.div_ceil(2) * 2;
    if nv21.len() < expected || width == 0 || height == 0 {
        return Vec::new();
    }

    let y_plane = &nv21[..width * height];
    let vu_plane = &nv21[width * height..];

    let mut rgba = vec![0u8; width * height * 4];

    for row in 0..height {
        for col in 0..width {
            let y = y_plane[row * width + col] as i32;
            let vu_index = (row / 2) * chroma_w * 2 + (col / 2) * 2;
            let v = vu_plane[vu_index] as i32 - 128;
            let u = vu_plane[vu_index + 1] as i32 - 128;

            let base = (row * width + col) * 4;
            rgba[base] = ((y * 256 + 359 * v) >> 8).clamp(0, 255) as u8;
            rgba[base + 1] = ((y * 256 - 88 * u - 183 * v) >> 8).clamp(0, 255) as u8;
            rgba[base + 2] = ((y * 256 + 454 * u) >> 8).clamp(0, 255) as u8;
            rgba[base + 3] = 255;
        }
    }

    rgba
}

/// Convert a captured frame to packed RGBA of the same dimensions.
pub fn convert_frame(frame: &Frame) -> Result<ConvertedFrame, ConvertError> {
    let nv21 = pack_nv21(frame)?;
    let rgba = convert_nv21_to_rgba(&nv21, frame.width as usize, frame.height as usize);
    Ok(ConvertedFrame::new(
        frame.width,
        frame.height,
        frame.timestamp_us,
        rgba,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i420(width: usize, height: usize, y: u8, u: u8, v: u8) -> Frame {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        Frame::new(
            width as u32,
            height as u32,
            PixelFormat::I420,
            10,
            vec![
                Plane::new(vec![y; width * height], width, 1),
                Plane::new(vec![u; cw * ch], cw, 1),
                Plane::new(vec![v; cw * ch], cw, 1),
            ],
        )
    }

    fn semi_planar(format: PixelFormat, width: usize, height: usize, y: u8, u: u8, v: u8) -> Frame {
        let (cw, ch) = (width.div_ceil(2), height.div_ceil(2));
        let pair = match format {
            PixelFormat::Nv12 => [u, v],
            _ => [v, u],
        };
        let chroma: Vec<u8> = (0..cw * ch).flat_map(|_| pair).collect();
        Frame::new(
            width as u32,
            height as u32,
            format,
            10,
            vec![
                Plane::new(vec![y; width * height], width, 1),
                Plane::new(chroma, cw * 2, 2),
            ],
        )
    }

    #[test]
    fn uniform_luma_with_neutral_chroma_is_uniform_grey() {
        for luma in [16u8, 100, 128, 235] {
            let out = convert_frame(&i420(8, 6, luma, 128, 128)).unwrap();
            assert_eq!(out.rgba.len(), 8 * 6 * 4);
            for px in out.rgba.chunks_exact(4) {
                for channel in &px[..3] {
                    assert!(
                        (*channel as i32 - luma as i32).abs() <= 1,
                        "expected ~{luma}, got {px:?}"
                    );
                }
                assert_eq!(px[3], 255);
            }
        }
    }

    #[test]
    fn all_layouts_produce_identical_rgba() {
        let planar = convert_frame(&i420(6, 4, 81, 90, 240)).unwrap();
        let nv12 = convert_frame(&semi_planar(PixelFormat::Nv12, 6, 4, 81, 90, 240)).unwrap();
        let nv21 = convert_frame(&semi_planar(PixelFormat::Nv21, 6, 4, 81, 90, 240)).unwrap();
        assert_eq!(planar.rgba, nv12.rgba);
        assert_eq!(planar.rgba, nv21.rgba);
        // Strong V pushes red up and green down.
        assert!(planar.rgba[0] > 200);
        assert!(planar.rgba[1] < 60);
    }

    #[test]
    fn padded_row_stride_is_skipped() {
        let (width, height, stride) = (4usize, 2usize, 8usize);
        let mut y = vec![0u8; stride * height];
        for row in 0..height {
            for col in 0..width {
                y[row * stride + col] = 128;
            }
        }
        let frame = Frame::new(
            width as u32,
            height as u32,
            PixelFormat::I420,
            0,
            vec![
                Plane::new(y, stride, 1),
                Plane::new(vec![128; 2], 2, 1),
                Plane::new(vec![128; 2], 2, 1),
            ],
        );
        let nv21 = pack_nv21(&frame).unwrap();
        assert_eq!(&nv21[..8], &[128; 8]);
        assert_eq!(nv21.len(), 8 + 4);
    }

    #[test]
    fn odd_dimensions_round_chroma_up() {
        let out = convert_frame(&i420(5, 3, 128, 128, 128)).unwrap();
        assert_eq!(out.width, 5);
        assert_eq!(out.height, 3);
        assert_eq!(out.rgba.len(), 5 * 3 * 4);
    }

    #[test]
    fn zero_length_plane_is_rejected() {
        let mut frame = i420(4, 4, 128, 128, 128);
        frame.planes[2].data.clear();
        assert_eq!(
            convert_frame(&frame),
            Err(ConvertError::EmptyPlane { index: 2 })
        );
    }

    #[test]
    fn short_plane_is_rejected_before_reading() {
        let mut frame = i420(4, 4, 128, 128, 128);
        frame.planes[0].data.truncate(10);
        assert!(matches!(
            convert_frame(&frame),
            Err(ConvertError::ShortPlane { index: 0, .. })
        ));
    }

    #[test]
    fn missing_planes_are_rejected() {
        let mut frame = i420(4, 4, 128, 128, 128);
        frame.planes.truncate(2);
        assert!(matches!(
            convert_frame(&frame),
            Err(ConvertError::MissingPlanes { expected: 3, actual: 2, .. })
        ));
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let frame = Frame::new(0, 4, PixelFormat::Nv12, 0, Vec::new());
        assert!(matches!(
            convert_frame(&frame),
            Err(ConvertError::ZeroDimensions { .. })
        ));
    }

    #[test]
    fn kernel_rejects_undersized_input() {
        assert!(convert_nv21_to_rgba(&[0; 5], 4, 4).is_empty());
        assert!(convert_nv21_to_rgba(&[], 0, 0).is_empty());
    }

    #[test]
    fn timestamp_is_carried_over() {
        let out = convert_frame(&i420(2, 2, 50, 128, 128)).unwrap();
        assert_eq!(out.timestamp_us, 10);
    }
}
