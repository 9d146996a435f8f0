use fast_image_resize as fr;
use fr::images::Image;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, RgbaImage};
use thiserror::Error;

use crate::camera::types::ConvertedFrame;
use crate::settings::types::ImageFormat;

#[derive(Debug, Error)]
pub enum CompressError {
    #[error("{actual} bytes is not a {width}x{height} RGBA image")]
    BufferSize {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("resize failed: {0}")]
    Resize(String),

    #[error("encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// An encoded still of one frame.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

fn rgba_image(data: &[u8], width: u32, height: u32) -> Result<RgbaImage, CompressError> {
    RgbaImage::from_raw(width, height, data.to_vec()).ok_or(CompressError::BufferSize {
        width,
        height,
        actual: data.len(),
    })
}

/// Compress raw RGBA pixel data to JPEG at the given quality (1-100).
///
/// JPEG has no alpha channel, so alpha is discarded.
pub fn compress_jpeg(
    data: &[u8],
    width: u32,
    height: u32,
    quality: u8,
) -> Result<Vec<u8>, CompressError> {
    let rgb = DynamicImage::ImageRgba8(rgba_image(data, width, height)?).into_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    rgb.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Compress raw RGBA pixel data to PNG.
pub fn compress_png(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CompressError> {
    let img = rgba_image(data, width, height)?;
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut buf))?;
    Ok(buf)
}

/// Downscale RGBA data so it is at most `max_width` wide, keeping aspect.
///
/// Uses `fast_image_resize` for SIMD-accelerated resizing. Returns `None`
/// when the image is already narrow enough or `max_width` is 0.
pub fn downscale_rgba(
    data: &[u8],
    width: u32,
    height: u32,
    max_width: u32,
) -> Result<Option<(Vec<u8>, u32, u32)>, CompressError> {
    if max_width == 0 || width <= max_width {
        return Ok(None);
    }
    let dst_width = max_width;
    let dst_height = ((height as u64 * max_width as u64) / width as u64).max(1) as u32;

    let src = Image::from_vec_u8(width, height, data.to_vec(), fr::PixelType::U8x4)
        .map_err(|e| CompressError::Resize(e.to_string()))?;
    let mut dst = Image::new(dst_width, dst_height, fr::PixelType::U8x4);
    fr::Resizer::new()
        .resize(&src, &mut dst, None)
        .map_err(|e| CompressError::Resize(e.to_string()))?;
    Ok(Some((dst.into_vec(), dst_width, dst_height)))
}

/// Downscale (if needed) and encode a frame for relaying.
pub fn encode_frame(
    frame: &ConvertedFrame,
    format: ImageFormat,
    jpeg_quality: u8,
    max_width: u32,
) -> Result<EncodedImage, CompressError> {
    let scaled = downscale_rgba(&frame.rgba, frame.width, frame.height, max_width)?;
    let (data, width, height) = match &scaled {
        Some((data, w, h)) => (data.as_slice(), *w, *h),
        None => (frame.rgba.as_slice(), frame.width, frame.height),
    };
    let bytes = match format {
        ImageFormat::Jpeg => compress_jpeg(data, width, height, jpeg_quality)?,
        ImageFormat::Png => compress_png(data, width, height)?,
    };
    Ok(EncodedImage {
        bytes,
        width,
        height,
    })
}
