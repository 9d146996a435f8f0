use crate::camera::error::{CameraError, Result};
use crate::camera::types::{PixelFormat, Plane};

/// Repack a packed 4:2:2 YUYV buffer into I420 planes.
///
/// Chroma of each vertical pair of rows is averaged down to 4:2:0.
pub fn yuyv_to_i420(data: &[u8], width: u32, height: u32) -> Result<Vec<Plane>> {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let row_stride = cw * 4;
    if w == 0 || h == 0 || data.len() < row_stride * h {
        return Err(CameraError::Stream(format!(
            "YUYV buffer of {} bytes is too short for {width}x{height}",
            data.len()
        )));
    }

    let mut luma = Vec::with_capacity(w * h);
    for row in data.chunks_exact(row_stride).take(h) {
        luma.extend(row.iter().step_by(2).take(w));
    }

    let mut u = Vec::with_capacity(cw * ch);
    let mut v = Vec::with_capacity(cw * ch);
    for cy in 0..ch {
        let top = &data[cy * 2 * row_stride..][..row_stride];
        let bottom = if cy * 2 + 1 < h {
            &data[(cy * 2 + 1) * row_stride..][..row_stride]
        } else {
            top
        };
        for cx in 0..cw {
            let i = cx * 4;
            u.push(((top[i + 1] as u16 + bottom[i + 1] as u16 + 1) / 2) as u8);
            v.push(((top[i + 3] as u16 + bottom[i + 3] as u16 + 1) / 2) as u8);
        }
    }

    Ok(vec![
        Plane::new(luma, w, 1),
        Plane::new(u, cw, 1),
        Plane::new(v, cw, 1),
    ])
}

/// Describe an NV12 buffer as planes without copying chroma apart.
pub fn nv12_planes(data: &[u8], width: u32, height: u32) -> Result<(PixelFormat, Vec<Plane>)> {
    let (w, h) = (width as usize, height as usize);
    let chroma_len = w.div_ceil(2) * 2 * h.div_ceil(2);
    if w == 0 || h == 0 || data.len() < w * h + chroma_len {
        return Err(CameraError::Stream(format!(
            "NV12 buffer of {} bytes is too short for {width}x{height}",
            data.len()
        )));
    }
    let (luma, chroma) = data.split_at(w * h);
    Ok((
        PixelFormat::Nv12,
        vec![
            Plane::new(luma.to_vec(), w, 1),
            Plane::new(chroma[..chroma_len].to_vec(), w.div_ceil(2) * 2, 2),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::Frame;
    use crate::preview::convert::convert_frame;

    #[test]
    fn yuyv_splits_luma_and_averages_chroma() {
        // 2x2: row 0 U=100 V=200, row 1 U=110 V=210.
        let data = [10, 100, 20, 200, 30, 110, 40, 210];
        let planes = yuyv_to_i420(&data, 2, 2).unwrap();
        assert_eq!(planes[0].data, vec![10, 20, 30, 40]);
        assert_eq!(planes[1].data, vec![105]);
        assert_eq!(planes[2].data, vec![205]);
    }

    #[test]
    fn repacked_yuyv_converts_to_grey() {
        let data: Vec<u8> = [128, 128, 128, 128].repeat(4 * 3);
        let planes = yuyv_to_i420(&data, 8, 3).unwrap();
        let frame = Frame::new(8, 3, PixelFormat::I420, 0, planes);
        let rgba = convert_frame(&frame).unwrap().rgba;
        assert!(rgba.chunks_exact(4).all(|px| px[0] == px[1] && px[1] == px[2]));
    }

    #[test]
    fn short_buffers_are_stream_errors() {
        assert!(matches!(
            yuyv_to_i420(&[0; 7], 2, 2),
            Err(CameraError::Stream(_))
        ));
        assert!(matches!(
            nv12_planes(&[0; 5], 2, 2),
            Err(CameraError::Stream(_))
        ));
    }

    #[test]
    fn nv12_keeps_interleaved_chroma() {
        let data = [1, 2, 3, 4, 50, 60];
        let (format, planes) = nv12_planes(&data, 2, 2).unwrap();
        assert_eq!(format, PixelFormat::Nv12);
        assert_eq!(planes[1].data, vec![50, 60]);
        assert_eq!(planes[1].pixel_stride, 2);
    }
}
