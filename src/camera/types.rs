use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Chroma-subsampled layouts a source can deliver.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Three planes: Y, U, V.
    #[default]
    I420,
    /// Two planes: Y, interleaved UV.
    Nv12,
    /// Two planes: Y, interleaved VU.
    Nv21,
}

impl PixelFormat {
    /// Number of planes a frame in this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            PixelFormat::I420 => 3,
            PixelFormat::Nv12 | PixelFormat::Nv21 => 2,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::I420 => "I420",
            PixelFormat::Nv12 => "NV12",
            PixelFormat::Nv21 => "NV21",
        };
        f.write_str(name)
    }
}

/// One image plane as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    pub data: Vec<u8>,
    /// Bytes between the start of consecutive rows.
    pub row_stride: usize,
    /// Bytes between consecutive samples in a row. 1 = planar, 2 = interleaved.
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// Bounded set of frame slots shared between a source and its consumers.
///
/// A source must hold a [`FrameLease`] for every frame it emits. When all
/// slots are taken the source stalls (skips captures) instead of queueing.
#[derive(Debug)]
pub struct FramePool {
    capacity: usize,
    outstanding: AtomicUsize,
    stalls: AtomicU64,
}

impl FramePool {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            outstanding: AtomicUsize::new(0),
            stalls: AtomicU64::new(0),
        })
    }

    /// Take a slot, or `None` when every slot is still held.
    pub fn try_acquire(self: &Arc<Self>) -> Option<FrameLease> {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            if current >= self.capacity {
                self.stalls.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(FrameLease {
                        pool: Arc::clone(self),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Slots currently held by live frames.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Captures skipped because no slot was free.
    pub fn stalls(&self) -> u64 {
        self.stalls.load(Ordering::Relaxed)
    }
}

/// A held pool slot. Dropping it returns the slot.
#[derive(Debug)]
pub struct FrameLease {
    pool: Arc<FramePool>,
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// A single captured frame from the camera.
///
/// Owned by exactly one holder at a time. The pool slot is returned when
/// the frame is released or dropped, whichever comes first, and never twice.
#[derive(Debug)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Capture timestamp in microseconds.
    pub timestamp_us: u64,
    pub planes: Vec<Plane>,
    lease: Option<FrameLease>,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        timestamp_us: u64,
        planes: Vec<Plane>,
    ) -> Self {
        Self {
            width,
            height,
            format,
            timestamp_us,
            planes,
            lease: None,
        }
    }

    /// Attach the pool slot this frame occupies.
    pub fn with_lease(mut self, lease: FrameLease) -> Self {
        self.lease = Some(lease);
        self
    }

    pub fn is_leased(&self) -> bool {
        self.lease.is_some()
    }

    /// Hand the frame back to its source.
    pub fn release(self) {
        drop(self);
    }
}

/// Packed RGBA output of the color converter.
///
/// Shared read-only between the renderer and the relay through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFrame {
    pub width: u32,
    pub height: u32,
    /// Capture timestamp of the source frame in microseconds.
    pub timestamp_us: u64,
    pub rgba: Vec<u8>,
}

impl ConvertedFrame {
    pub fn new(width: u32, height: u32, timestamp_us: u64, rgba: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp_us,
            rgba,
        }
    }

    /// Expected RGBA byte length for the frame's dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}
