use std::sync::Arc;
use tracing::trace;

use crate::camera::error::Result;
use crate::camera::types::{Frame, FrameLease, FramePool};
use crate::diagnostics::stats::PipelineStats;
use crate::preview::mailbox::{Mailbox, Posted};

/// A device (real or simulated) that produces frames on its own thread.
///
/// `start` fails with a setup error if the device cannot be bound; no frames
/// are delivered afterwards. `stop` is idempotent and no frame reaches the
/// sink once it returns.
pub trait FrameSource: Send {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    fn start(&mut self, sink: FrameSink) -> Result<()>;

    fn stop(&mut self);
}

/// Where a source hands its frames: the capture worker's inbox plus the
/// bounded pool limiting frames in flight.
#[derive(Clone)]
pub struct FrameSink {
    inbox: Arc<Mailbox<Frame>>,
    pool: Arc<FramePool>,
    stats: Arc<PipelineStats>,
}

impl FrameSink {
    pub fn new(inbox: Arc<Mailbox<Frame>>, pool: Arc<FramePool>, stats: Arc<PipelineStats>) -> Self {
        Self { inbox, pool, stats }
    }

    /// Reserve a slot for the next capture. `None` means every slot is still
    /// held downstream and the capture should be skipped.
    pub fn lease(&self) -> Option<FrameLease> {
        self.pool.try_acquire()
    }

    /// Post a frame, displacing any frame the capture worker has not taken.
    ///
    /// Returns false if the frame was refused because the inbox is closed.
    pub fn deliver(&self, frame: Frame) -> bool {
        match self.inbox.post(frame) {
            Posted::Accepted => true,
            Posted::Superseded(stale) => {
                trace!("frame {} superseded before conversion", stale.timestamp_us);
                self.stats.record_drop();
                stale.release();
                true
            }
            Posted::Closed(frame) => {
                frame.release();
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }

    pub fn pool(&self) -> &Arc<FramePool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::types::{PixelFormat, Plane};

    fn sink(capacity: usize) -> (FrameSink, Arc<Mailbox<Frame>>, Arc<PipelineStats>) {
        let inbox = Arc::new(Mailbox::new());
        let stats = Arc::new(PipelineStats::default());
        let sink = FrameSink::new(
            Arc::clone(&inbox),
            FramePool::new(capacity),
            Arc::clone(&stats),
        );
        (sink, inbox, stats)
    }

    fn leased(sink: &FrameSink, ts: u64) -> Frame {
        let lease = sink.lease().unwrap();
        Frame::new(
            2,
            2,
            PixelFormat::I420,
            ts,
            vec![
                Plane::new(vec![0; 4], 2, 1),
                Plane::new(vec![128], 1, 1),
                Plane::new(vec![128], 1, 1),
            ],
        )
        .with_lease(lease)
    }

    #[test]
    fn superseded_frames_return_their_lease() {
        let (sink, inbox, stats) = sink(2);
        assert!(sink.deliver(leased(&sink, 1)));
        assert!(sink.deliver(leased(&sink, 2)));
        // The first frame was displaced and released; only one slot is held.
        assert_eq!(sink.pool().outstanding(), 1);
        assert_eq!(stats.snapshot().frames_dropped, 1);
        assert_eq!(inbox.take().unwrap().timestamp_us, 2);
    }

    #[test]
    fn lease_is_refused_when_pool_is_exhausted() {
        let (sink, _inbox, _stats) = sink(1);
        let held = sink.lease();
        assert!(held.is_some());
        assert!(sink.lease().is_none());
        drop(held);
        assert!(sink.lease().is_some());
    }

    #[test]
    fn closed_inbox_refuses_and_releases() {
        let (sink, inbox, _stats) = sink(1);
        inbox.close();
        assert!(!sink.deliver(leased(&sink, 1)));
        assert!(sink.is_closed());
        assert_eq!(sink.pool().outstanding(), 0);
    }
}
