use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Result of posting into a [`Mailbox`].
///
/// Any value handed back belongs to the writer again, which releases it by
/// dropping.
#[derive(Debug)]
pub enum Posted<T> {
    /// The slot was empty.
    Accepted,
    /// The slot held an unconsumed value, which has been displaced.
    Superseded(T),
    /// The mailbox is closed; the value was not stored.
    Closed(T),
}

impl<T> Posted<T> {
    pub fn is_superseded(&self) -> bool {
        matches!(self, Posted::Superseded(_))
    }
}

/// Single-slot latest-wins handoff between two threads.
///
/// Posting never blocks on the reader and never grows a queue: a new value
/// replaces whatever has not been taken yet. The `pending` flag is
/// edge-triggered so a polling reader (the render tick) can check for new
/// content without touching the lock.
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
    pending: AtomicBool,
    closed: AtomicBool,
    /// Monotonic count of accepted posts.
    sequence: AtomicU64,
    superseded: AtomicU64,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            pending: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            superseded: AtomicU64::new(0),
        }
    }

    /// Store `value`, displacing any value not yet taken.
    pub fn post(&self, value: T) -> Posted<T> {
        let mut slot = self.slot.lock();
        if self.closed.load(Ordering::Acquire) {
            return Posted::Closed(value);
        }
        let previous = slot.replace(value);
        self.sequence.fetch_add(1, Ordering::Relaxed);
        self.pending.store(true, Ordering::Release);
        drop(slot);
        self.ready.notify_one();

        match previous {
            Some(old) => {
                self.superseded.fetch_add(1, Ordering::Relaxed);
                Posted::Superseded(old)
            }
            None => Posted::Accepted,
        }
    }

    /// Consume the "new content available" signal.
    ///
    /// Returns true at most once per batch of posts.
    pub fn take_signal(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Whether a post is waiting to be noticed.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Take the current value without waiting.
    pub fn take(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        self.pending.store(false, Ordering::Release);
        slot.take()
    }

    /// Wait up to `timeout` for a value. Returns early when closed.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_none() && !self.closed.load(Ordering::Acquire) {
            if self.ready.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        self.pending.store(false, Ordering::Release);
        slot.take()
    }

    /// Refuse further posts and hand back whatever is still stored.
    pub fn close(&self) -> Option<T> {
        let mut slot = self.slot.lock();
        self.closed.store(true, Ordering::Release);
        self.pending.store(false, Ordering::Release);
        let remaining = slot.take();
        drop(slot);
        self.ready.notify_all();
        remaining
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of accepted posts so far.
    pub fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Number of values displaced before being taken.
    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
