// Filter stage: per-frame transforms with a pass-through-on-failure contract.

pub mod edge;

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

use thiserror::Error;
use tracing::debug;

use crate::camera::types::ConvertedFrame;

pub use edge::{CannyEdgeFilter, EdgeParams};

/// Filter failures. Never surfaced past [`run_filter`].
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("buffer holds {actual} bytes, {width}x{height} RGBA needs {expected}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("filter changed frame size from {from:?} to {to:?}")]
    SizeChanged { from: (u32, u32), to: (u32, u32) },

    #[error("filter panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

/// A stateless per-frame image transform.
///
/// Implementations must return a frame of identical dimensions and must not
/// keep state between frames.
pub trait FrameFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, frame: &ConvertedFrame) -> Result<ConvertedFrame, FilterError>;
}

/// What came out of the filter stage.
#[derive(Debug)]
pub enum FilterOutcome {
    Filtered(Arc<ConvertedFrame>),
    /// The filter failed; the input frame is forwarded untouched.
    PassedThrough(Arc<ConvertedFrame>, FilterError),
}

impl FilterOutcome {
    pub fn is_passed_through(&self) -> bool {
        matches!(self, FilterOutcome::PassedThrough(..))
    }

    pub fn into_frame(self) -> Arc<ConvertedFrame> {
        match self {
            FilterOutcome::Filtered(frame) | FilterOutcome::PassedThrough(frame, _) => frame,
        }
    }
}

thread_local! {
    static IN_FILTER: Cell<bool> = const { Cell::new(false) };
}

static QUIET_HOOK: Once = Once::new();
static SILENCED_PANICS: AtomicU64 = AtomicU64::new(0);

/// Route panics raised inside a filter to `tracing` instead of the default
/// hook's stderr report. Panics anywhere else reach the previous hook.
fn install_quiet_panic_hook() {
    QUIET_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if IN_FILTER.with(Cell::get) {
                let n = SILENCED_PANICS.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("filter panic #{n}: {info}");
            } else {
                previous(info);
            }
        }));
    });
}

/// Panics swallowed by the filter hook so far.
pub fn silenced_panics() -> u64 {
    SILENCED_PANICS.load(Ordering::Relaxed)
}

/// Run `filter` on `frame`, falling back to the unmodified input on any
/// error or panic. The failure is logged at debug; callers decide how loudly
/// to report a run of failures.
pub fn run_filter(filter: &dyn FrameFilter, frame: Arc<ConvertedFrame>) -> FilterOutcome {
    install_quiet_panic_hook();
    let was_in_filter = IN_FILTER.with(|flag| flag.replace(true));
    let result = catch_unwind(AssertUnwindSafe(|| filter.apply(&frame)));
    IN_FILTER.with(|flag| flag.set(was_in_filter));
    let result = result
        .unwrap_or_else(|payload| Err(FilterError::Panicked(panic_message(payload.as_ref()))));

    let error = match result {
        Ok(out) if (out.width, out.height) == (frame.width, frame.height) => {
            return FilterOutcome::Filtered(Arc::new(out));
        }
        Ok(out) => FilterError::SizeChanged {
            from: (frame.width, frame.height),
            to: (out.width, out.height),
        },
        Err(e) => e,
    };

    debug!(
        "filter '{}' failed on frame @{}us, passing through: {error}",
        filter.name(),
        frame.timestamp_us
    );
    FilterOutcome::PassedThrough(frame, error)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
