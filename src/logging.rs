use std::sync::Once;
use tracing_subscriber::EnvFilter;

/// Default filter: our own logs at info, GPU stack only when it complains.
pub const DEFAULT_FILTER: &str = "info,naga=warn,wgpu_core=warn,wgpu_hal=warn";

static INIT: Once = Once::new();

/// Installs the global tracing subscriber once.
///
/// `filter` takes precedence over `RUST_LOG`, which takes precedence over
/// [`DEFAULT_FILTER`]. Subsequent calls are ignored.
pub fn init_logging(filter: Option<&str>) {
    INIT.call_once(|| {
        let env_filter = filter
            .and_then(|f| EnvFilter::try_new(f).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

        // A subscriber may already be installed by an embedding application.
        if tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_thread_names(true)
            .try_init()
            .is_err()
        {
            return;
        }
        tracing::debug!("logging initialized");
    });
}
