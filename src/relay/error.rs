use thiserror::Error;

use crate::preview::compress::CompressError;

/// Relay subsystem errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind relay server on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("relay server failed: {0}")]
    Serve(#[source] std::io::Error),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] CompressError),

    #[error("failed to serialise relay message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to spawn relay publisher: {0}")]
    Spawn(String),
}
