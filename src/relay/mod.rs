// Relay: fans rendered frames and stats out to remote viewers over
// WebSocket.

pub mod error;
pub mod hub;
pub mod message;
pub mod publisher;
pub mod server;

pub use error::RelayError;
pub use hub::{PeerId, RelayHub};
pub use message::RelayMessage;
pub use publisher::{PublisherConfig, RelayPublisher};
pub use server::{bind, router, serve, RelayState};
