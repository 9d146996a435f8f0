// Preview pipeline: frame handoff, conversion, the capture worker and
// still-image compression for the relay.

pub mod capture;
pub mod compress;
pub mod convert;
pub mod mailbox;
