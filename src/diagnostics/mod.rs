// Diagnostics: frame-rate window and pipeline counters.

pub mod fps;
pub mod stats;
