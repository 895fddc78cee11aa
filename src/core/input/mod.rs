//! Concurrent console input
//!
//! - **demux**: reader thread and consumer fan-out
//! - **stream**: `io::Read` adapter

pub mod demux;
pub mod stream;

pub use demux::{display_width, DemuxOptions, InputDemux, LineBuffer};
pub use stream::InputStream;
