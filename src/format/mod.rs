//! Endpoint addressing and the options handed to the decoding engine when a
//! stream is opened.

/// RTSP endpoints and transport options
pub mod rtsp;

pub use self::rtsp::{Endpoint, OpenOptions, RtspTransport};
