//! # Media base types and the decoding engine surface
//!
//! The demuxing, decoding and pixel conversion work is done by an external
//! engine (an FFmpeg binding, a hardware decoder, ...). This module defines
//! the blocking capability traits such an engine exposes to the
//! [`Player`](crate::player::Player):
//!
//! - [`DecodingEngine`]: opens endpoints, resolves decoders, builds converters
//! - [`MediaSource`]: probes streams and yields compressed [`Packet`]s
//! - [`VideoDecoder`]: turns packets into [`VideoFrame`]s
//! - [`FrameConverter`]: normalizes decoded frames to interleaved RGB
//!
//! Every handle has an explicit `close` so the player can release engine
//! resources deterministically on every exit path.

use crate::error::Result;
use crate::format::rtsp::{Endpoint, OpenOptions};
use bytes::Bytes;

mod frame;
mod packet;
/// Scripted engine for tests and demos
pub mod testing;

pub use frame::*;
pub use packet::*;

/// Codec of a stream, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecType {
    /// H.264/AVC video
    H264,
    /// H.265/HEVC video
    H265,
    /// Motion JPEG video
    MJPEG,
    /// MPEG-4 Part 2 video
    MPEG4,
    /// AAC audio
    AAC,
    /// Opus audio
    OPUS,
}

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// Pictures
    Video,
    /// Sound
    Audio,
    /// Anything else, e.g. metadata or ONVIF events
    Data,
}

/// Stream descriptor reported by [`MediaSource::streams`].
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Position in the source's stream list, matched against
    /// [`Packet::stream_index`]
    pub index: usize,
    /// Media kind
    pub kind: MediaKind,
    /// Codec
    pub codec: CodecType,
    /// Advertised picture width; the decoder has the final word
    pub width: Option<u32>,
    /// Advertised picture height
    pub height: Option<u32>,
    /// Codec configuration, e.g. SPS/PPS
    pub extra_data: Option<Bytes>,
}

impl StreamInfo {
    /// A video stream descriptor.
    pub fn video(index: usize, codec: CodecType, width: u32, height: u32) -> Self {
        Self {
            index,
            kind: MediaKind::Video,
            codec,
            width: Some(width),
            height: Some(height),
            extra_data: None,
        }
    }

    /// An audio stream descriptor.
    pub fn audio(index: usize, codec: CodecType) -> Self {
        Self {
            index,
            kind: MediaKind::Audio,
            codec,
            width: None,
            height: None,
            extra_data: None,
        }
    }

    /// True for [`MediaKind::Video`].
    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }
}

/// Size and layout of a picture on either side of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel layout
    pub pixel_format: PixelFormat,
}

/// Result of feeding one packet to a decoder.
#[derive(Debug)]
pub enum DecodeStatus<'a> {
    /// A complete picture, borrowed from the decoder until its next call.
    Frame(VideoFrame<'a>),
    /// The packet was consumed but no picture is ready yet.
    NeedMoreData,
}

/// Entry point of a decoding engine.
pub trait DecodingEngine: Send + Sync {
    /// Connects to `endpoint`. Fails with [`VdkError::Open`](crate::VdkError::Open).
    fn open(&self, endpoint: &Endpoint, options: &OpenOptions) -> Result<Box<dyn MediaSource>>;

    /// Returns an unopened decoder for `codec`, if the engine has one.
    fn find_decoder(&self, codec: CodecType) -> Option<Box<dyn VideoDecoder>>;

    /// Builds a converter from the decoder's picture format to `output`.
    fn create_converter(
        &self,
        input: &PictureFormat,
        output: &PictureFormat,
    ) -> Result<Box<dyn FrameConverter>>;
}

/// An opened, demuxing connection to a remote stream.
pub trait MediaSource: Send {
    /// Probes stream metadata.
    fn streams(&mut self) -> Result<Vec<StreamInfo>>;

    /// Reads the next compressed unit. `Ok(None)` marks end-of-stream.
    fn read_packet(&mut self) -> Result<Option<Packet>>;

    /// Closes the connection. Called exactly once.
    fn close(&mut self);
}

/// A decoder for one video stream.
pub trait VideoDecoder: Send {
    /// Configures the decoder for `stream` and reports the decoded picture
    /// format. Fails with [`VdkError::DecoderOpen`](crate::VdkError::DecoderOpen).
    fn open(&mut self, stream: &StreamInfo) -> Result<PictureFormat>;

    /// Fails with [`VdkError::Decode`](crate::VdkError::Decode) on corrupt input.
    fn decode(&mut self, packet: &Packet) -> Result<DecodeStatus<'_>>;

    /// Releases decoder state. Called exactly once, opened or not.
    fn close(&mut self);
}

/// Pixel format and colorspace conversion.
pub trait FrameConverter: Send {
    /// Converts `frame` into the output format. The returned bytes live in the
    /// converter's scratch storage and are overwritten by the next call.
    fn convert(&mut self, frame: &VideoFrame<'_>) -> Result<&[u8]>;

    /// Releases conversion state. Called exactly once.
    fn close(&mut self);
}
