//! A scripted, in-memory [`DecodingEngine`] for tests and demos.
//!
//! The engine replays a fixed list of [`ScriptedUnit`]s and counts every
//! handle it opens and closes in a shared [`EngineTracker`], which lets tests
//! assert that the player released all engine resources.
//!
//! ```rust
//! use vdkplay::av::testing::{ScriptedEngine, ScriptedUnit};
//!
//! let engine = ScriptedEngine::single_video(640, 480)
//!     .with_units((0..10).map(|_| ScriptedUnit::Frame(0)));
//! let tracker = engine.tracker();
//! assert_eq!(tracker.sources_opened(), 0);
//! ```

use super::{
    CodecType, DecodeStatus, DecodingEngine, FrameConverter, MediaSource, Packet, PictureFormat,
    PixelFormat, StreamInfo, VideoDecoder, VideoFrame,
};
use crate::error::{Result, VdkError};
use crate::format::rtsp::{Endpoint, OpenOptions};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const KIND_FRAME: u8 = 0;
const KIND_PARTIAL: u8 = 1;
const KIND_CORRUPT: u8 = 2;

/// One step of a scripted stream. The `usize` is the stream index the unit
/// belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedUnit {
    /// Decodes to a complete picture.
    Frame(usize),
    /// Decodes to need-more-data.
    Partial(usize),
    /// Fails to decode.
    Corrupt(usize),
    /// The read itself fails, as on a connection reset.
    ReadFailure,
}

/// Open/close and traffic counters shared by an engine and its handles.
#[derive(Debug, Default)]
pub struct EngineTracker {
    sources_opened: AtomicUsize,
    sources_closed: AtomicUsize,
    decoders_opened: AtomicUsize,
    decoders_closed: AtomicUsize,
    converters_created: AtomicUsize,
    converters_closed: AtomicUsize,
    units_read: AtomicUsize,
    frames_decoded: AtomicUsize,
    last_options: Mutex<Option<OpenOptions>>,
}

impl EngineTracker {
    /// Successful `open` calls.
    pub fn sources_opened(&self) -> usize {
        self.sources_opened.load(Ordering::SeqCst)
    }

    /// Sources closed again.
    pub fn sources_closed(&self) -> usize {
        self.sources_closed.load(Ordering::SeqCst)
    }

    /// Decoders opened successfully.
    pub fn decoders_opened(&self) -> usize {
        self.decoders_opened.load(Ordering::SeqCst)
    }

    /// Opened decoders closed again.
    pub fn decoders_closed(&self) -> usize {
        self.decoders_closed.load(Ordering::SeqCst)
    }

    /// Converters handed out.
    pub fn converters_created(&self) -> usize {
        self.converters_created.load(Ordering::SeqCst)
    }

    /// Converters closed again.
    pub fn converters_closed(&self) -> usize {
        self.converters_closed.load(Ordering::SeqCst)
    }

    /// Units returned by `read_packet`, across all sources.
    pub fn units_read(&self) -> usize {
        self.units_read.load(Ordering::SeqCst)
    }

    /// Pictures produced by all decoders.
    pub fn frames_decoded(&self) -> usize {
        self.frames_decoded.load(Ordering::SeqCst)
    }

    /// Options passed to the most recent `open` call.
    pub fn last_options(&self) -> Option<OpenOptions> {
        self.last_options.lock().clone()
    }

    /// True when every handle handed out has been closed again.
    pub fn all_released(&self) -> bool {
        self.sources_opened() == self.sources_closed()
            && self.decoders_opened() == self.decoders_closed()
            && self.converters_created() == self.converters_closed()
    }
}

/// A [`DecodingEngine`] replaying a fixed script.
#[derive(Debug, Clone)]
pub struct ScriptedEngine {
    streams: Vec<StreamInfo>,
    units: Vec<ScriptedUnit>,
    repeat_stream: Option<usize>,
    open_error: Option<String>,
    supported: Vec<CodecType>,
    decoder_error: Option<String>,
    picture: Option<PictureFormat>,
    truncate_output: bool,
    open_delay: Option<Duration>,
    read_delay: Option<Duration>,
    tracker: Arc<EngineTracker>,
}

impl ScriptedEngine {
    /// An engine exposing `streams` and an empty script.
    pub fn new(streams: Vec<StreamInfo>) -> Self {
        Self {
            streams,
            units: Vec::new(),
            repeat_stream: None,
            open_error: None,
            supported: vec![CodecType::H264, CodecType::H265, CodecType::MJPEG],
            decoder_error: None,
            picture: None,
            truncate_output: false,
            open_delay: None,
            read_delay: None,
            tracker: Arc::new(EngineTracker::default()),
        }
    }

    /// An engine exposing one H.264 video stream at index 0.
    pub fn single_video(width: u32, height: u32) -> Self {
        Self::new(vec![StreamInfo::video(0, CodecType::H264, width, height)])
    }

    /// Appends units to the script.
    pub fn with_units(mut self, units: impl IntoIterator<Item = ScriptedUnit>) -> Self {
        self.units.extend(units);
        self
    }

    /// After the script is exhausted keep producing frames on `stream_index`
    /// instead of reporting end-of-stream.
    pub fn repeating(mut self, stream_index: usize) -> Self {
        self.repeat_stream = Some(stream_index);
        self
    }

    /// Makes `open` fail with [`VdkError::Open`].
    pub fn failing_open(mut self, reason: &str) -> Self {
        self.open_error = Some(reason.to_string());
        self
    }

    /// Restricts the codecs `find_decoder` knows.
    pub fn supporting(mut self, codecs: &[CodecType]) -> Self {
        self.supported = codecs.to_vec();
        self
    }

    /// Makes decoder `open` fail with [`VdkError::DecoderOpen`].
    pub fn rejecting_decoder(mut self, reason: &str) -> Self {
        self.decoder_error = Some(reason.to_string());
        self
    }

    /// Overrides the picture format the decoder reports when opened.
    pub fn reporting_picture(mut self, picture: PictureFormat) -> Self {
        self.picture = Some(picture);
        self
    }

    /// Makes the converter emit one byte less than a full RGB picture.
    pub fn truncating_output(mut self) -> Self {
        self.truncate_output = true;
        self
    }

    /// Blocks every `open` call for `delay`, like a slow connect.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    /// Blocks every read for `delay`.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    /// Counters shared with every handle this engine opens.
    pub fn tracker(&self) -> Arc<EngineTracker> {
        Arc::clone(&self.tracker)
    }
}

impl DecodingEngine for ScriptedEngine {
    fn open(&self, endpoint: &Endpoint, options: &OpenOptions) -> Result<Box<dyn MediaSource>> {
        *self.tracker.last_options.lock() = Some(options.clone());
        if let Some(delay) = self.open_delay {
            std::thread::sleep(delay);
        }
        if let Some(ref reason) = self.open_error {
            return Err(VdkError::Open(format!("{}: {}", endpoint, reason)));
        }
        self.tracker.sources_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            streams: self.streams.clone(),
            units: self.units.iter().copied().collect(),
            repeat_stream: self.repeat_stream,
            read_delay: self.read_delay,
            sequence: 0,
            tracker: Arc::clone(&self.tracker),
        }))
    }

    fn find_decoder(&self, codec: CodecType) -> Option<Box<dyn VideoDecoder>> {
        if !self.supported.contains(&codec) {
            return None;
        }
        Some(Box::new(ScriptedDecoder {
            open_error: self.decoder_error.clone(),
            picture: self.picture,
            format: None,
            scratch: Vec::new(),
            opened: false,
            tracker: Arc::clone(&self.tracker),
        }))
    }

    fn create_converter(
        &self,
        input: &PictureFormat,
        output: &PictureFormat,
    ) -> Result<Box<dyn FrameConverter>> {
        let channels = output.pixel_format.packed_channels().ok_or_else(|| {
            VdkError::Decode(format!("cannot convert to planar {:?}", output.pixel_format))
        })?;
        if input.width != output.width || input.height != output.height {
            return Err(VdkError::Decode("scaling is not supported".into()));
        }
        let len = (output.width as usize)
            .checked_mul(output.height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .map(|n| if self.truncate_output { n.saturating_sub(1) } else { n });
        self.tracker.converters_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedConverter {
            len,
            scratch: Vec::new(),
            tracker: Arc::clone(&self.tracker),
        }))
    }
}

struct ScriptedSource {
    streams: Vec<StreamInfo>,
    units: VecDeque<ScriptedUnit>,
    repeat_stream: Option<usize>,
    read_delay: Option<Duration>,
    sequence: u64,
    tracker: Arc<EngineTracker>,
}

impl MediaSource for ScriptedSource {
    fn streams(&mut self) -> Result<Vec<StreamInfo>> {
        Ok(self.streams.clone())
    }

    fn read_packet(&mut self) -> Result<Option<Packet>> {
        if let Some(delay) = self.read_delay {
            std::thread::sleep(delay);
        }

        let unit = match self.units.pop_front() {
            Some(unit) => unit,
            None => match self.repeat_stream {
                Some(index) => ScriptedUnit::Frame(index),
                None => return Ok(None),
            },
        };

        let (stream_index, kind) = match unit {
            ScriptedUnit::Frame(index) => (index, KIND_FRAME),
            ScriptedUnit::Partial(index) => (index, KIND_PARTIAL),
            ScriptedUnit::Corrupt(index) => (index, KIND_CORRUPT),
            ScriptedUnit::ReadFailure => {
                return Err(VdkError::Read("connection reset by peer".into()));
            }
        };

        self.sequence += 1;
        self.tracker.units_read.fetch_add(1, Ordering::SeqCst);
        Ok(Some(
            Packet::new(vec![self.sequence as u8, kind])
                .with_stream_index(stream_index)
                .with_pts(self.sequence as i64),
        ))
    }

    fn close(&mut self) {
        self.tracker.sources_closed.fetch_add(1, Ordering::SeqCst);
    }
}

struct ScriptedDecoder {
    open_error: Option<String>,
    picture: Option<PictureFormat>,
    format: Option<PictureFormat>,
    scratch: Vec<u8>,
    opened: bool,
    tracker: Arc<EngineTracker>,
}

impl VideoDecoder for ScriptedDecoder {
    fn open(&mut self, stream: &StreamInfo) -> Result<PictureFormat> {
        if let Some(ref reason) = self.open_error {
            return Err(VdkError::DecoderOpen(reason.clone()));
        }
        let format = match self.picture {
            Some(picture) => picture,
            None => PictureFormat {
                width: stream.width.unwrap_or(0),
                height: stream.height.unwrap_or(0),
                pixel_format: PixelFormat::Yuv420p,
            },
        };
        self.format = Some(format);
        self.opened = true;
        self.tracker.decoders_opened.fetch_add(1, Ordering::SeqCst);
        Ok(format)
    }

    fn decode(&mut self, packet: &Packet) -> Result<DecodeStatus<'_>> {
        let format = self
            .format
            .ok_or_else(|| VdkError::Decode("decoder is not open".into()))?;

        match packet.data.get(1).copied() {
            Some(KIND_FRAME) => {}
            Some(KIND_PARTIAL) => return Ok(DecodeStatus::NeedMoreData),
            _ => return Err(VdkError::Decode("invalid NAL unit".into())),
        }

        let luma = format.width as usize * format.height as usize;
        self.scratch.clear();
        self.scratch.resize(luma + luma / 2, packet.data[0]);
        self.tracker.frames_decoded.fetch_add(1, Ordering::SeqCst);

        Ok(DecodeStatus::Frame(VideoFrame {
            data: &self.scratch,
            format: format.pixel_format,
            width: format.width,
            height: format.height,
            pts: packet.pts,
            key_frame: packet.is_key,
        }))
    }

    fn close(&mut self) {
        if self.opened {
            self.opened = false;
            self.tracker.decoders_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptedConverter {
    // `None` when the output picture does not fit in memory.
    len: Option<usize>,
    scratch: Vec<u8>,
    tracker: Arc<EngineTracker>,
}

impl FrameConverter for ScriptedConverter {
    fn convert(&mut self, frame: &VideoFrame<'_>) -> Result<&[u8]> {
        let len = self
            .len
            .ok_or_else(|| VdkError::Decode("output picture too large".into()))?;
        let fill = frame.data.first().copied().unwrap_or(0);
        self.scratch.clear();
        self.scratch.resize(len, fill);
        Ok(&self.scratch)
    }

    fn close(&mut self) {
        self.tracker.converters_closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("rtsp://camera.local/stream").unwrap()
    }

    #[test]
    fn test_source_replays_script() {
        let engine = ScriptedEngine::single_video(4, 2).with_units([
            ScriptedUnit::Frame(0),
            ScriptedUnit::Partial(0),
            ScriptedUnit::ReadFailure,
        ]);
        let tracker = engine.tracker();
        let mut source = engine.open(&endpoint(), &OpenOptions::new()).unwrap();

        let first = source.read_packet().unwrap().unwrap();
        assert_eq!(first.data.as_ref(), &[1, KIND_FRAME]);
        let second = source.read_packet().unwrap().unwrap();
        assert_eq!(second.data.as_ref(), &[2, KIND_PARTIAL]);
        assert!(matches!(source.read_packet(), Err(VdkError::Read(_))));
        assert!(source.read_packet().unwrap().is_none());

        source.close();
        assert_eq!(tracker.units_read(), 2);
        assert!(tracker.all_released());
    }

    #[test]
    fn test_decode_and_convert() {
        let engine = ScriptedEngine::single_video(4, 2);
        let stream = StreamInfo::video(0, CodecType::H264, 4, 2);
        let mut decoder = engine.find_decoder(CodecType::H264).unwrap();
        let input = decoder.open(&stream).unwrap();
        let output = PictureFormat {
            pixel_format: PixelFormat::Rgb24,
            ..input
        };
        let mut converter = engine.create_converter(&input, &output).unwrap();

        let packet = Packet::new(vec![7, KIND_FRAME]);
        let rgb = match decoder.decode(&packet).unwrap() {
            DecodeStatus::Frame(frame) => {
                assert_eq!(frame.data.len(), 12);
                converter.convert(&frame).unwrap().to_vec()
            }
            DecodeStatus::NeedMoreData => panic!("expected a frame"),
        };
        assert_eq!(rgb, vec![7; 24]);

        let corrupt = Packet::new(vec![8, KIND_CORRUPT]);
        assert!(matches!(decoder.decode(&corrupt), Err(VdkError::Decode(_))));
    }

    #[test]
    fn test_unsupported_codec_and_open_failure() {
        let engine = ScriptedEngine::single_video(4, 2)
            .supporting(&[CodecType::H265])
            .failing_open("connection refused");
        assert!(engine.find_decoder(CodecType::H264).is_none());
        assert!(matches!(
            engine.open(&endpoint(), &OpenOptions::new()),
            Err(VdkError::Open(_))
        ));
        assert_eq!(engine.tracker().sources_opened(), 0);
    }
}
