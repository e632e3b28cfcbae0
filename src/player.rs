//! # The streaming loop
//!
//! [`Player::play`] opens an endpoint through a [`DecodingEngine`], selects a
//! video stream, sizes the session's frame buffer and then repeats
//! read → decode → convert → publish until the session is stopped, the
//! stream ends, or an error occurs.
//!
//! Cancellation is cooperative: the session's run flag is checked once per
//! iteration, before the next read. A read or decode already in flight is
//! always completed first, so stop latency is bounded by one iteration. A
//! stop requested while the endpoint is still being opened is kept, and the
//! loop then returns before its first read.
//!
//! Engine handles are owned by the play call and closed before it returns on
//! every path, including errors.

use crate::av::{
    DecodeStatus, DecodingEngine, FrameConverter, Geometry, MediaSource, PictureFormat,
    PixelFormat, StreamInfo, VideoDecoder,
};
use crate::error::{Result, VdkError};
use crate::format::rtsp::{Endpoint, OpenOptions, RtspTransport};
use crate::session::{SessionState, StreamSession};
use chrono::{DateTime, Utc};
use log::{debug, error, info, trace, warn};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Which video stream to decode when a source exposes several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamSelection {
    /// The video stream listed first
    #[default]
    First,
    /// The video stream listed last
    Last,
}

impl StreamSelection {
    /// Picks a video stream from `streams` according to the policy.
    pub fn select<'a>(&self, streams: &'a [StreamInfo]) -> Option<&'a StreamInfo> {
        let mut video = streams.iter().filter(|s| s.is_video());
        match self {
            StreamSelection::First => video.next(),
            StreamSelection::Last => video.last(),
        }
    }
}

impl FromStr for StreamSelection {
    type Err = VdkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(StreamSelection::First),
            "last" => Ok(StreamSelection::Last),
            other => Err(VdkError::Config(format!("unknown stream selection '{}'", other))),
        }
    }
}

/// Options applied to every play call of a [`Player`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayOptions {
    /// Transport written to the engine options. Always a reliable one.
    pub transport: RtspTransport,
    /// Video stream choice when a source has several
    pub stream_selection: StreamSelection,
    /// Additional engine options. The transport key is always overwritten
    /// with [`transport`](PlayOptions::transport).
    pub extra: OpenOptions,
}

impl PlayOptions {
    /// TCP transport, first video stream, no extra options.
    pub fn new() -> Self {
        Self {
            transport: RtspTransport::Tcp,
            stream_selection: StreamSelection::First,
            extra: OpenOptions::empty(),
        }
    }

    /// Selects TCP or HTTP tunnelling.
    pub fn with_transport(mut self, transport: RtspTransport) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the stream selection policy.
    pub fn with_stream_selection(mut self, selection: StreamSelection) -> Self {
        self.stream_selection = selection;
        self
    }

    /// Adds an engine option. A transport given here is overridden.
    pub fn with_option(mut self, key: &str, value: &str) -> Self {
        self.extra.set(key, value);
        self
    }

    /// The option dictionary handed to [`DecodingEngine::open`].
    pub fn open_options(&self) -> OpenOptions {
        self.extra.clone().with_transport(self.transport)
    }
}

impl Default for PlayOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Why a play call returned without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The session's run flag was observed cleared.
    Stopped,
    /// The source reported end-of-stream while the session was running.
    EndOfStream,
}

impl PlayOutcome {
    /// `true` only when the caller asked for the stop.
    pub fn is_clean_stop(&self) -> bool {
        *self == PlayOutcome::Stopped
    }
}

impl fmt::Display for PlayOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayOutcome::Stopped => f.write_str("stopped"),
            PlayOutcome::EndOfStream => f.write_str("end of stream"),
        }
    }
}

/// Counters for one play call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamStatistics {
    /// Compressed units read from the source
    pub units_read: u64,
    /// Units belonging to a stream other than the selected one
    pub units_discarded: u64,
    /// Units after which the decoder needed more data
    pub decode_stalls: u64,
    /// Frames handed to the consumer
    pub frames_published: u64,
    /// Pixel bytes handed to the consumer
    pub bytes_published: u64,
    /// When the run flag was armed
    pub started_at: Option<DateTime<Utc>>,
    /// When the last frame was published
    pub last_frame_at: Option<DateTime<Utc>>,
}

/// Engine handles acquired by one play call, closed in reverse order on drop.
#[derive(Default)]
struct EngineResources {
    source: Option<Box<dyn MediaSource>>,
    decoder: Option<Box<dyn VideoDecoder>>,
    converter: Option<Box<dyn FrameConverter>>,
}

impl Drop for EngineResources {
    fn drop(&mut self) {
        if let Some(mut converter) = self.converter.take() {
            converter.close();
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
        }
        if let Some(mut source) = self.source.take() {
            source.close();
        }
    }
}

/// Drives sessions with frames from a [`DecodingEngine`].
pub struct Player<E> {
    engine: E,
    options: PlayOptions,
}

impl<E: DecodingEngine> Player<E> {
    /// A player opening every endpoint through `engine`.
    pub fn new(engine: E, options: PlayOptions) -> Self {
        Self { engine, options }
    }

    /// The decoding engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Options applied to every play call.
    pub fn options(&self) -> &PlayOptions {
        &self.options
    }

    /// Plays `endpoint` into `session`, blocking until the loop exits.
    ///
    /// Returns [`PlayOutcome::Stopped`] when the session was stopped and
    /// [`PlayOutcome::EndOfStream`] when the source ran dry. Every failure is
    /// returned as an error and nothing is retried. On return the session is
    /// `Stopped` after a clean stop and `Idle` otherwise, and can be played
    /// again.
    pub fn play(&self, session: &mut StreamSession, endpoint: &str) -> Result<PlayOutcome> {
        let endpoint = Endpoint::parse(endpoint).map_err(|e| {
            error!("session {}: {}", session.id(), e);
            e
        })?;
        self.play_endpoint(session, &endpoint)
    }

    /// [`play`](Player::play) for an already validated endpoint.
    pub fn play_endpoint(
        &self,
        session: &mut StreamSession,
        endpoint: &Endpoint,
    ) -> Result<PlayOutcome> {
        let id = session.id();
        let stop_requests = session.stop_requests();
        session.set_state(SessionState::Streaming);

        let result = self.run(session, endpoint, stop_requests);

        match &result {
            Ok(PlayOutcome::Stopped) => {
                session.set_state(SessionState::Stopped);
                info!("session {}: stopped", id);
            }
            Ok(PlayOutcome::EndOfStream) => {
                session.set_state(SessionState::Idle);
                warn!("session {}: {} ended unexpectedly", id, endpoint);
            }
            Err(e) => {
                session.set_state(SessionState::Idle);
                error!("session {}: play failed: {}", id, e);
            }
        }
        result
    }

    fn run(
        &self,
        session: &mut StreamSession,
        endpoint: &Endpoint,
        stop_requests: u64,
    ) -> Result<PlayOutcome> {
        let id = session.id();
        let options = self.options.open_options();
        info!("session {}: opening {} ({})", id, endpoint, options);

        let mut resources = EngineResources::default();
        let source = resources.source.insert(self.engine.open(endpoint, &options)?);

        let streams = source.streams()?;
        debug!("session {}: {} streams found", id, streams.len());
        let stream = self
            .options
            .stream_selection
            .select(&streams)
            .ok_or(VdkError::NoVideoStream)?
            .clone();

        let decoder = resources.decoder.insert(
            self.engine
                .find_decoder(stream.codec)
                .ok_or_else(|| VdkError::UnsupportedCodec(format!("{:?}", stream.codec)))?,
        );
        let picture = decoder.open(&stream)?;
        if picture.width == 0 || picture.height == 0 {
            return Err(VdkError::DecoderOpen(format!(
                "decoder reported invalid dimensions {}x{}",
                picture.width, picture.height
            )));
        }

        let output = PictureFormat {
            width: picture.width,
            height: picture.height,
            pixel_format: PixelFormat::Rgb24,
        };
        let converter = resources
            .converter
            .insert(self.engine.create_converter(&picture, &output)?);

        let geometry = Geometry::rgb(picture.width, picture.height);
        if session.buffer_mut().ensure_geometry(geometry)? {
            debug!("session {}: frame buffer sized to {}", id, geometry);
        }
        if !session.start(stop_requests) {
            info!("session {}: stopped before streaming", id);
            return Ok(PlayOutcome::Stopped);
        }
        info!(
            "session {}: streaming {:?} stream {} at {}",
            id, stream.codec, stream.index, geometry
        );

        let outcome = Self::pump(session, source, decoder, converter, stream.index);
        drop(resources);
        outcome
    }

    fn pump(
        session: &mut StreamSession,
        source: &mut Box<dyn MediaSource>,
        decoder: &mut Box<dyn VideoDecoder>,
        converter: &mut Box<dyn FrameConverter>,
        stream_index: usize,
    ) -> Result<PlayOutcome> {
        loop {
            if !session.is_running() {
                return Ok(PlayOutcome::Stopped);
            }

            let packet = match source.read_packet()? {
                Some(packet) => packet,
                None => return Ok(PlayOutcome::EndOfStream),
            };
            session.count_unit_read();

            if packet.stream_index != stream_index {
                trace!(
                    "session {}: discarding unit of stream {}",
                    session.id(),
                    packet.stream_index
                );
                session.count_unit_discarded();
                continue;
            }

            let frame = match decoder.decode(&packet)? {
                DecodeStatus::Frame(frame) => frame,
                DecodeStatus::NeedMoreData => {
                    session.count_decode_stall();
                    continue;
                }
            };

            let pixels = converter.convert(&frame)?;
            session.publish_frame(pixels)?;
        }
    }
}

impl<E: DecodingEngine + 'static> Player<E> {
    /// Runs [`play`](Player::play) on tokio's blocking thread pool.
    ///
    /// The join handle yields the session back together with the outcome.
    /// Stop the loop through a [`SessionHandle`](crate::session::SessionHandle)
    /// taken before spawning. Must be called from within a tokio runtime.
    pub fn spawn(
        self: &Arc<Self>,
        mut session: StreamSession,
        endpoint: impl Into<String>,
    ) -> JoinHandle<(StreamSession, Result<PlayOutcome>)> {
        let player = Arc::clone(self);
        let endpoint = endpoint.into();
        tokio::task::spawn_blocking(move || {
            let outcome = player.play(&mut session, &endpoint);
            (session, outcome)
        })
    }
}
