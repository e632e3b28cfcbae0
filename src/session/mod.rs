//! # Stream sessions
//!
//! A [`StreamSession`] is created once per logical connection. It owns the
//! reusable [`FrameBuffer`], the [`FrameConsumer`] frames are delivered to,
//! and the cooperative run flag the [`Player`](crate::player::Player)
//! checks once per loop iteration.
//!
//! The run flag is the only control state shared with other threads; the
//! live statistics next to it are plain atomic counters. A [`SessionHandle`]
//! gives controllers access to both while the session itself is mutably
//! borrowed by a running player:
//!
//! ```rust
//! use vdkplay::session::{FrameView, SessionState, StreamSession};
//!
//! let session = StreamSession::create(|frame: FrameView<'_>| {
//!     println!("{}x{} frame", frame.width(), frame.height());
//! });
//! let handle = session.handle();
//!
//! std::thread::spawn(move || handle.request_stop()).join().unwrap();
//! assert!(!session.is_running());
//! assert_eq!(session.state(), SessionState::Idle);
//!
//! session.destroy();
//! ```

mod buffer;
mod consumer;

pub use buffer::FrameBuffer;
pub use consumer::{ChannelConsumer, CopyingConsumer, FrameConsumer, FrameView, OwnedFrame};

use crate::error::{Result, VdkError};
use crate::player::StreamStatistics;
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, or returned from a play call that did not end in a stop.
    Idle = 0,
    /// Inside a play call.
    Streaming = 1,
    /// A stop was observed by the loop.
    Stopped = 2,
    /// Destroyed. Terminal.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Streaming,
            2 => SessionState::Stopped,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Counters behind [`StreamStatistics`]. Written by the streaming thread
/// only, so a snapshot may mix values from two consecutive units.
#[derive(Debug, Default)]
struct Counters {
    units_read: AtomicU64,
    units_discarded: AtomicU64,
    decode_stalls: AtomicU64,
    frames_published: AtomicU64,
    bytes_published: AtomicU64,
    // Unix milliseconds, 0 while unset.
    started_at: AtomicI64,
    last_frame_at: AtomicI64,
}

impl Counters {
    fn reset(&self, started_at: DateTime<Utc>) {
        for counter in [
            &self.units_read,
            &self.units_discarded,
            &self.decode_stalls,
            &self.frames_published,
            &self.bytes_published,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.started_at
            .store(started_at.timestamp_millis(), Ordering::Relaxed);
        self.last_frame_at.store(0, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StreamStatistics {
        StreamStatistics {
            units_read: self.units_read.load(Ordering::Relaxed),
            units_discarded: self.units_discarded.load(Ordering::Relaxed),
            decode_stalls: self.decode_stalls.load(Ordering::Relaxed),
            frames_published: self.frames_published.load(Ordering::Relaxed),
            bytes_published: self.bytes_published.load(Ordering::Relaxed),
            started_at: timestamp(self.started_at.load(Ordering::Relaxed)),
            last_frame_at: timestamp(self.last_frame_at.load(Ordering::Relaxed)),
        }
    }
}

fn timestamp(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single()
}

#[derive(Debug)]
struct Shared {
    id: u64,
    running: AtomicBool,
    // Incremented by every stop request, so a play call can tell whether a
    // stop arrived after it started.
    stop_requests: AtomicU64,
    state: AtomicU8,
    counters: Counters,
}

impl Shared {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }
}

/// Thread-safe control surface of a [`StreamSession`].
///
/// Handles stay valid after the session is destroyed: `request_stop` then
/// does nothing and [`is_closed`](SessionHandle::is_closed) reports `true`.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    /// Id of the session, as used in log lines.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Clears the run flag. Never blocks; the loop reacts at its next
    /// checkpoint, after any in-flight read and decode complete.
    pub fn request_stop(&self) {
        if self.is_closed() {
            debug!("session {}: stop requested after destroy, ignoring", self.shared.id);
            return;
        }
        self.shared.stop_requests.fetch_add(1, Ordering::SeqCst);
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!("session {}: stop requested", self.shared.id);
        }
    }

    /// Current value of the run flag.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// True once the session has been destroyed or dropped.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Snapshot of the statistics of the current or most recent play call.
    pub fn statistics(&self) -> StreamStatistics {
        self.shared.counters.snapshot()
    }
}

/// One logical connection: frame buffer, consumer and run flag.
///
/// [`destroy`](StreamSession::destroy) consumes the session, so using it
/// afterwards does not compile. Dropping a session releases it the same way.
pub struct StreamSession {
    shared: Arc<Shared>,
    buffer: FrameBuffer,
    consumer: Option<Box<dyn FrameConsumer>>,
}

impl StreamSession {
    /// Creates an idle session with its run flag set. Opens nothing.
    pub fn create<C>(consumer: C) -> Self
    where
        C: FrameConsumer + 'static,
    {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!("session {}: created", id);
        Self {
            shared: Arc::new(Shared {
                id,
                running: AtomicBool::new(true),
                stop_requests: AtomicU64::new(0),
                state: AtomicU8::new(SessionState::Idle as u8),
                counters: Counters::default(),
            }),
            buffer: FrameBuffer::new(),
            consumer: Some(Box::new(consumer)),
        }
    }

    /// Process-unique id, prefixed to every log line of the session.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// A control handle that can be sent to other threads.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Same as [`SessionHandle::request_stop`].
    pub fn request_stop(&self) {
        self.handle().request_stop()
    }

    /// Current value of the run flag.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The buffer frames are published through.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Statistics of the current or most recent play call.
    pub fn statistics(&self) -> StreamStatistics {
        self.shared.counters.snapshot()
    }

    /// Releases the consumer and the frame buffer. Terminal.
    pub fn destroy(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if self.state() == SessionState::Closed {
            return;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.consumer = None;
        self.buffer.release();
        self.set_state(SessionState::Closed);
        info!("session {}: destroyed", self.shared.id);
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        let previous = SessionState::from_u8(self.shared.state.swap(state as u8, Ordering::AcqRel));
        if previous != state {
            debug!("session {}: {} -> {}", self.shared.id, previous, state);
        }
    }

    /// Number of stop requests so far. Taken at play entry and handed back
    /// to [`start`](StreamSession::start).
    pub(crate) fn stop_requests(&self) -> u64 {
        self.shared.stop_requests.load(Ordering::SeqCst)
    }

    /// Resets statistics and arms the run flag for a new play call, unless a
    /// stop was requested after `stop_requests` was taken. Returns whether
    /// the flag is armed.
    pub(crate) fn start(&mut self, stop_requests: u64) -> bool {
        self.shared.counters.reset(Utc::now());
        self.shared.running.store(true, Ordering::SeqCst);
        if self.stop_requests() != stop_requests {
            self.shared.running.store(false, Ordering::SeqCst);
            debug!("session {}: stop requested while opening", self.shared.id);
            return false;
        }
        true
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut FrameBuffer {
        &mut self.buffer
    }

    pub(crate) fn count_unit_read(&self) {
        Counters::bump(&self.shared.counters.units_read);
    }

    pub(crate) fn count_unit_discarded(&self) {
        Counters::bump(&self.shared.counters.units_discarded);
    }

    pub(crate) fn count_decode_stall(&self) {
        Counters::bump(&self.shared.counters.decode_stalls);
    }

    /// Copies `pixels` into the frame buffer and hands the buffer to the
    /// consumer for the duration of the call.
    pub(crate) fn publish_frame(&mut self, pixels: &[u8]) -> Result<()> {
        let consumer = self.consumer.as_mut().ok_or(VdkError::SessionClosed)?;
        self.buffer.publish(pixels)?;
        let view = self.buffer.view()?;
        consumer.on_frame(view);

        let counters = &self.shared.counters;
        Counters::bump(&counters.frames_published);
        counters
            .bytes_published
            .fetch_add(view.data().len() as u64, Ordering::Relaxed);
        counters
            .last_frame_at
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSession")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("running", &self.is_running())
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::Geometry;
    use std::sync::atomic::AtomicUsize;

    fn counting_session() -> (StreamSession, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let session = StreamSession::create(move |_frame: FrameView<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (session, calls)
    }

    #[test]
    fn test_create_is_idle_and_running() {
        let (session, calls) = counting_session();
        assert!(session.is_running());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.buffer().geometry(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_ids_are_unique() {
        let (a, _) = counting_session();
        let (b, _) = counting_session();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.handle().id(), a.id());
    }

    #[test]
    fn test_request_stop_from_other_thread() {
        let (session, _) = counting_session();
        let handle = session.handle();
        std::thread::spawn(move || handle.request_stop())
            .join()
            .unwrap();
        assert!(!session.is_running());

        // Repeated stops are harmless.
        session.request_stop();
        assert!(!session.handle().is_running());
    }

    #[test]
    fn test_publish_frame_reaches_consumer() {
        let (mut session, calls) = counting_session();
        assert!(matches!(
            session.publish_frame(&[0; 12]),
            Err(VdkError::GeometryNotSet)
        ));

        session.buffer_mut().ensure_geometry(Geometry::rgb(2, 2)).unwrap();
        session.publish_frame(&[1; 12]).unwrap();
        session.publish_frame(&[2; 12]).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let statistics = session.statistics();
        assert_eq!(statistics.frames_published, 2);
        assert_eq!(statistics.bytes_published, 24);
        assert!(statistics.last_frame_at.is_some());
        assert_eq!(session.buffer().handle().unwrap(), &[2; 12]);
    }

    #[test]
    fn test_start_honours_stop_after_entry() {
        let (mut session, _) = counting_session();
        session.request_stop();

        // A stop from before play entry is overridden.
        let seen = session.stop_requests();
        assert!(session.start(seen));
        assert!(session.is_running());
        assert!(session.statistics().started_at.is_some());

        // One that arrives between entry and arming is kept.
        let seen = session.stop_requests();
        session.handle().request_stop();
        assert!(!session.start(seen));
        assert!(!session.is_running());
    }

    #[test]
    fn test_statistics_reset_on_start() {
        let (mut session, _) = counting_session();
        session.buffer_mut().ensure_geometry(Geometry::rgb(1, 1)).unwrap();
        session.count_unit_read();
        session.count_decode_stall();
        session.publish_frame(&[0; 3]).unwrap();
        assert_eq!(session.statistics().units_read, 1);
        assert!(session.statistics().last_frame_at.is_some());

        let seen = session.stop_requests();
        session.start(seen);
        let statistics = session.statistics();
        assert_eq!(statistics.units_read, 0);
        assert_eq!(statistics.decode_stalls, 0);
        assert_eq!(statistics.frames_published, 0);
        assert_eq!(statistics.last_frame_at, None);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (mut session, _) = counting_session();
        session.buffer_mut().ensure_geometry(Geometry::rgb(8, 8)).unwrap();
        let handle = session.handle();

        session.destroy();

        assert!(handle.is_closed());
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(!handle.is_running());
        handle.request_stop();
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[test]
    fn test_drop_closes_session() {
        let (session, _) = counting_session();
        let handle = session.handle();
        drop(session);
        assert!(handle.is_closed());
    }

    #[test]
    fn test_publish_after_close_is_rejected() {
        let (mut session, calls) = counting_session();
        session.buffer_mut().ensure_geometry(Geometry::rgb(1, 1)).unwrap();
        session.close();
        assert!(matches!(
            session.publish_frame(&[0; 3]),
            Err(VdkError::SessionClosed)
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
