use crate::av::Geometry;
use bytes::Bytes;
use log::{trace, warn};
use tokio::sync::mpsc::{self, error::TrySendError};

/// A borrowed view of the session's frame buffer, valid for one callback.
///
/// The same storage is overwritten in place by the next published frame, so
/// the lifetime keeps consumers from holding on to it. Use
/// [`to_owned_frame`](FrameView::to_owned_frame) to keep a copy.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    data: &'a [u8],
    geometry: Geometry,
}

impl<'a> FrameView<'a> {
    pub(crate) fn new(data: &'a [u8], geometry: Geometry) -> Self {
        Self { data, geometry }
    }

    /// Interleaved RGB pixels, `width * height * channels` bytes.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Geometry of [`data`](FrameView::data).
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.geometry.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.geometry.height
    }

    /// Bytes per pixel, always 3 for published frames.
    pub fn channels(&self) -> u32 {
        self.geometry.channels
    }

    /// Copies the pixels out of the session buffer.
    pub fn to_owned_frame(&self) -> OwnedFrame {
        OwnedFrame {
            data: Bytes::copy_from_slice(self.data),
            geometry: self.geometry,
        }
    }
}

/// A copied frame that outlives the callback it was taken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedFrame {
    /// Interleaved RGB pixels
    pub data: Bytes,
    /// Geometry the frame was published with
    pub geometry: Geometry,
}

/// Receives every published frame, synchronously on the streaming thread.
///
/// Implementations should return quickly: the next read does not start until
/// `on_frame` returns. Closures taking a [`FrameView`] implement this trait.
pub trait FrameConsumer: Send {
    /// Called once per published frame.
    fn on_frame(&mut self, frame: FrameView<'_>);
}

impl<F> FrameConsumer for F
where
    F: FnMut(FrameView<'_>) + Send,
{
    fn on_frame(&mut self, frame: FrameView<'_>) {
        self(frame)
    }
}

/// Hands the wrapped callback an owned copy of each frame.
pub struct CopyingConsumer<F> {
    callback: F,
}

impl<F> CopyingConsumer<F>
where
    F: FnMut(OwnedFrame) + Send,
{
    /// Wraps `callback`.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> FrameConsumer for CopyingConsumer<F>
where
    F: FnMut(OwnedFrame) + Send,
{
    fn on_frame(&mut self, frame: FrameView<'_>) {
        (self.callback)(frame.to_owned_frame())
    }
}

/// Forwards owned frame copies over a bounded channel.
///
/// Never blocks the streaming loop. A frame that finds the channel full is
/// dropped, so a slow receiver sees gaps instead of stalling the stream and
/// delaying stops. Frames are dropped as well once the receiver is gone.
/// Safe to use from [`Player::spawn`](crate::player::Player::spawn) and from
/// plain threads.
#[derive(Debug)]
pub struct ChannelConsumer {
    tx: mpsc::Sender<OwnedFrame>,
    dropped: u64,
    closed: bool,
}

impl ChannelConsumer {
    /// A consumer and the receiving end of its channel.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero, like [`mpsc::channel`].
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<OwnedFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let consumer = Self {
            tx,
            dropped: 0,
            closed: false,
        };
        (consumer, rx)
    }

    /// Frames discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameConsumer for ChannelConsumer {
    fn on_frame(&mut self, frame: FrameView<'_>) {
        match self.tx.try_send(frame.to_owned_frame()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                trace!("Frame channel full, dropping frame");
                self.dropped += 1;
            }
            Err(TrySendError::Closed(_)) => {
                if !self.closed {
                    warn!("Frame receiver closed, dropping frames");
                    self.closed = true;
                }
                self.dropped += 1;
            }
        }
    }
}
