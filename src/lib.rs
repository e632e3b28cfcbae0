#![doc(html_root_url = "https://docs.rs/vdkplay/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # vdkplay - RTSP frame publishing
//!
//! `vdkplay` bridges a live network video stream to a frame consumer. An
//! external decoding engine demuxes, decodes and converts the stream to
//! interleaved RGB; `vdkplay` owns the session lifecycle around it and
//! publishes every decoded frame through one reusable buffer.
//!
//! ## Features
//!
//! - Session lifecycle: create, play, stop from any thread, destroy
//! - A single frame buffer reused for as long as the frame geometry holds
//! - Cooperative cancellation checked once per loop iteration
//! - Deterministic release of engine resources on every exit path
//! - Borrowed, copying and channel-based frame delivery
//!
//! ## Quick Start
//!
//! ```rust
//! use vdkplay::av::testing::{ScriptedEngine, ScriptedUnit};
//! use vdkplay::player::{PlayOptions, PlayOutcome, Player};
//! use vdkplay::session::{FrameView, StreamSession};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Any `DecodingEngine` works here; the scripted one replays ten frames.
//! let engine = ScriptedEngine::single_video(640, 480)
//!     .with_units((0..10).map(|_| ScriptedUnit::Frame(0)));
//! let player = Player::new(engine, PlayOptions::default());
//!
//! let mut session = StreamSession::create(|frame: FrameView<'_>| {
//!     assert_eq!(frame.data().len(), 640 * 480 * 3);
//! });
//!
//! let outcome = player.play(&mut session, "rtsp://example.com/stream")?;
//! assert_eq!(outcome, PlayOutcome::EndOfStream);
//! assert_eq!(session.statistics().frames_published, 10);
//!
//! session.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - `av`: media base types and the decoding engine traits
//!   - Packets, stream descriptors and decoded frames
//!   - A scripted engine for tests
//!
//! - `format`: endpoint validation and engine open options
//!
//! - `session`: stream sessions, the frame buffer and frame consumers
//!
//! - `player`: the streaming loop
//!
//! - `config`: configuration from environment variables and config files
//!
//! - `error`: error types and the crate `Result` alias

/// Audio/Video base types and the decoding engine surface
pub mod av;

/// Configuration module
pub mod config;

/// Error types and utilities
pub mod error;

/// Endpoint addressing and transport options
pub mod format;

/// The streaming loop
pub mod player;

/// Stream sessions, frame buffer and consumers
pub mod session;

pub use error::{Result, VdkError};
pub use player::{PlayOptions, PlayOutcome, Player};
pub use session::{FrameBuffer, SessionHandle, StreamSession};
