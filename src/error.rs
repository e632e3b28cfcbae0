use thiserror::Error;

/// Every failure a play call or a session operation can report.
#[derive(Error, Debug)]
pub enum VdkError {
    /// Filesystem failure, e.g. while writing a config template
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Endpoint malformed, unreachable or refused by the engine
    #[error("cannot open endpoint: {0}")]
    Open(String),

    /// The source exposes no video stream
    #[error("no video stream found")]
    NoVideoStream,

    /// The engine has no decoder for the selected stream
    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    /// The decoder could not be configured for the stream
    #[error("decoder rejected stream parameters: {0}")]
    DecoderOpen(String),

    /// Frame buffer storage could not be obtained
    #[error("frame buffer allocation failed: {0}")]
    Allocation(String),

    /// A frame was published before any geometry was established
    #[error("frame geometry has not been established")]
    GeometryNotSet,

    /// The converted picture is smaller than the frame buffer
    #[error("source holds {actual} bytes but the frame buffer needs {expected}")]
    SizeMismatch {
        /// Buffer capacity in bytes
        expected: usize,
        /// Bytes offered by the converter
        actual: usize,
    },

    /// Corrupt input or a failing conversion
    #[error("decode error: {0}")]
    Decode(String),

    /// The session was destroyed
    #[error("session has been destroyed")]
    SessionClosed,

    /// The transport failed while pulling a unit
    #[error("read error: {0}")]
    Read(String),

    /// Invalid configuration value
    #[error("config error: {0}")]
    Config(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VdkError>;
