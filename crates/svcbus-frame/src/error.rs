/// Errors that can occur during frame and envelope encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid frame magic (expected 0x5342 \"SB\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// A message envelope arrived on a channel other than MESSAGE.
    #[error("unexpected channel {0} for message envelope")]
    UnexpectedChannel(u16),

    /// The envelope `type` code is not a known message kind.
    #[error("unknown message type code {0}")]
    UnknownMessageKind(u16),

    /// The envelope payload is not valid JSON for the expected shape.
    #[error("malformed envelope: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
