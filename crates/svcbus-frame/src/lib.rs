//! Length-prefixed framing and the service message envelope.
//!
//! Every frame on the wire carries:
//! - A 2-byte magic number ("SB") for stream synchronization
//! - A 4-byte little-endian payload length
//! - A 2-byte little-endian channel ID
//!
//! Service traffic travels as JSON [`Message`] envelopes on the
//! [`MESSAGE`] channel; connection management uses [`CONTROL`].

pub mod channel;
pub mod codec;
pub mod error;
pub mod message;

pub use channel::{channel_name, CONTROL, MESSAGE};
pub use codec::{
    decode_frame, encode_frame, Frame, FrameCodec, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{qualified_name, Message, MessageKind, RemoteError, RemoteErrorCode};
