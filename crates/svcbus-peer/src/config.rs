use std::time::Duration;

use svcbus_frame::{FrameConfig, DEFAULT_MAX_PAYLOAD};

/// Default protocol name exchanged during the handshake.
pub const DEFAULT_PROTOCOL: &str = "svcbus";

/// Connection behavior shared by clients and listeners.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Time allowed for the connect handshake.
    pub handshake_timeout: Duration,
    /// Protocol name both sides must agree on.
    pub protocol_name: String,
    /// Maximum frame payload in either direction.
    pub max_payload_size: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            protocol_name: DEFAULT_PROTOCOL.to_string(),
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl PeerConfig {
    pub(crate) fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_payload_size: self.max_payload_size,
        }
    }
}
