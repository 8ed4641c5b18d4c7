use bytes::Bytes;
use serde::{Deserialize, Serialize};
use svcbus_frame::{Frame, CONTROL};

use crate::error::Result;

/// CONTROL channel message payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Client asks to open a connection.
    Connect { protocol: String },
    /// Listener acknowledges and assigns the connection id.
    Connected { protocol: String, connection_id: u64 },
    /// Either side is going away.
    Disconnect,
}

impl ControlMessage {
    pub fn connect(protocol: &str) -> Self {
        ControlMessage::Connect {
            protocol: protocol.to_string(),
        }
    }

    pub fn connected(protocol: &str, connection_id: u64) -> Self {
        ControlMessage::Connected {
            protocol: protocol.to_string(),
            connection_id,
        }
    }

    pub fn disconnect() -> Self {
        ControlMessage::Disconnect
    }

    /// Encode as a CONTROL frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Ok(Frame::new(CONTROL, Bytes::from(serde_json::to_vec(self)?)))
    }

    /// Decode a CONTROL frame payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_wire_shape() {
        let frame = ControlMessage::connected("svcbus", 7).to_frame().unwrap();
        assert_eq!(frame.channel, CONTROL);
        let value: serde_json::Value = serde_json::from_slice(&frame.payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "type": "connected", "protocol": "svcbus", "connection_id": 7 })
        );
    }

    #[test]
    fn disconnect_parses() {
        let msg = ControlMessage::from_payload(br#"{"type":"disconnect"}"#).unwrap();
        assert_eq!(msg, ControlMessage::Disconnect);
    }

    #[test]
    fn unknown_control_type_is_rejected() {
        assert!(ControlMessage::from_payload(br#"{"type":"ping"}"#).is_err());
    }
}
