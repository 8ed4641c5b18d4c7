//! Connect handshake on the CONTROL channel.
//!
//! ```text
//! client                          listener
//!   │  {"type":"connect", ...}        │
//!   │ ──────────────────────────────▶ │
//!   │  {"type":"connected", id: N}    │
//!   │ ◀────────────────────────────── │
//! ```

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use svcbus_frame::{channel_name, Frame, FrameError, CONTROL};
use tracing::debug;

use crate::config::PeerConfig;
use crate::control::ControlMessage;
use crate::error::{PeerError, Result};
use crate::traits::ConnectionId;

const MAX_PROTOCOL_LEN: usize = 32;

/// Perform the client side of the handshake; returns the assigned connection id.
pub async fn handshake_client<R, W>(
    reader: &mut R,
    writer: &mut W,
    config: &PeerConfig,
) -> Result<ConnectionId>
where
    R: Stream<Item = std::result::Result<Frame, FrameError>> + Unpin,
    W: Sink<Frame, Error = FrameError> + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;

    writer
        .send(ControlMessage::connect(&config.protocol_name).to_frame()?)
        .await?;

    match recv_control(reader, config.handshake_timeout).await? {
        ControlMessage::Connected {
            protocol,
            connection_id,
        } => {
            check_protocol(&protocol, &config.protocol_name)?;
            debug!(connection_id, "handshake acknowledged");
            Ok(connection_id)
        }
        ControlMessage::Disconnect => Err(PeerError::Disconnected(
            "listener closed the connection during handshake".to_string(),
        )),
        other => Err(PeerError::HandshakeFailed(format!(
            "expected connected acknowledgement, got {other:?}"
        ))),
    }
}

/// Perform the listener side of the handshake, assigning `connection_id`.
pub async fn handshake_server<R, W>(
    reader: &mut R,
    writer: &mut W,
    connection_id: ConnectionId,
    config: &PeerConfig,
) -> Result<()>
where
    R: Stream<Item = std::result::Result<Frame, FrameError>> + Unpin,
    W: Sink<Frame, Error = FrameError> + Unpin,
{
    validate_protocol_name(&config.protocol_name)?;

    match recv_control(reader, config.handshake_timeout).await? {
        ControlMessage::Connect { protocol } => {
            validate_protocol_name(&protocol)?;
            check_protocol(&protocol, &config.protocol_name)?;
        }
        other => {
            return Err(PeerError::HandshakeFailed(format!(
                "expected connect request, got {other:?}"
            )))
        }
    }

    writer
        .send(ControlMessage::connected(&config.protocol_name, connection_id).to_frame()?)
        .await?;
    Ok(())
}

async fn recv_control<R>(reader: &mut R, timeout: Duration) -> Result<ControlMessage>
where
    R: Stream<Item = std::result::Result<Frame, FrameError>> + Unpin,
{
    let frame = match tokio::time::timeout(timeout, reader.next()).await {
        Err(_) => return Err(PeerError::Timeout(timeout)),
        Ok(None) => {
            return Err(PeerError::Disconnected(
                "connection closed during handshake".to_string(),
            ))
        }
        Ok(Some(frame)) => frame?,
    };

    if frame.channel != CONTROL {
        return Err(PeerError::HandshakeFailed(format!(
            "expected CONTROL channel, got {} ({})",
            frame.channel,
            channel_name(frame.channel)
        )));
    }
    ControlMessage::from_payload(&frame.payload)
        .map_err(|err| PeerError::HandshakeFailed(format!("malformed control message: {err}")))
}

fn check_protocol(remote: &str, local: &str) -> Result<()> {
    if remote != local {
        return Err(PeerError::HandshakeFailed(format!(
            "unknown protocol '{remote}' (expected '{local}')"
        )));
    }
    Ok(())
}

fn validate_protocol_name(protocol: &str) -> Result<()> {
    if protocol.is_empty() || protocol.len() > MAX_PROTOCOL_LEN {
        return Err(PeerError::HandshakeFailed(format!(
            "invalid protocol name length: {}",
            protocol.len()
        )));
    }
    Ok(())
}
