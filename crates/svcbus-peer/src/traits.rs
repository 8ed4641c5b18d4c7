use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_core::Stream;
use svcbus_frame::Message;
use svcbus_transport::Endpoint;

use crate::error::Result;
use crate::state::ConnectionState;

/// Identifier assigned to a connection when it is accepted.
pub type ConnectionId = u64;

/// Inbound messages of one connection, for one subscriber.
pub type MessageStream = Pin<Box<dyn Stream<Item = Message> + Send>>;

/// Connections produced by a [`Listener`].
pub type ClientStream = Pin<Box<dyn Stream<Item = Arc<dyn Client>> + Send>>;

/// One end of a duplex message channel.
#[async_trait]
pub trait Client: Send + Sync + fmt::Debug {
    /// Connection id (assigned by the accepting side; 0 until known).
    fn id(&self) -> ConnectionId;

    /// Current lifecycle state.
    fn state(&self) -> ConnectionState;

    /// Connect to `endpoint`, resolving once the peer acknowledges.
    ///
    /// Only acts from `Unbound`; in any other state this returns `Ok(())`
    /// without doing anything.
    async fn connect(&self, endpoint: &Endpoint) -> Result<()>;

    /// Transmit (`Connected`) or buffer (`Connecting`) a message.
    ///
    /// Fails with [`crate::PeerError::NotConnected`] in any other state.
    fn send(&self, message: Message) -> Result<()>;

    /// Subscribe to inbound messages.
    ///
    /// Every call returns an independent stream; all of them complete when
    /// the connection reaches `Disconnected`.
    fn receive(&self) -> MessageStream;

    /// Move to `Disconnected` and notify the peer. Idempotent.
    fn disconnect(&self);
}

/// Source of accepted connections.
pub trait Listener: Send + Sync {
    /// The sequence of newly accepted connections.
    ///
    /// The sequence is not restartable: only the first call yields
    /// connections.
    fn accept(&self) -> ClientStream;
}
