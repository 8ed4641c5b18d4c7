//! Inert transport used where no real channel is configured.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream;
use svcbus_frame::Message;
use svcbus_transport::Endpoint;
use tracing::debug;

use crate::error::{PeerError, Result};
use crate::state::ConnectionState;
use crate::traits::{Client, ClientStream, ConnectionId, Listener, MessageStream};

/// A client that never connects. Sends fail; receive streams are empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClient;

#[async_trait]
impl Client for NullClient {
    fn id(&self) -> ConnectionId {
        0
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::Disconnected
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        debug!(%endpoint, "null client ignoring connect");
        Ok(())
    }

    fn send(&self, _message: Message) -> Result<()> {
        Err(PeerError::NotConnected(ConnectionState::Disconnected))
    }

    fn receive(&self) -> MessageStream {
        Box::pin(stream::empty())
    }

    fn disconnect(&self) {}
}

/// A listener that never yields a connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl Listener for NullListener {
    fn accept(&self) -> ClientStream {
        Box::pin(stream::pending::<Arc<dyn Client>>())
    }
}
