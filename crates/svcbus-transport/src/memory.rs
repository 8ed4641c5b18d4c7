//! In-process duplex channel.
//!
//! A [`MemoryAcceptor`]/[`MemoryConnector`] pair behaves like a bound socket
//! and its address: every `connect` creates a fresh duplex pipe and hands the
//! far end to the acceptor.

use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::IpcStream;

/// Default per-direction buffer of an in-process pipe.
pub const DEFAULT_MEMORY_CAPACITY: usize = 64 * 1024;

/// Create an in-process acceptor and the connector that dials it.
pub fn memory_channel() -> (MemoryAcceptor, MemoryConnector) {
    memory_channel_with_capacity(DEFAULT_MEMORY_CAPACITY)
}

/// Create an in-process acceptor/connector pair with an explicit pipe buffer size.
pub fn memory_channel_with_capacity(capacity: usize) -> (MemoryAcceptor, MemoryConnector) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryAcceptor { incoming: rx },
        MemoryConnector {
            outgoing: tx,
            capacity,
        },
    )
}

/// Accepting side of an in-process channel.
#[derive(Debug)]
pub struct MemoryAcceptor {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl MemoryAcceptor {
    /// Wait for the next connection.
    ///
    /// Returns [`TransportError::Shutdown`] once every connector has been dropped.
    pub async fn accept(&mut self) -> Result<IpcStream> {
        let stream = self.incoming.recv().await.ok_or(TransportError::Shutdown)?;
        debug!("accepted in-process connection");
        Ok(IpcStream::from_memory(stream))
    }
}

/// Dialing side of an in-process channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    outgoing: mpsc::UnboundedSender<DuplexStream>,
    capacity: usize,
}

impl MemoryConnector {
    /// Open a new connection to the paired acceptor.
    ///
    /// Fails with [`TransportError::AcceptorClosed`] once the acceptor is dropped.
    pub fn connect(&self) -> Result<IpcStream> {
        let (local, remote) = tokio::io::duplex(self.capacity);
        self.outgoing
            .send(remote)
            .map_err(|_| TransportError::AcceptorClosed)?;
        Ok(IpcStream::from_memory(local))
    }
}
