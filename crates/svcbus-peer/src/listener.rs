#[cfg(unix)]
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::stream;
use svcbus_frame::FrameCodec;
use svcbus_transport::{Acceptor, IpcStream, TransportError};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::config::PeerConfig;
#[cfg(unix)]
use crate::error::Result;
use crate::framed::FramedClient;
use crate::handshake::handshake_server;
use crate::traits::{Client, ClientStream, ConnectionId, Listener};

/// A [`Listener`] that accepts framed connections from an [`Acceptor`].
///
/// Each accepted stream is handshaken on the CONTROL channel and assigned a
/// connection id from a counter owned by this listener, starting at 1.
/// Handshakes run concurrently, so a peer that never completes one does not
/// hold up the connections behind it.
#[derive(Debug)]
pub struct FramedListener {
    acceptor: Mutex<Option<Acceptor>>,
    config: PeerConfig,
    next_connection_id: Arc<AtomicU64>,
}

impl FramedListener {
    pub fn new(acceptor: impl Into<Acceptor>) -> Self {
        Self::with_config(acceptor, PeerConfig::default())
    }

    pub fn with_config(acceptor: impl Into<Acceptor>, config: PeerConfig) -> Self {
        Self {
            acceptor: Mutex::new(Some(acceptor.into())),
            config,
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bind a Unix domain socket at `path`.
    #[cfg(unix)]
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(svcbus_transport::UnixDomainSocket::bind(path)?))
    }
}

impl Listener for FramedListener {
    fn accept(&self) -> ClientStream {
        let taken = self
            .acceptor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(acceptor) = taken else {
            warn!("listener already accepting; returning empty stream");
            return Box::pin(stream::empty());
        };

        let accept_loop = AcceptLoop {
            acceptor,
            config: self.config.clone(),
            next_connection_id: Arc::clone(&self.next_connection_id),
        };
        // The loop task is spawned on first poll so `accept` works outside a runtime.
        Box::pin(stream::unfold(AcceptState::Idle(accept_loop), |state| async move {
            let mut ready = match state {
                AcceptState::Idle(accept_loop) => {
                    let (tx, rx) = mpsc::unbounded_channel();
                    tokio::spawn(accept_loop.run(tx));
                    rx
                }
                AcceptState::Running(rx) => rx,
            };
            let client = ready.recv().await?;
            Some((client, AcceptState::Running(ready)))
        }))
    }
}

/// Pause after a failed accept before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(50);

enum AcceptState {
    Idle(AcceptLoop),
    Running(mpsc::UnboundedReceiver<Arc<dyn Client>>),
}

struct AcceptLoop {
    acceptor: Acceptor,
    config: PeerConfig,
    next_connection_id: Arc<AtomicU64>,
}

impl AcceptLoop {
    /// Accept streams and handshake each one on its own task, forwarding
    /// connected clients to `ready` in completion order. Ends when the
    /// acceptor shuts down and in-flight handshakes settle, or as soon as the
    /// accept stream is dropped.
    async fn run(mut self, ready: mpsc::UnboundedSender<Arc<dyn Client>>) {
        let mut handshakes = JoinSet::new();
        loop {
            tokio::select! {
                _ = ready.closed() => return,
                Some(joined) = handshakes.join_next(), if !handshakes.is_empty() => {
                    if !forward(&ready, joined) {
                        return;
                    }
                }
                accepted = self.acceptor.accept() => match accepted {
                    Ok(stream) => {
                        let id: ConnectionId = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
                        handshakes.spawn(handshake(stream, id, self.config.clone()));
                    }
                    Err(err) if err.is_terminal() => {
                        info!("acceptor shut down; no more connections");
                        break;
                    }
                    Err(err) => back_off(&err).await,
                },
            }
        }

        while let Some(joined) = handshakes.join_next().await {
            if !forward(&ready, joined) {
                return;
            }
        }
    }
}

/// Hand a finished handshake to the accept stream; false once nobody listens.
fn forward(
    ready: &mpsc::UnboundedSender<Arc<dyn Client>>,
    joined: std::result::Result<Option<Arc<dyn Client>>, JoinError>,
) -> bool {
    match joined {
        Ok(Some(client)) => ready.send(client).is_ok(),
        Ok(None) => true,
        Err(err) => {
            error!(error = %err, "handshake task failed");
            true
        }
    }
}

async fn handshake(stream: IpcStream, id: ConnectionId, config: PeerConfig) -> Option<Arc<dyn Client>> {
    let transport = stream.transport_name();
    let (read_half, write_half) = tokio::io::split(stream);
    let codec = FrameCodec::with_config(config.frame_config());
    let mut source = FramedRead::new(read_half, codec.clone());
    let mut sink = FramedWrite::new(write_half, codec);

    match handshake_server(&mut source, &mut sink, id, &config).await {
        Ok(()) => {
            debug!(connection_id = id, transport, "accepted connection");
            Some(Arc::new(FramedClient::accepted(id, source, sink, config)))
        }
        Err(err) => {
            warn!(connection_id = id, error = %err, "handshake failed; dropping connection");
            None
        }
    }
}

async fn back_off(err: &TransportError) {
    error!(error = %err, retry_in = ?ACCEPT_RETRY_DELAY, "accept failed");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}
