use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use svcbus_frame::{Frame, FrameCodec, FrameError, Message, CONTROL, MESSAGE};
use svcbus_transport::{Endpoint, IpcStream};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::config::PeerConfig;
use crate::control::ControlMessage;
use crate::error::{PeerError, Result};
use crate::handshake::handshake_client;
use crate::inbound::Inbound;
use crate::state::ConnectionState;
use crate::traits::{Client, ConnectionId, MessageStream};

pub(crate) type FrameSource = FramedRead<ReadHalf<IpcStream>, FrameCodec>;
pub(crate) type FrameSink = FramedWrite<WriteHalf<IpcStream>, FrameCodec>;

/// A [`Client`] speaking framed messages over an [`IpcStream`].
///
/// Outbound frames are handed to a writer task; a reader task fans inbound
/// messages out to every [`Client::receive`] subscriber. While `Connecting`,
/// sends are buffered and flushed in order once the handshake completes.
pub struct FramedClient {
    inner: Arc<Mutex<Inner>>,
    config: PeerConfig,
}

struct Inner {
    id: ConnectionId,
    state: ConnectionState,
    send_buffer: Vec<Frame>,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: Inbound,
    reader: Option<JoinHandle<()>>,
}

impl FramedClient {
    /// Create an unbound client.
    pub fn new(config: PeerConfig) -> Self {
        Self::with_state(0, ConnectionState::Unbound, config)
    }

    /// Wrap a stream whose handshake the listener has already completed.
    pub(crate) fn accepted(
        id: ConnectionId,
        source: FrameSource,
        sink: FrameSink,
        config: PeerConfig,
    ) -> Self {
        let client = Self::with_state(id, ConnectionState::Connecting, config);
        // Nothing else can observe the client yet, so the state is still Connecting.
        let _ = client.on_connected(id, source, sink);
        client
    }

    fn with_state(id: ConnectionId, state: ConnectionState, config: PeerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                id,
                state,
                send_buffer: Vec::new(),
                outbound: None,
                inbound: Inbound::default(),
                reader: None,
            })),
            config,
        }
    }

    /// Number of active receive subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.inner).inbound.subscriber_count()
    }

    async fn establish(&self, endpoint: &Endpoint) -> Result<(ConnectionId, FrameSource, FrameSink)> {
        let stream = endpoint.dial().await?;
        let (read_half, write_half) = tokio::io::split(stream);
        let codec = FrameCodec::with_config(self.config.frame_config());
        let mut source = FramedRead::new(read_half, codec.clone());
        let mut sink = FramedWrite::new(write_half, codec);

        let id = handshake_client(&mut source, &mut sink, &self.config).await?;
        Ok((id, source, sink))
    }

    fn on_connected(&self, id: ConnectionId, source: FrameSource, sink: FrameSink) -> Result<()> {
        let mut inner = lock(&self.inner);
        if inner.state != ConnectionState::Connecting {
            return Err(PeerError::Disconnected(
                "disconnected while connecting".to_string(),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        // The buffer is drained under the same lock that flips the state, so
        // buffered frames always precede frames sent after the transition.
        for frame in inner.send_buffer.drain(..) {
            let _ = tx.send(frame);
        }

        inner.id = id;
        inner.state = ConnectionState::Connected;
        inner.outbound = Some(tx);

        tokio::spawn(write_loop(sink, rx, Arc::downgrade(&self.inner), id));
        inner.reader = Some(tokio::spawn(read_loop(
            source,
            Arc::downgrade(&self.inner),
            id,
        )));

        info!(connection_id = id, "connection established");
        Ok(())
    }
}

#[async_trait]
impl Client for FramedClient {
    fn id(&self) -> ConnectionId {
        lock(&self.inner).id
    }

    fn state(&self) -> ConnectionState {
        lock(&self.inner).state
    }

    async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            if inner.state != ConnectionState::Unbound {
                debug!(state = %inner.state, "connect ignored; client already bound");
                return Ok(());
            }
            inner.state = ConnectionState::Connecting;
        }

        debug!(%endpoint, "connecting");
        match self.establish(endpoint).await {
            Ok((id, source, sink)) => self.on_connected(id, source, sink),
            Err(err) => {
                warn!(%endpoint, error = %err, "connect failed");
                mark_disconnected(&mut lock(&self.inner), "connect failed");
                Err(err)
            }
        }
    }

    fn send(&self, message: Message) -> Result<()> {
        let frame = message.to_frame()?;
        if frame.payload.len() > self.config.max_payload_size {
            return Err(FrameError::PayloadTooLarge {
                size: frame.payload.len(),
                max: self.config.max_payload_size,
            }
            .into());
        }

        let mut inner = lock(&self.inner);
        match inner.state {
            ConnectionState::Connected => match &inner.outbound {
                Some(tx) => tx
                    .send(frame)
                    .map_err(|_| PeerError::Disconnected("writer closed".to_string())),
                None => Err(PeerError::NotConnected(inner.state)),
            },
            ConnectionState::Connecting => {
                inner.send_buffer.push(frame);
                Ok(())
            }
            state => Err(PeerError::NotConnected(state)),
        }
    }

    fn receive(&self) -> MessageStream {
        lock(&self.inner).inbound.subscribe()
    }

    fn disconnect(&self) {
        let mut inner = lock(&self.inner);
        if inner.state == ConnectionState::Disconnected {
            return;
        }

        if let Some(tx) = &inner.outbound {
            if let Ok(frame) = ControlMessage::disconnect().to_frame() {
                let _ = tx.send(frame);
            }
        }
        if let Some(reader) = inner.reader.take() {
            reader.abort();
        }
        mark_disconnected(&mut inner, "local disconnect");
    }
}

impl Drop for FramedClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for FramedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("FramedClient")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("buffered", &inner.send_buffer.len())
            .finish()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transition to the terminal state. Dropping the outbound sender lets the
/// writer flush what is queued and then close its half of the stream.
fn mark_disconnected(inner: &mut Inner, reason: &str) {
    if inner.state == ConnectionState::Disconnected {
        return;
    }
    inner.state = ConnectionState::Disconnected;
    inner.outbound = None;
    inner.send_buffer.clear();
    inner.inbound.close();
    debug!(connection_id = inner.id, reason, "connection disconnected");
}

async fn write_loop(
    mut sink: FrameSink,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    inner: Weak<Mutex<Inner>>,
    id: ConnectionId,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(err) = sink.send(frame).await {
            debug!(connection_id = id, error = %err, "write failed");
            if let Some(inner) = inner.upgrade() {
                mark_disconnected(&mut lock(&inner), "write failed");
            }
            return;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(mut source: FrameSource, inner: Weak<Mutex<Inner>>, id: ConnectionId) {
    let reason = loop {
        let frame = match source.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(err)) => {
                debug!(connection_id = id, error = %err, "read failed");
                break "read failed";
            }
            None => break "connection closed",
        };

        match frame.channel {
            MESSAGE => match Message::from_frame(&frame) {
                Ok(message) => {
                    let Some(inner) = inner.upgrade() else {
                        return;
                    };
                    lock(&inner).inbound.dispatch(message);
                }
                Err(err) => {
                    warn!(connection_id = id, error = %err, "dropping malformed message");
                }
            },
            CONTROL => match ControlMessage::from_payload(&frame.payload) {
                Ok(ControlMessage::Disconnect) => break "peer disconnected",
                Ok(other) => debug!(connection_id = id, ?other, "ignoring control message"),
                Err(err) => warn!(connection_id = id, error = %err, "malformed control message"),
            },
            other => debug!(connection_id = id, channel = other, "ignoring frame on unknown channel"),
        }
    };

    if let Some(inner) = inner.upgrade() {
        mark_disconnected(&mut lock(&inner), reason);
    }
}
