//! In-crate test double for the transport capability.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use svcbus_frame::{Message, MessageKind};
use svcbus_peer::{Client, ConnectionId, ConnectionState, MessageStream, PeerError};
use svcbus_transport::Endpoint;
use tokio::sync::mpsc;

/// A client that records what is sent and lets tests inject inbound messages.
#[derive(Debug)]
pub(crate) struct RecordingClient {
    id: ConnectionId,
    inner: Mutex<Recorded>,
}

#[derive(Debug)]
struct Recorded {
    state: ConnectionState,
    sent: Vec<Message>,
    subscribers: Vec<mpsc::UnboundedSender<Message>>,
}

impl RecordingClient {
    pub(crate) fn new(id: ConnectionId) -> Arc<Self> {
        Arc::new(Self {
            id,
            inner: Mutex::new(Recorded {
                state: ConnectionState::Connected,
                sent: Vec::new(),
                subscribers: Vec::new(),
            }),
        })
    }

    pub(crate) fn sent(&self) -> Vec<Message> {
        self.inner.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_kinds(&self) -> Vec<MessageKind> {
        self.sent().iter().map(|message| message.kind).collect()
    }

    /// Deliver `message` to every receive subscriber.
    pub(crate) fn push(&self, message: Message) {
        let inner = self.inner.lock().unwrap();
        for subscriber in &inner.subscribers {
            let _ = subscriber.send(message.clone());
        }
    }

    /// Simulate the peer going away.
    pub(crate) fn drop_connection(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = ConnectionState::Disconnected;
        inner.subscribers.clear();
    }

    pub(crate) async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("expected {count} sent messages, got {sent:?}");
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl Client for RecordingClient {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    async fn connect(&self, _endpoint: &Endpoint) -> svcbus_peer::Result<()> {
        Ok(())
    }

    fn send(&self, message: Message) -> svcbus_peer::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.state.can_send() {
            return Err(PeerError::NotConnected(inner.state));
        }
        inner.sent.push(message);
        Ok(())
    }

    fn receive(&self) -> MessageStream {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Disconnected {
            inner.subscribers.push(tx);
        }
        Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)))
    }

    fn disconnect(&self) {
        self.drop_connection();
    }
}
