//! Client proxy: correlated calls and multicast event streams over one
//! [`Client`].

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use svcbus_frame::{Message, MessageKind, RemoteError};
use svcbus_peer::{Client, ConnectionState, MessageStream};
use svcbus_transport::Endpoint;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::args::encode_args;
use crate::config::ClientConfig;
use crate::error::{Result, ServiceError};

type EventSender = mpsc::UnboundedSender<Result<Value>>;

/// Calls methods and subscribes to events exposed by a remote
/// [`crate::ServiceServer`].
///
/// Replies are matched to calls by a strictly increasing correlation id.
/// Event streams are shared per name: only the first local
/// [`ServiceClient::listen`] sends `Listen`, and `Mute` is sent once the last
/// local stream for that name is dropped or [`ServiceClient::unlisten`] is
/// called.
pub struct ServiceClient {
    shared: Arc<ClientShared>,
    router: JoinHandle<()>,
}

struct ClientShared {
    client: Arc<dyn Client>,
    config: ClientConfig,
    state: Mutex<ClientState>,
}

#[derive(Default)]
struct ClientState {
    last_id: u64,
    last_stream_key: u64,
    pending: HashMap<u64, Pending>,
    topics: HashMap<String, HashMap<u64, EventSender>>,
    disposed: bool,
}

enum Pending {
    Call(oneshot::Sender<Result<Value>>),
    Listen(String),
}

impl ClientState {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }
}

impl ServiceClient {
    /// Wrap `client`. Must be called from within a Tokio runtime.
    pub fn new(client: Arc<dyn Client>, config: ClientConfig) -> Self {
        let inbound = client.receive();
        let shared = Arc::new(ClientShared {
            client,
            config,
            state: Mutex::new(ClientState::default()),
        });
        let router = tokio::spawn(route(inbound, Arc::downgrade(&shared)));
        Self { shared, router }
    }

    /// Connect the underlying transport.
    ///
    /// Calls made while this is in flight are buffered by the transport and
    /// sent once the connection is up.
    pub async fn connect(&self, endpoint: &Endpoint) -> Result<()> {
        self.shared.client.connect(endpoint).await?;
        info!(%endpoint, connection_id = self.shared.client.id(), "service client connected");
        Ok(())
    }

    /// State of the underlying transport.
    pub fn state(&self) -> ConnectionState {
        self.shared.client.state()
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.shared
            .lock()
            .pending
            .values()
            .filter(|pending| matches!(pending, Pending::Call(_)))
            .count()
    }

    /// Invoke `<service>.<method>` with positional `args`.
    ///
    /// `()` sends no arguments, a tuple sends one argument per element.
    pub async fn call<A, T>(&self, name: &str, args: A) -> Result<T>
    where
        A: Serialize,
        T: DeserializeOwned,
    {
        let args = encode_args(args)?;
        let (tx, rx) = oneshot::channel();
        let id = {
            let mut state = self.shared.lock();
            if state.disposed {
                return Err(ServiceError::Disposed);
            }
            let id = state.next_id();
            state.pending.insert(id, Pending::Call(tx));
            id
        };
        let _pending = PendingGuard {
            shared: &self.shared,
            id,
        };

        debug!(id, name, "calling");
        self.shared.client.send(Message::call(id, name, args))?;

        let outcome = match self.shared.config.call_timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| ServiceError::Timeout(limit))?,
            None => rx.await,
        };
        let value = outcome.map_err(|_| ServiceError::Disposed)??;
        Ok(serde_json::from_value(value)?)
    }

    /// Subscribe to `<service>.<event>`.
    ///
    /// The stream ends when the event completes, when it is muted or the
    /// client disposed, or after yielding an error (unknown event, source
    /// failure, send failure).
    pub fn listen<T: DeserializeOwned>(&self, name: &str) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (key, request) = {
            let mut state = self.shared.lock();
            if state.disposed {
                let _ = tx.send(Err(ServiceError::Disposed));
                return EventStream::new(name, 0, rx, Weak::new());
            }
            state.last_stream_key += 1;
            let key = state.last_stream_key;
            let request = if let Some(streams) = state.topics.get_mut(name) {
                streams.insert(key, tx);
                None
            } else {
                state.topics.insert(name.to_string(), HashMap::from([(key, tx)]));
                let id = state.next_id();
                state.pending.insert(id, Pending::Listen(name.to_string()));
                Some(id)
            };
            (key, request)
        };

        if let Some(id) = request {
            debug!(id, name, "listening");
            if let Err(err) = self.shared.client.send(Message::listen(id, name)) {
                self.shared.lock().pending.remove(&id);
                let err = ServiceError::from(err);
                let not_connected = matches!(err, ServiceError::NotConnected);
                let reason = err.to_string();
                self.shared.fail_topic(name, || {
                    if not_connected {
                        ServiceError::NotConnected
                    } else {
                        ServiceError::TransportFailure(reason.clone())
                    }
                });
            }
        }

        EventStream::new(name, key, rx, Arc::downgrade(&self.shared))
    }

    /// Mute `name` and complete every local stream for it. Unknown names are
    /// ignored.
    pub fn unlisten(&self, name: &str) {
        let mute = {
            let mut state = self.shared.lock();
            match state.topics.remove(name) {
                Some(_) if !state.disposed => Some(state.next_id()),
                _ => None,
            }
        };
        if let Some(id) = mute {
            self.shared.send_mute(id, name);
        }
    }

    /// Mute every open stream, complete them, reject every pending call with
    /// [`ServiceError::Disposed`] and disconnect the transport. Idempotent.
    pub fn dispose(&self) {
        let (mutes, topics, pending) = {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let topics = std::mem::take(&mut state.topics);
            let mutes: Vec<(u64, String)> = topics
                .keys()
                .map(|name| (state.next_id(), name.clone()))
                .collect();
            (mutes, topics, std::mem::take(&mut state.pending))
        };

        for (id, name) in &mutes {
            self.shared.send_mute(*id, name);
        }
        drop(topics);

        let mut rejected = 0usize;
        for (_, pending) in pending {
            if let Pending::Call(reply) = pending {
                let _ = reply.send(Err(ServiceError::Disposed));
                rejected += 1;
            }
        }

        self.shared.client.disconnect();
        self.router.abort();
        info!(streams = mutes.len(), rejected, "service client disposed");
    }
}

impl Drop for ServiceClient {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for ServiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("ServiceClient")
            .field("client", &self.shared.client)
            .field("pending", &state.pending.len())
            .field("topics", &state.topics.keys().collect::<Vec<_>>())
            .field("disposed", &state.disposed)
            .finish()
    }
}

/// Removes a call's pending entry when the call future finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a ClientShared,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().pending.remove(&self.id);
    }
}

async fn route(mut inbound: MessageStream, shared: Weak<ClientShared>) {
    while let Some(message) = inbound.next().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.route(message);
    }

    if let Some(shared) = shared.upgrade() {
        debug!("transport closed; failing outstanding calls");
        shared.fail_all();
    }
}

impl ClientShared {
    fn lock(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn route(&self, message: Message) {
        match (message.kind, message.id) {
            (MessageKind::Return, Some(id)) => self.resolve(id, message.data.unwrap_or(Value::Null)),
            (MessageKind::Error, Some(id)) => self.reject(id, &message.remote_error()),
            (MessageKind::Error, None) => {
                let error = message.remote_error();
                warn!(name = %message.name, reason = %error.message, "event failed");
                self.fail_topic(&message.name, || ServiceError::from_remote(&error));
            }
            (MessageKind::Next, _) => self.publish(&message.name, message.data.unwrap_or(Value::Null)),
            (MessageKind::Complete, _) => {
                if self.lock().topics.remove(&message.name).is_some() {
                    debug!(name = %message.name, "event completed");
                }
            }
            (kind, id) => {
                debug!(kind = kind.as_str(), ?id, name = %message.name, "ignoring unexpected message");
            }
        }
    }

    fn resolve(&self, id: u64, value: Value) {
        let pending = self.lock().pending.remove(&id);
        match pending {
            Some(Pending::Call(reply)) => {
                let _ = reply.send(Ok(value));
            }
            Some(Pending::Listen(name)) => debug!(id, %name, "listen acknowledged"),
            None => debug!(id, "reply for unknown or expired call"),
        }
    }

    fn reject(&self, id: u64, error: &RemoteError) {
        let pending = self.lock().pending.remove(&id);
        match pending {
            Some(Pending::Call(reply)) => {
                let _ = reply.send(Err(ServiceError::from_remote(error)));
            }
            Some(Pending::Listen(name)) => {
                warn!(id, %name, reason = %error.message, "listen rejected");
                self.fail_topic(&name, || ServiceError::from_remote(error));
            }
            None => debug!(id, "error for unknown or expired call"),
        }
    }

    fn publish(&self, name: &str, value: Value) {
        let state = self.lock();
        match state.topics.get(name) {
            Some(streams) => {
                for stream in streams.values() {
                    let _ = stream.send(Ok(value.clone()));
                }
            }
            None => debug!(name, "push for event with no local streams"),
        }
    }

    /// Error and end every local stream for `name`.
    fn fail_topic(&self, name: &str, error: impl Fn() -> ServiceError) {
        let streams = self.lock().topics.remove(name);
        for stream in streams.into_iter().flat_map(HashMap::into_values) {
            let _ = stream.send(Err(error()));
        }
    }

    /// Transport is gone: reject every call and end every stream.
    fn fail_all(&self) {
        let (pending, topics) = {
            let mut state = self.lock();
            (std::mem::take(&mut state.pending), std::mem::take(&mut state.topics))
        };
        for (_, pending) in pending {
            if let Pending::Call(reply) = pending {
                let _ = reply.send(Err(ServiceError::TransportFailure(
                    "connection closed".to_string(),
                )));
            }
        }
        drop(topics);
    }

    /// A local stream went away; mute the event once no stream is left.
    fn release(&self, name: &str, key: u64) {
        let mute = {
            let mut state = self.lock();
            let Some(streams) = state.topics.get_mut(name) else {
                return;
            };
            streams.remove(&key);
            if !streams.is_empty() {
                return;
            }
            state.topics.remove(name);
            if state.disposed {
                return;
            }
            state.next_id()
        };
        self.send_mute(mute, name);
    }

    fn send_mute(&self, id: u64, name: &str) {
        debug!(id, name, "muting");
        if let Err(err) = self.client.send(Message::mute(id, name)) {
            debug!(name, error = %err, "mute not sent");
        }
    }
}

/// Values pushed for one event, decoded as `T`.
pub struct EventStream<T> {
    name: String,
    key: u64,
    rx: mpsc::UnboundedReceiver<Result<Value>>,
    shared: Weak<ClientShared>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> EventStream<T> {
    fn new(
        name: &str,
        key: u64,
        rx: mpsc::UnboundedReceiver<Result<Value>>,
        shared: Weak<ClientShared>,
    ) -> Self {
        Self {
            name: name.to_string(),
            key,
            rx,
            shared,
            _marker: PhantomData,
        }
    }

    /// Qualified event name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: DeserializeOwned> Stream for EventStream<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx).map(|item| {
            item.map(|value| value.and_then(|value| Ok(serde_json::from_value(value)?)))
        })
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.release(&self.name, self.key);
        }
    }
}

impl<T> fmt::Debug for EventStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream").field("name", &self.name).finish()
    }
}
