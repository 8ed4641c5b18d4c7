//! Server-side bindings between a qualified name and a service member.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use serde_json::Value;
use svcbus_frame::{Message, RemoteError, RemoteErrorCode};
use svcbus_peer::{Client, ConnectionId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::descriptor::MethodFn;

type Invoker = Box<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One callable method. Holds only a weak reference to its service.
pub(crate) struct CallBinding {
    name: String,
    invoker: Mutex<Option<Invoker>>,
}

impl CallBinding {
    pub(crate) fn new<S: Send + Sync + 'static>(
        name: String,
        service: Weak<S>,
        method: MethodFn<S>,
    ) -> Self {
        let invoker: Invoker = Box::new(move |data: Option<Value>| match service.upgrade() {
            Some(service) => method(service, data),
            None => async { Err::<Value, String>("service is no longer available".to_string()) }.boxed(),
        });
        Self {
            name,
            invoker: Mutex::new(Some(invoker)),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Invoke with the raw `Call` payload.
    pub(crate) async fn invoke(&self, data: Option<Value>) -> Result<Value, String> {
        let invocation = match lock(&self.invoker).as_ref() {
            Some(invoker) => invoker(data),
            None => return Err(format!("{} has been disposed", self.name)),
        };
        invocation.await
    }

    pub(crate) fn dispose(&self) {
        lock(&self.invoker).take();
    }
}

/// One event source and the connections subscribed to it.
///
/// The source is consumed by a single emission task; each emission is pushed
/// to every subscriber. Completion, a source failure or disposal closes the
/// binding for good.
pub(crate) struct EventBinding {
    name: String,
    subscribers: Mutex<Subscribers>,
    stop: CancellationToken,
}

#[derive(Default)]
struct Subscribers {
    clients: HashMap<ConnectionId, Arc<dyn Client>>,
    closed: bool,
}

impl EventBinding {
    pub(crate) fn new(name: String, stop: CancellationToken) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Subscribers::default()),
            stop,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Start consuming `source` on a background task.
    pub(crate) fn spawn(self: &Arc<Self>, source: BoxStream<'static, Result<Value, String>>) {
        tokio::spawn(Arc::clone(self).run(source));
    }

    async fn run(self: Arc<Self>, mut source: BoxStream<'static, Result<Value, String>>) {
        loop {
            let item = tokio::select! {
                _ = self.stop.cancelled() => return,
                item = source.next() => item,
            };
            match item {
                Some(Ok(value)) => self.broadcast(|| Message::next(self.name.as_str(), value.clone())),
                Some(Err(reason)) => {
                    warn!(event = %self.name, %reason, "event source failed");
                    let error = RemoteError::new(RemoteErrorCode::EventSourceFailure, reason);
                    self.close(Message::source_error(self.name.as_str(), &error));
                    return;
                }
                None => {
                    info!(event = %self.name, "event source completed");
                    self.close(Message::complete(self.name.as_str()));
                    return;
                }
            }
        }
    }

    /// Add a subscriber. Returns `false` if the binding is already closed.
    pub(crate) fn subscribe(&self, client: Arc<dyn Client>) -> bool {
        let mut subscribers = lock(&self.subscribers);
        if subscribers.closed {
            return false;
        }
        subscribers.clients.insert(client.id(), client);
        true
    }

    /// Remove a subscriber; unknown connections are ignored.
    pub(crate) fn unsubscribe(&self, connection_id: ConnectionId) -> bool {
        lock(&self.subscribers).clients.remove(&connection_id).is_some()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).clients.len()
    }

    /// Stop the source, push `Complete` and drop every subscriber.
    pub(crate) fn dispose(&self) {
        self.stop.cancel();
        self.close(Message::complete(self.name.as_str()));
    }

    fn broadcast(&self, message: impl Fn() -> Message) {
        let subscribers = lock(&self.subscribers);
        for (id, client) in &subscribers.clients {
            if let Err(err) = client.send(message()) {
                debug!(event = %self.name, connection_id = id, error = %err, "dropping event push");
            }
        }
    }

    fn close(&self, last: Message) {
        let clients = {
            let mut subscribers = lock(&self.subscribers);
            if subscribers.closed {
                return;
            }
            subscribers.closed = true;
            std::mem::take(&mut subscribers.clients)
        };
        for (id, client) in clients {
            if let Err(err) = client.send(last.clone()) {
                debug!(event = %self.name, connection_id = id, error = %err, "dropping final event push");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::stream;
    use serde_json::json;
    use svcbus_frame::MessageKind;

    use super::*;
    use crate::testing::RecordingClient;

    #[tokio::test]
    async fn call_binding_fails_once_service_is_gone() {
        struct Svc;
        let service = Arc::new(Svc);
        let method: MethodFn<Svc> = Arc::new(|_svc: Arc<Svc>, _data: Option<Value>| {
            async { Ok::<Value, String>(json!("ok")) }.boxed()
        });
        let binding = CallBinding::new("svc.ping".to_string(), Arc::downgrade(&service), method);

        assert_eq!(binding.invoke(None).await, Ok(json!("ok")));
        drop(service);
        assert!(binding.invoke(None).await.is_err());
    }

    #[tokio::test]
    async fn call_binding_dispose_rejects_later_calls() {
        struct Svc;
        let service = Arc::new(Svc);
        let method: MethodFn<Svc> = Arc::new(|_svc: Arc<Svc>, _data: Option<Value>| {
            async { Ok::<Value, String>(Value::Null) }.boxed()
        });
        let binding = CallBinding::new("svc.ping".to_string(), Arc::downgrade(&service), method);
        binding.dispose();
        let err = binding.invoke(None).await.unwrap_err();
        assert!(err.contains("disposed"));
    }

    #[tokio::test]
    async fn emissions_fan_out_once_per_subscriber() {
        let binding = Arc::new(EventBinding::new("clock.tick".to_string(), CancellationToken::new()));
        let a = RecordingClient::new(1);
        let b = RecordingClient::new(2);
        assert!(binding.subscribe(a.clone()));
        assert!(binding.subscribe(b.clone()));
        assert!(binding.subscribe(b.clone()));
        assert_eq!(binding.subscriber_count(), 2);

        binding.broadcast(|| Message::next("clock.tick", json!(7)));
        assert_eq!(a.sent_kinds(), [MessageKind::Next]);
        assert_eq!(b.sent_kinds(), [MessageKind::Next]);

        assert!(binding.unsubscribe(2));
        assert!(!binding.unsubscribe(2));
        binding.broadcast(|| Message::next("clock.tick", json!(8)));
        assert_eq!(a.sent().len(), 2);
        assert_eq!(b.sent().len(), 1);
    }

    #[tokio::test]
    async fn completion_closes_binding() {
        let binding = Arc::new(EventBinding::new("clock.tick".to_string(), CancellationToken::new()));
        let a = RecordingClient::new(1);
        binding.subscribe(a.clone());
        binding.spawn(stream::iter([Ok(json!(1))]).boxed());

        a.wait_for(2, Duration::from_secs(1)).await;
        assert_eq!(a.sent_kinds(), [MessageKind::Next, MessageKind::Complete]);
        assert!(!binding.subscribe(RecordingClient::new(3)));
        assert_eq!(binding.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn source_failure_is_pushed_and_closes() {
        let binding = Arc::new(EventBinding::new("sensor.read".to_string(), CancellationToken::new()));
        let a = RecordingClient::new(1);
        binding.subscribe(a.clone());
        binding.spawn(stream::iter([Ok(json!(1)), Err("offline".to_string()), Ok(json!(2))]).boxed());

        a.wait_for(2, Duration::from_secs(1)).await;
        let sent = a.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].kind, MessageKind::Error);
        assert_eq!(sent[1].id, None);
        assert_eq!(sent[1].remote_error().code, RemoteErrorCode::EventSourceFailure);
    }

    #[tokio::test]
    async fn dispose_completes_once() {
        let binding = Arc::new(EventBinding::new("clock.tick".to_string(), CancellationToken::new()));
        let a = RecordingClient::new(1);
        binding.subscribe(a.clone());
        binding.spawn(stream::pending::<Result<Value, String>>().boxed());

        binding.dispose();
        binding.dispose();
        assert_eq!(a.sent_kinds(), [MessageKind::Complete]);
    }
}
