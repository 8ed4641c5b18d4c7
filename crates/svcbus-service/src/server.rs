//! Dispatching service server.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures_util::StreamExt;
use svcbus_frame::{qualified_name, Message, MessageKind, RemoteError, RemoteErrorCode};
use svcbus_peer::{Client, ConnectionId, Listener};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::binding::{CallBinding, EventBinding};
use crate::descriptor::ServiceDescriptor;
use crate::error::{Result, ServiceError};

/// Hosts registered services on the connections produced by a [`Listener`].
///
/// Calls are looked up by `<service>.<method>` and each invocation runs on its
/// own task, so replies on one connection may complete in any order. Events
/// are consumed once per binding and fanned out to every subscribed
/// connection.
///
/// Must be used from within a Tokio runtime: registering spawns the event
/// emission tasks and [`ServiceServer::start`] spawns the accept loop.
pub struct ServiceServer {
    listener: Box<dyn Listener>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    started: AtomicBool,
    shut_down: AtomicBool,
}

struct Shared {
    calls: RwLock<HashMap<String, Arc<CallBinding>>>,
    events: RwLock<HashMap<String, Arc<EventBinding>>>,
    services: Mutex<Vec<RegisteredService>>,
}

/// Owning handle of a registered instance plus its disposal hooks.
struct RegisteredService {
    name: String,
    _instance: Arc<dyn Any + Send + Sync>,
    dispose: Vec<Box<dyn FnOnce() + Send>>,
}

impl ServiceServer {
    pub fn new(listener: impl Listener + 'static) -> Self {
        Self {
            listener: Box::new(listener),
            shared: Arc::new(Shared {
                calls: RwLock::new(HashMap::new()),
                events: RwLock::new(HashMap::new()),
                services: Mutex::new(Vec::new()),
            }),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Bind every member of `descriptor` to `service`.
    ///
    /// Event sources are subscribed immediately. Registration is
    /// all-or-nothing: on a name collision nothing is bound. Returns the
    /// instance so the caller can keep using it locally.
    pub fn register<S>(&self, service: Arc<S>, descriptor: ServiceDescriptor<S>) -> Result<Arc<S>>
    where
        S: Send + Sync + 'static,
    {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ServiceError::Disposed);
        }
        let ServiceDescriptor {
            name: service_name,
            methods,
            events,
            dispose,
        } = descriptor;
        if service_name.is_empty() {
            return Err(ServiceError::MissingServiceName);
        }

        let method_names: Vec<String> = methods
            .iter()
            .map(|(member, _)| qualified_name(&service_name, member))
            .collect();
        let event_names: Vec<String> = events
            .iter()
            .map(|(member, _)| qualified_name(&service_name, member))
            .collect();

        {
            let mut seen = HashSet::new();
            for name in method_names.iter().chain(&event_names) {
                if !seen.insert(name.as_str()) {
                    return Err(ServiceError::DuplicateServiceName(name.clone()));
                }
            }
        }
        {
            let calls = read(&self.shared.calls);
            let bound_events = read(&self.shared.events);
            if let Some(name) = first_bound(&calls, &bound_events, method_names.iter().chain(&event_names)) {
                return Err(ServiceError::DuplicateServiceName(name.clone()));
            }
        }

        // Event factories are user code; run them before any table is locked.
        let sources: Vec<_> = events
            .into_iter()
            .map(|(_, factory)| factory(service.as_ref()))
            .collect();

        let weak = Arc::downgrade(&service);
        let mut started = Vec::with_capacity(sources.len());
        {
            let mut calls = write(&self.shared.calls);
            let mut bound_events = write(&self.shared.events);
            // Another registration may have won the race since the check above.
            if let Some(name) = first_bound(&calls, &bound_events, method_names.iter().chain(&event_names)) {
                return Err(ServiceError::DuplicateServiceName(name.clone()));
            }

            for (name, (_, method)) in method_names.into_iter().zip(methods) {
                let binding = CallBinding::new(name.clone(), weak.clone(), method);
                calls.insert(name, Arc::new(binding));
            }
            for (name, source) in event_names.into_iter().zip(sources) {
                let binding = Arc::new(EventBinding::new(name.clone(), self.cancel.child_token()));
                bound_events.insert(name, Arc::clone(&binding));
                started.push((binding, source));
            }
        }
        for (binding, source) in started {
            binding.spawn(source);
        }

        let hooks = dispose
            .into_iter()
            .map(|hook| {
                let weak = weak.clone();
                Box::new(move || {
                    if let Some(service) = weak.upgrade() {
                        hook(service.as_ref());
                    }
                }) as Box<dyn FnOnce() + Send>
            })
            .collect();
        lock(&self.shared.services).push(RegisteredService {
            name: service_name.clone(),
            _instance: Arc::clone(&service) as Arc<dyn Any + Send + Sync>,
            dispose: hooks,
        });

        info!(service = %service_name, "service registered");
        Ok(service)
    }

    /// Begin accepting connections. Calling it again has no effect.
    pub fn start(&self) {
        if self.shut_down.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            warn!("server already started or shut down; ignoring start");
            return;
        }
        info!("server is starting");

        let mut connections = self.listener.accept();
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let client = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = connections.next() => match next {
                        Some(client) => client,
                        None => {
                            info!("listener closed; no more connections");
                            break;
                        }
                    },
                };
                tokio::spawn(serve_connection(Arc::clone(&shared), client, cancel.clone()));
            }
        });
    }

    /// Tear everything down: event bindings first (sources stop, subscribers
    /// get `Complete`), then call bindings, then disposal hooks, then the
    /// accept loop and connection tasks. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("server shutting down");

        let events: Vec<_> = write(&self.shared.events).drain().collect();
        for (_, binding) in events {
            binding.dispose();
        }

        let calls: Vec<_> = write(&self.shared.calls).drain().collect();
        for (_, binding) in calls {
            binding.dispose();
        }

        let services = std::mem::take(&mut *lock(&self.shared.services));
        for service in services {
            debug!(service = %service.name, "disposing service");
            for hook in service.dispose {
                hook();
            }
        }

        self.cancel.cancel();
    }

    /// Qualified names of all bound methods, sorted.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = read(&self.shared.calls).keys().cloned().collect();
        names.sort();
        names
    }

    /// Qualified names of all bound events, sorted.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<_> = read(&self.shared.events).keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of connections subscribed to `event` (0 if unknown).
    pub fn subscriber_count(&self, event: &str) -> usize {
        read(&self.shared.events)
            .get(event)
            .map_or(0, |binding| binding.subscriber_count())
    }
}

impl Drop for ServiceServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ServiceServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceServer")
            .field("methods", &self.method_names())
            .field("events", &self.event_names())
            .field("started", &self.started.load(Ordering::SeqCst))
            .field("shut_down", &self.shut_down.load(Ordering::SeqCst))
            .finish()
    }
}

async fn serve_connection(shared: Arc<Shared>, client: Arc<dyn Client>, cancel: CancellationToken) {
    let connection_id = client.id();
    debug!(connection_id, "new connection");
    let mut inbound = client.receive();

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => {
                client.disconnect();
                break;
            }
            next = inbound.next() => match next {
                Some(message) => message,
                None => break,
            },
        };
        shared.dispatch(&client, message);
    }

    shared.forget(connection_id);
    debug!(connection_id, "connection closed");
}

impl Shared {
    fn dispatch(&self, client: &Arc<dyn Client>, message: Message) {
        if !message.kind.is_request() {
            debug!(connection_id = client.id(), kind = message.kind.as_str(), name = %message.name, "ignoring non-request message");
            return;
        }
        let Some(id) = message.id else {
            warn!(connection_id = client.id(), name = %message.name, "request without id; dropping");
            return;
        };

        match message.kind {
            MessageKind::Call => self.handle_call(client, id, message),
            MessageKind::Listen => self.handle_listen(client, id, &message.name),
            MessageKind::Mute => self.handle_mute(client, id, &message.name),
            _ => {}
        }
    }

    fn handle_call(&self, client: &Arc<dyn Client>, id: u64, message: Message) {
        let binding = read(&self.calls).get(&message.name).cloned();
        let Some(binding) = binding else {
            warn!(connection_id = client.id(), name = %message.name, "unknown method");
            reply(client, Message::error(id, message.name.as_str(), &RemoteError::unknown_method(&message.name)));
            return;
        };

        let client = Arc::clone(client);
        tokio::spawn(async move {
            let response = match binding.invoke(message.data).await {
                Ok(value) => Message::reply(id, binding.name(), Some(value)),
                Err(reason) => {
                    debug!(connection_id = client.id(), name = binding.name(), %reason, "invocation failed");
                    let error = RemoteError::new(RemoteErrorCode::InvocationFailure, reason);
                    Message::error(id, binding.name(), &error)
                }
            };
            reply(&client, response);
        });
    }

    fn handle_listen(&self, client: &Arc<dyn Client>, id: u64, name: &str) {
        let binding = read(&self.events).get(name).cloned();
        let Some(binding) = binding else {
            warn!(connection_id = client.id(), name, "cannot subscribe, unknown event");
            reply(client, Message::error(id, name, &RemoteError::unknown_event(name)));
            return;
        };

        let subscribed = binding.subscribe(Arc::clone(client));
        reply(client, Message::reply(id, name, None));
        if subscribed {
            debug!(connection_id = client.id(), event = binding.name(), "subscribed");
        } else {
            debug!(connection_id = client.id(), event = binding.name(), "event already completed");
            reply(client, Message::complete(name));
        }
    }

    fn handle_mute(&self, client: &Arc<dyn Client>, id: u64, name: &str) {
        let binding = read(&self.events).get(name).cloned();
        let Some(binding) = binding else {
            warn!(connection_id = client.id(), name, "cannot unsubscribe, unknown event");
            reply(client, Message::error(id, name, &RemoteError::unknown_event(name)));
            return;
        };

        if binding.unsubscribe(client.id()) {
            debug!(connection_id = client.id(), event = binding.name(), "unsubscribed");
        }
        reply(client, Message::reply(id, name, None));
    }

    /// Drop a closed connection from every subscriber set.
    fn forget(&self, connection_id: ConnectionId) {
        for binding in read(&self.events).values() {
            binding.unsubscribe(connection_id);
        }
    }
}

fn reply(client: &Arc<dyn Client>, message: Message) {
    if let Err(err) = client.send(message) {
        warn!(connection_id = client.id(), error = %err, "dropping reply");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn first_bound<'a>(
    calls: &HashMap<String, Arc<CallBinding>>,
    events: &HashMap<String, Arc<EventBinding>>,
    mut names: impl Iterator<Item = &'a String>,
) -> Option<&'a String> {
    names.find(|name| calls.contains_key(*name) || events.contains_key(*name))
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
