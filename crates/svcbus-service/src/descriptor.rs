//! Explicit service descriptors.
//!
//! A [`ServiceDescriptor`] lists the methods, events and disposal hooks of one
//! service type. It is handed to [`crate::ServiceServer::register`] together
//! with the instance; nothing is discovered implicitly.
//!
//! ```no_run
//! use std::sync::Arc;
//! use svcbus_service::ServiceDescriptor;
//!
//! struct Math;
//!
//! let descriptor = ServiceDescriptor::<Math>::new("math")
//!     .method("add", |_math: Arc<Math>, (a, b): (i64, i64)| async move {
//!         Ok::<_, std::convert::Infallible>(a + b)
//!     });
//! ```

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::args::decode_args;

/// Type-erased method: decoded arguments in, JSON result or failure text out.
pub(crate) type MethodFn<S> =
    Arc<dyn Fn(Arc<S>, Option<Value>) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Type-erased event source factory.
pub(crate) type EventFn<S> = Box<dyn FnOnce(&S) -> BoxStream<'static, Result<Value, String>> + Send>;

pub(crate) type DisposeFn<S> = Box<dyn FnOnce(&S) + Send>;

/// Methods, events and disposal hooks of one service type.
pub struct ServiceDescriptor<S> {
    pub(crate) name: String,
    pub(crate) methods: Vec<(String, MethodFn<S>)>,
    pub(crate) events: Vec<(String, EventFn<S>)>,
    pub(crate) dispose: Vec<DisposeFn<S>>,
}

impl<S: Send + Sync + 'static> ServiceDescriptor<S> {
    /// Start a descriptor for the service called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            events: Vec::new(),
            dispose: Vec::new(),
        }
    }

    /// Expose an async method as `<service>.<name>`.
    ///
    /// Call arguments are decoded from the positional array into `A`
    /// (a tuple for several arguments, `()` for none). A decode failure or an
    /// `Err` from the handler is reported to the caller as an invocation
    /// failure carrying the error's `Display` text.
    pub fn method<A, R, E, F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: Fn(Arc<S>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let name = name.into();
        let method: MethodFn<S> = Arc::new(move |service: Arc<S>, data: Option<Value>| {
            let args = match decode_args::<A>(data) {
                Ok(args) => args,
                Err(err) => {
                    let message = format!("invalid arguments: {err}");
                    return async move { Err::<Value, String>(message) }.boxed();
                }
            };
            let invocation = handler(service, args);
            async move {
                let result = invocation.await.map_err(|err| err.to_string())?;
                serde_json::to_value(result).map_err(|err| format!("unserializable result: {err}"))
            }
            .boxed()
        });
        self.methods.push((name, method));
        self
    }

    /// Expose an infallible event stream as `<service>.<name>`.
    ///
    /// The factory runs once, at registration.
    pub fn event<T, St, F>(self, name: impl Into<String>, factory: F) -> Self
    where
        T: Serialize + Send + 'static,
        St: Stream<Item = T> + Send + 'static,
        F: FnOnce(&S) -> St + Send + 'static,
    {
        self.try_event(name, move |service: &S| {
            factory(service).map(Ok::<T, std::convert::Infallible>)
        })
    }

    /// Expose a fallible event stream as `<service>.<name>`.
    ///
    /// The first `Err` is pushed to every subscriber as an event source
    /// failure and ends the event.
    pub fn try_event<T, E, St, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        St: Stream<Item = Result<T, E>> + Send + 'static,
        F: FnOnce(&S) -> St + Send + 'static,
    {
        let source: EventFn<S> = Box::new(move |service: &S| {
            factory(service)
                .map(|item| match item {
                    Ok(value) => serde_json::to_value(value)
                        .map_err(|err| format!("unserializable event payload: {err}")),
                    Err(err) => Err(err.to_string()),
                })
                .boxed()
        });
        self.events.push((name.into(), source));
        self
    }

    /// Run `hook` on the instance when the server tears down.
    pub fn on_dispose<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&S) + Send + 'static,
    {
        self.dispose.push(Box::new(hook));
        self
    }
}

impl<S> ServiceDescriptor<S> {
    /// Service name; members are exposed as `<name>.<member>`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Member names of all registered methods.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.iter().map(|(name, _)| name.as_str())
    }

    /// Member names of all registered events.
    pub fn event_names(&self) -> impl Iterator<Item = &str> {
        self.events.iter().map(|(name, _)| name.as_str())
    }
}

impl<S> fmt::Debug for ServiceDescriptor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("methods", &self.method_names().collect::<Vec<_>>())
            .field("events", &self.event_names().collect::<Vec<_>>())
            .field("dispose_hooks", &self.dispose.len())
            .finish()
    }
}
