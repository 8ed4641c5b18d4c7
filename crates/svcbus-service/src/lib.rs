//! Remote calls and event streams across a [`svcbus_peer::Client`].
//!
//! - [`ServiceDescriptor`]: explicit builder listing a service's methods,
//!   events and disposal hooks.
//! - [`ServiceServer`]: binds descriptors to instances, accepts connections
//!   from a [`svcbus_peer::Listener`], dispatches calls and fans out events.
//! - [`ServiceClient`]: correlates calls with replies and multiplexes event
//!   subscriptions over a single connection.

pub mod args;
mod binding;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod server;

#[cfg(test)]
mod testing;

pub use args::{decode_args, encode_args};
pub use client::{EventStream, ServiceClient};
pub use config::{ClientConfig, DEFAULT_CALL_TIMEOUT};
pub use descriptor::ServiceDescriptor;
pub use error::{Result, ServiceError};
pub use server::ServiceServer;
