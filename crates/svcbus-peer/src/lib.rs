//! Connection management for svcbus.
//!
//! Defines the transport capability the service layer is written against
//! ([`Client`], [`Listener`], [`ConnectionState`]) and provides two
//! implementations of it:
//!
//! - [`FramedClient`]/[`FramedListener`]: framed connections over any
//!   [`svcbus_transport::IpcStream`], with a connect handshake, a pre-connect
//!   send buffer and out-of-band disconnect notification.
//! - [`NullClient`]/[`NullListener`]: inert stand-ins used when no real
//!   channel is configured.

pub mod config;
pub mod connector;
pub mod control;
pub mod error;
pub mod framed;
pub mod handshake;
mod inbound;
pub mod listener;
pub mod null;
pub mod state;
pub mod traits;

pub use config::PeerConfig;
pub use connector::{connect, connect_with_config};
pub use control::ControlMessage;
pub use error::{PeerError, Result};
pub use framed::FramedClient;
pub use handshake::{handshake_client, handshake_server};
pub use listener::FramedListener;
pub use null::{NullClient, NullListener};
pub use state::ConnectionState;
pub use traits::{Client, ClientStream, ConnectionId, Listener, MessageStream};
