//! Async byte channels underneath svcbus.
//!
//! Provides a unified stream type over the local transport mechanisms:
//! - Unix domain sockets (Linux/macOS)
//! - In-process duplex pipes (tests, embedded peers)
//!
//! This is the lowest layer of svcbus. Everything else builds on top of
//! the [`IpcStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod memory;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use endpoint::{Acceptor, Endpoint};
pub use error::{Result, TransportError};
pub use memory::{memory_channel, memory_channel_with_capacity, MemoryAcceptor, MemoryConnector};
pub use stream::IpcStream;

#[cfg(unix)]
pub use uds::UnixDomainSocket;
