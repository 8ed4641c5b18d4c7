//! Multiplexed remote calls and event streams between local processes.
//!
//! svcbus lets one process expose named methods and event streams that
//! another process calls and subscribes to over a single duplex connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain sockets and in-process duplex channels
//! - [`frame`]: Length-prefixed framing and the message envelope
//! - [`peer`]: Connection contracts (`Client`, `Listener`) and the framed channel
//! - [`service`]: Service descriptors, the dispatching server and the client proxy (behind `service` feature)

/// Re-export transport types.
pub mod transport {
    pub use svcbus_transport::*;
}

/// Re-export frame and envelope types.
pub mod frame {
    pub use svcbus_frame::*;
}

/// Re-export peer types.
pub mod peer {
    pub use svcbus_peer::*;
}

/// Re-export service types (requires `service` feature).
#[cfg(feature = "service")]
pub mod service {
    pub use svcbus_service::*;
}
