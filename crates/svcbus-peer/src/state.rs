use std::fmt;

/// Lifecycle of a connection.
///
/// `Unbound → Connecting → Connected → Disconnected`; `Disconnected` is
/// terminal. Accepted connections start in `Connecting` and move to
/// `Connected` once the handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Unbound,
    Connecting,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Whether `send` is accepted in this state (immediately or buffered).
    pub fn can_send(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unbound => "Unbound",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}
