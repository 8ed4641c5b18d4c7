use std::time::Duration;

use svcbus_frame::{RemoteError, RemoteErrorCode};
use svcbus_peer::PeerError;

/// Errors surfaced by service registration, calls and event streams.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A message was sent while the transport was not connected.
    #[error("not connected")]
    NotConnected,

    /// The remote side has no method with this name.
    #[error("{0}")]
    UnknownMethod(String),

    /// The remote side has no event with this name.
    #[error("{0}")]
    UnknownEvent(String),

    /// The remote method failed.
    #[error("invocation failed: {0}")]
    InvocationFailure(String),

    /// The remote event source failed; the stream ends after this error.
    #[error("event source failed: {0}")]
    EventSourceFailure(String),

    /// A method or event name is already registered.
    #[error("duplicate service name: {0}")]
    DuplicateServiceName(String),

    /// A descriptor was registered without a service name.
    #[error("service descriptor has no name")]
    MissingServiceName,

    /// No reply arrived within the configured call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The client or server has been disposed.
    #[error("disposed")]
    Disposed,

    /// Arguments, results or event payloads could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The channel failed or disconnected.
    #[error("transport failure: {0}")]
    TransportFailure(String),
}

impl ServiceError {
    /// Map an `Error` envelope payload to the local taxonomy.
    pub fn from_remote(error: &RemoteError) -> Self {
        let message = error.message.clone();
        match error.code {
            RemoteErrorCode::UnknownMethod => ServiceError::UnknownMethod(message),
            RemoteErrorCode::UnknownEvent => ServiceError::UnknownEvent(message),
            RemoteErrorCode::InvocationFailure => ServiceError::InvocationFailure(message),
            RemoteErrorCode::EventSourceFailure => ServiceError::EventSourceFailure(message),
        }
    }
}

impl From<PeerError> for ServiceError {
    fn from(err: PeerError) -> Self {
        match err {
            PeerError::NotConnected(_) => ServiceError::NotConnected,
            PeerError::Json(err) => ServiceError::Serialization(err),
            other => ServiceError::TransportFailure(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use svcbus_peer::ConnectionState;

    use super::*;

    #[test]
    fn remote_codes_map_to_local_variants() {
        let err = ServiceError::from_remote(&RemoteError::unknown_method("math.missing"));
        assert!(matches!(err, ServiceError::UnknownMethod(msg) if msg.contains("math.missing")));

        let err = ServiceError::from_remote(&RemoteError::new(
            RemoteErrorCode::EventSourceFailure,
            "sensor offline",
        ));
        assert!(matches!(err, ServiceError::EventSourceFailure(_)));
    }

    #[test]
    fn peer_not_connected_maps_to_not_connected() {
        let err = ServiceError::from(PeerError::NotConnected(ConnectionState::Unbound));
        assert!(matches!(err, ServiceError::NotConnected));

        let err = ServiceError::from(PeerError::Disconnected("gone".to_string()));
        assert!(matches!(err, ServiceError::TransportFailure(_)));
    }
}
