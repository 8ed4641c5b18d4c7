use std::fmt;
use std::io;

use svcbus_frame::FrameError;
use svcbus_peer::PeerError;
use svcbus_service::ServiceError;
use svcbus_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    CliError::new(io_code(&err), format!("{context}: {err}"))
}

fn io_code(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound
        | io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::PermissionDenied
        | io::ErrorKind::AddrInUse => TRANSPORT_ERROR,
        _ => INTERNAL,
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    let code = match &err {
        TransportError::Bind { source, .. }
        | TransportError::Dial { source, .. }
        | TransportError::Accept { source, .. }
        | TransportError::Io(source) => io_code(source),
        TransportError::PathTooLong { .. } => USAGE,
        TransportError::AcceptorClosed | TransportError::Shutdown => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Json(_) | FrameError::UnknownMessageKind(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn peer_error(context: &str, err: PeerError) -> CliError {
    match err {
        PeerError::Transport(err) => transport_error(context, err),
        PeerError::Frame(err) => frame_error(context, err),
        PeerError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        PeerError::Json(err) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        PeerError::HandshakeFailed(_) | PeerError::Disconnected(_) | PeerError::NotConnected(_) => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn service_error(context: &str, err: ServiceError) -> CliError {
    let code = match &err {
        ServiceError::NotConnected | ServiceError::TransportFailure(_) => TRANSPORT_ERROR,
        ServiceError::Timeout(_) => TIMEOUT,
        ServiceError::Serialization(_) => DATA_INVALID,
        ServiceError::UnknownMethod(_)
        | ServiceError::UnknownEvent(_)
        | ServiceError::InvocationFailure(_)
        | ServiceError::EventSourceFailure(_) => FAILURE,
        ServiceError::DuplicateServiceName(_)
        | ServiceError::MissingServiceName
        | ServiceError::Disposed => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
