use std::io;
use std::path::PathBuf;

/// Failures of the raw byte channels under a svcbus connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot bind socket at {path}: {source}")]
    Bind { path: PathBuf, source: io::Error },

    /// Dialing an endpoint failed. `endpoint` is its display form
    /// (`unix:/run/app.sock`, `memory`).
    #[error("cannot dial {endpoint}: {source}")]
    Dial { endpoint: String, source: io::Error },

    #[error("{transport} accept failed: {source}")]
    Accept {
        transport: &'static str,
        source: io::Error,
    },

    #[error("stream I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("socket path is {len} bytes, platform limit is {max}: {path}")]
    PathTooLong { path: PathBuf, len: usize, max: usize },

    /// An in-process dial found its acceptor dropped.
    #[error("in-process acceptor is closed")]
    AcceptorClosed,

    /// The accepting side has no more connections to hand out: every
    /// in-process connector is gone.
    #[error("acceptor shut down")]
    Shutdown,
}

impl TransportError {
    /// True when retrying `accept` on the same acceptor cannot succeed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Shutdown | TransportError::AcceptorClosed)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
