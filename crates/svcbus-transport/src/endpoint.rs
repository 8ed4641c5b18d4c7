use std::fmt;
use std::path::PathBuf;

use crate::error::Result;
use crate::memory::{MemoryAcceptor, MemoryConnector};
use crate::stream::IpcStream;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// Where a client connects to.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// Filesystem path of a listening Unix domain socket.
    #[cfg(unix)]
    Unix(PathBuf),
    /// In-process acceptor.
    Memory(MemoryConnector),
}

impl Endpoint {
    /// Open a byte stream to this endpoint.
    pub async fn dial(&self) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => UnixDomainSocket::connect(path).await,
            Endpoint::Memory(connector) => connector.connect(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Memory(_) => f.write_str("memory"),
        }
    }
}

#[cfg(unix)]
impl From<PathBuf> for Endpoint {
    fn from(path: PathBuf) -> Self {
        Endpoint::Unix(path)
    }
}

impl From<MemoryConnector> for Endpoint {
    fn from(connector: MemoryConnector) -> Self {
        Endpoint::Memory(connector)
    }
}

/// Where a listener accepts connections from.
pub enum Acceptor {
    #[cfg(unix)]
    Unix(UnixDomainSocket),
    Memory(MemoryAcceptor),
}

impl Acceptor {
    /// Wait for the next incoming byte stream.
    pub async fn accept(&mut self) -> Result<IpcStream> {
        match self {
            #[cfg(unix)]
            Acceptor::Unix(socket) => socket.accept().await,
            Acceptor::Memory(acceptor) => acceptor.accept().await,
        }
    }
}

impl fmt::Debug for Acceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Acceptor::Unix(socket) => f
                .debug_struct("Acceptor")
                .field("type", &socket.transport_name())
                .field("path", &socket.path())
                .finish(),
            Acceptor::Memory(_) => f.debug_struct("Acceptor").field("type", &"memory").finish(),
        }
    }
}

#[cfg(unix)]
impl From<UnixDomainSocket> for Acceptor {
    fn from(socket: UnixDomainSocket) -> Self {
        Acceptor::Unix(socket)
    }
}

impl From<MemoryAcceptor> for Acceptor {
    fn from(acceptor: MemoryAcceptor) -> Self {
        Acceptor::Memory(acceptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::memory_channel;

    #[tokio::test]
    async fn memory_endpoint_dials_acceptor() {
        let (acceptor, connector) = memory_channel();
        let mut acceptor = Acceptor::from(acceptor);
        let endpoint = Endpoint::from(connector);

        assert_eq!(endpoint.to_string(), "memory");
        let _client = endpoint.dial().await.unwrap();
        let server = acceptor.accept().await.unwrap();
        assert_eq!(server.transport_name(), "memory");
    }

    #[cfg(unix)]
    #[test]
    fn unix_endpoint_display() {
        let endpoint = Endpoint::from(PathBuf::from("/tmp/svcbus.sock"));
        assert_eq!(endpoint.to_string(), "unix:/tmp/svcbus.sock");
    }
}
