//! TCP transport implementation on top of `tokio::net`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{Connection, ConnectionId, Transport, TransportError};

/// Next id to hand out. Shared by every listener in the process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A TCP [`Transport`] that listens for incoming connections.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Binds a new TCP transport to the given address.
    ///
    /// Use port `0` to let the OS pick a free port, then read it back
    /// with [`local_addr`](Self::local_addr).
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await.map_err(|source| {
            TransportError::BindFailed {
                addr: addr.to_string(),
                source,
            }
        })?;
        tracing::info!(addr, "TCP transport listening");
        Ok(Self { listener })
    }

    /// Returns the address the listener is actually bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener.local_addr().map_err(TransportError::Address)
    }
}

impl Transport for TcpTransport {
    type Connection = TcpConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        // Small frames go out as soon as they are written.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "set_nodelay failed");
        }

        let id = ConnectionId::new(
            NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
        );
        tracing::debug!(%id, %peer, "accepted TCP connection");

        Ok(TcpConnection { id, peer, stream })
    }
}

/// A single accepted TCP connection.
pub struct TcpConnection {
    id: ConnectionId,
    peer: SocketAddr,
    stream: TcpStream,
}

impl TcpConnection {
    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Connection for TcpConnection {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    fn id(&self) -> ConnectionId {
        self.id
    }

    fn into_split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}
