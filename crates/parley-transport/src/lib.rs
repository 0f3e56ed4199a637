//! Transport layer for Parley.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the server's
//! accept loop is written against, plus the TCP implementation used in
//! production.
//!
//! A connection is just a bidirectional byte stream. Framing lives one
//! layer up in `parley-protocol`; the transport only hands out the two
//! halves so that a session can read on one task and write on another.

#![allow(async_fn_in_trait)]

mod error;
mod tcp;

pub use error::TransportError;
pub use tcp::{TcpConnection, TcpTransport};

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};

/// Identifies one accepted socket for its whole life.
///
/// The directory records it next to a live session so a late cleanup from
/// an old connection can't clear a newer login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Wraps a raw id. Transports hand these out from a counter.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener that yields connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// A single accepted connection.
///
/// Reads and writes happen on different tasks (the session loop reads,
/// the outbound writer writes), so a connection is consumed by
/// [`into_split`](Connection::into_split) rather than shared.
pub trait Connection: Send + 'static {
    /// The read half.
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// The write half.
    type Writer: AsyncWrite + Unpin + Send + 'static;

    fn id(&self) -> ConnectionId;

    /// Splits the connection into independently owned halves.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}
