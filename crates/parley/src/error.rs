//! Unified error type for Parley.

use parley_directory::DirectoryError;
use parley_protocol::ProtocolError;
use parley_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each wrapping variant generates the `From`
/// impl, so `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ParleyError {
    /// Binding or accepting failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The byte stream was unusable (bad frame, oversized field, i/o).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A directory operation was refused.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// The config file could not be read or parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The peer went away (client side: the server closed the socket).
    #[error("connection closed by peer")]
    Disconnected,

    /// The server answered with a frame the client didn't expect.
    #[error("unexpected response with command id {0}")]
    UnexpectedResponse(u8),

    /// No frame arrived within the configured idle timeout.
    #[error("connection idle for too long")]
    IdleTimeout,
}
