//! Error types for the protocol layer.
//!
//! Each crate in Parley defines its own error enum. A `ProtocolError`
//! always means the byte stream itself is unusable: a frame could not be
//! read, a field could not be encoded, or a payload did not match the
//! shape its command id promises. The session loop treats all of these
//! as fatal for the connection (except [`ProtocolError::UnknownCommand`],
//! which it answers and survives).

use std::fmt;

/// Which part of a frame was being read when the peer went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStage {
    Header,
    Payload,
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "header"),
            Self::Payload => write!(f, "payload"),
        }
    }
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The peer closed the stream in the middle of a frame.
    ///
    /// A close *between* frames is not an error; `read_frame` reports it
    /// as `Ok(None)`.
    #[error("connection closed while reading {stage} ({read} of {expected} bytes)")]
    ConnectionClosed {
        stage: FrameStage,
        read: usize,
        expected: usize,
    },

    /// A string is longer than its length prefix can describe.
    #[error("string of {len} bytes exceeds the {max}-byte limit")]
    StringTooLong { len: usize, max: usize },

    /// A frame payload is longer than the 2-byte length header allows.
    #[error("payload of {0} bytes exceeds the 65535-byte frame limit")]
    PayloadTooLarge(usize),

    /// A payload ended before a field was complete.
    #[error("payload truncated: needed {needed} more bytes for {field}")]
    Truncated { field: &'static str, needed: usize },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A payload had bytes left over after every field was read.
    #[error("{0} unexpected trailing bytes in payload")]
    TrailingBytes(usize),

    /// The command id is not one a client may send.
    #[error("unknown command id {0}")]
    UnknownCommand(u8),

    /// The underlying stream failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
