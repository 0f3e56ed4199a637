//! Wire protocol for Parley.
//!
//! This crate defines the bytes that clients and servers exchange:
//!
//! - **Frames** ([`Frame`], [`read_frame`], [`write_frame`]): a 3-byte
//!   header (command id + big-endian payload length) followed by the
//!   payload.
//! - **Fields** ([`PayloadWriter`], [`PayloadReader`], [`WireFormat`]):
//!   length-prefixed strings and raw bytes, laid out back to back.
//! - **Commands** ([`Command`]): the fixed table of command ids.
//! - **Messages** ([`Request`] and the payload structs): one typed value
//!   per command, validated at decode time.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about accounts or sessions. It turns
//! a byte stream into typed requests and typed responses back into bytes.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame → Request) → Session handler
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod command;
mod error;
mod frame;
mod messages;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{
    LONG_STR_MAX, PayloadReader, PayloadWriter, SHORT_STR_MAX, WireFormat,
};
pub use command::{Command, ERROR_COMMAND_ID};
pub use error::{FrameStage, ProtocolError};
pub use frame::{Frame, HEADER_SIZE, MAX_PAYLOAD, read_frame, write_frame};
pub use messages::{
    ChatMessage, Credentials, DEFAULT_LIST_PATTERN, DeleteMessages,
    DeleteTarget, END_OF_MESSAGES, ListAccounts, LongText, NO_MESSAGES,
    ReadAck, ReadMessages, Request, SendMessage, Status, UserCommand,
    ViewConversation,
};
