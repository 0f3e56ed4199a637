//! Shared chat state for Parley.
//!
//! This crate owns everything the server remembers:
//!
//! 1. **Accounts**: username, salted password digest and the queue of
//!    messages not yet read ([`Account`], [`PasswordHash`]).
//! 2. **Sessions**: which connection each online user is logged in on.
//! 3. **Conversations**: the ordered history between each pair of users
//!    ([`ConversationKey`], [`Message`]).
//! 4. **Delivery routing**: pushing a message live to an online
//!    recipient or queueing it ([`route`], [`Outbound`]).
//!
//! All of it lives in one [`Directory`] value. Nothing is persisted.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session handler (above)  ← one task per connection, locks the directory per request
//!     ↕
//! Directory (this crate)   ← accounts, sessions, conversations, routing
//!     ↕
//! Protocol (below)         ← Frame, ChatMessage, string limits
//! ```

mod directory;
mod error;
mod message;
mod password;
mod router;

pub use directory::{Account, DeleteScope, Directory, Sent, Session};
pub use error::DirectoryError;
pub use message::{ConversationKey, Message, MessageId, render_conversation};
pub use password::PasswordHash;
pub use router::{
    Outbound, OutboundReceiver, OutboundSender, Route, outbound_channel, route,
};
