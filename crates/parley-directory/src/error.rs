//! Error types for the directory layer.
//!
//! These are domain errors: they describe a request that was well formed
//! but could not be honoured. The session handler turns every one of them
//! into a status line for the client; none of them ends a connection.

/// Errors returned by [`Directory`](crate::Directory) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// The named account does not exist.
    #[error("no such user: {0}")]
    NoSuchUser(String),

    /// An account with this name is already registered.
    #[error("user {0} already exists")]
    AlreadyExists(String),

    /// The password did not match the stored digest.
    #[error("incorrect password")]
    BadCredentials,

    /// The account already has an active session on another connection.
    #[error("user {0} is already logged in")]
    AlreadyLoggedIn(String),

    /// A delete request matched no message.
    #[error("no matching messages to delete")]
    NoMatch,

    /// The account still has messages waiting to be read.
    #[error("user {user} has {count} undelivered messages")]
    PendingMessages { user: String, count: usize },

    /// The username is empty or contains a reserved character.
    #[error("invalid username {0:?}")]
    InvalidUsername(String),
}
