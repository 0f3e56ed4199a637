//! The delivery router: push now, or queue for later.
//!
//! Every connection has one writer task that owns the socket's write
//! half. Everything destined for that socket, responses and live pushes
//! alike, goes through the writer's [`OutboundSender`]. Two consequences:
//!
//! - Frames from different tasks never interleave on the wire.
//! - Routing a message is a non-blocking channel send. It can run while
//!   the directory lock is held without ever waiting on a socket.
//!
//! ```text
//! sender's handler ──route()──→ recipient's channel ──→ recipient's writer ──→ socket
//!                       │
//!                       └─(closed / offline)──→ recipient's undelivered queue
//! ```
//!
//! A push that reaches the channel can still fail at the socket, and so
//! can a message already taken off the queue by a read. The writer task
//! then hands the message back to the directory with
//! [`Directory::requeue`](crate::Directory::requeue), so it is never
//! dropped.

use parley_protocol::Frame;
use tokio::sync::mpsc;

use crate::Message;

/// One item for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    /// A response frame for this connection's own request.
    Frame(Frame),
    /// A message delivered live to this connection's user.
    Push(Message),
    /// A queued message taken by this connection's ReadMessages request.
    Batched(Message),
}

impl Outbound {
    /// The message this item carries, if it must go back to a queue
    /// when it can't be written.
    pub fn into_undelivered(self) -> Option<Message> {
        match self {
            Self::Frame(_) => None,
            Self::Push(message) | Self::Batched(message) => Some(message),
        }
    }
}

/// The sending half of a connection's outbound channel.
///
/// Unbounded so that routing never waits on a slow reader. Stored in
/// the directory's session table.
pub type OutboundSender = mpsc::UnboundedSender<Outbound>;

/// The receiving half, owned by the writer task.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Creates a connection's outbound channel.
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::unbounded_channel()
}

/// Where a routed message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Handed to the recipient's writer task.
    Live,
    /// The recipient is offline or its writer is gone; queue it.
    Queue,
}

/// Decides how to deliver `message`, and performs the live handoff.
///
/// `live` is the recipient's outbound sender if it has a session. The
/// caller queues the message when this returns [`Route::Queue`].
pub fn route(live: Option<&OutboundSender>, message: &Message) -> Route {
    match live {
        Some(tx) if tx.send(Outbound::Push(message.clone())).is_ok() => {
            Route::Live
        }
        _ => Route::Queue,
    }
}
