//! Typed payloads for every command.
//!
//! Each request and response is its own struct with a [`WireFormat`]
//! impl, so a payload is validated completely when the frame is decoded
//! and handlers never see raw bytes.
//!
//! | command          | request                                   | response                     |
//! |------------------|-------------------------------------------|------------------------------|
//! | Login            | user, pass                                | [`Status`]                   |
//! | CreateAccount    | user, pass                                | [`Status`]                   |
//! | SendMessage      | sender, recipient, body                   | [`Status`]                   |
//! | ReadMessages     | user, limit                               | [`ChatMessage`]* then sentinel |
//! | DeleteMessages   | user, [other], count, ids                 | [`Status`]                   |
//! | ViewConversation | user, other                               | [`LongText`] or [`Status`]   |
//! | DeleteAccount    | user                                      | [`Status`]                   |
//! | Logoff           | user                                      | [`Status`]                   |
//! | Close            | user                                      | [`Status`]                   |
//! | ListAccounts     | wildcard                                  | [`LongText`]                 |

use crate::codec::{PayloadReader, PayloadWriter, WireFormat};
use crate::{Command, Frame, ProtocolError};

/// Sentinel closing a read batch that returned nothing.
pub const NO_MESSAGES: &str = "NO_MESSAGES";

/// Sentinel closing a read batch that returned at least one message.
pub const END_OF_MESSAGES: &str = "END_OF_MESSAGES";

/// Pattern used when ListAccounts arrives with an empty payload.
pub const DEFAULT_LIST_PATTERN: &str = "*";

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Username + password (Login, CreateAccount).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl WireFormat for Credentials {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.username)?;
        w.put_short_str(&self.password)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: r.short_str("username")?,
            password: r.short_str("password")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendMessage {
    pub sender: String,
    pub recipient: String,
    pub body: String,
}

impl WireFormat for SendMessage {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.sender)?;
        w.put_short_str(&self.recipient)?;
        w.put_long_str(&self.body)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender: r.short_str("sender")?,
            recipient: r.short_str("recipient")?,
            body: r.long_str("body")?,
        })
    }
}

/// Pops up to `limit` queued messages; `0` means all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMessages {
    pub username: String,
    pub limit: u8,
}

impl WireFormat for ReadMessages {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.username)?;
        w.put_u8(self.limit);
        Ok(())
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let username = r.short_str("username")?;
        // Older clients omit the limit byte entirely.
        let limit = if r.remaining() > 0 { r.u8("limit")? } else { 0 };
        Ok(Self { username, limit })
    }
}

/// What a DeleteMessages request points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteTarget {
    /// Positions in the caller's undelivered queue.
    Queued { indices: Vec<u8> },
    /// Message ids within the conversation with `other`.
    Conversation { other: String, ids: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteMessages {
    pub username: String,
    pub target: DeleteTarget,
}

impl WireFormat for DeleteMessages {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.username)?;
        let list = match &self.target {
            DeleteTarget::Queued { indices } => indices,
            DeleteTarget::Conversation { other, ids } => {
                w.put_short_str(other)?;
                ids
            }
        };
        let count = u8::try_from(list.len()).map_err(|_| {
            ProtocolError::StringTooLong {
                len: list.len(),
                max: u8::MAX as usize,
            }
        })?;
        w.put_u8(count);
        w.put_bytes(list);
        Ok(())
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let username = r.short_str("username")?;

        // The optional other-user field has no tag. The queue form is
        // exactly `count` + `count` bytes, which the conversation form
        // (`len` + name + `count` + ids) can never be, so the remaining
        // length decides.
        let first = r.peek_u8().ok_or(ProtocolError::Truncated {
            field: "count",
            needed: 1,
        })?;
        let target = if r.remaining() == 1 + first as usize {
            let count = r.u8("count")? as usize;
            DeleteTarget::Queued {
                indices: r.bytes(count, "indices")?.to_vec(),
            }
        } else {
            let other = r.short_str("other_user")?;
            let count = r.u8("count")? as usize;
            DeleteTarget::Conversation {
                other,
                ids: r.bytes(count, "ids")?.to_vec(),
            }
        };

        Ok(Self { username, target })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewConversation {
    pub username: String,
    pub other: String,
}

impl WireFormat for ViewConversation {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.username)?;
        w.put_short_str(&self.other)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: r.short_str("username")?,
            other: r.short_str("other_user")?,
        })
    }
}

/// A request whose only field is the acting username
/// (DeleteAccount, Logoff, Close).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCommand {
    pub username: String,
}

impl WireFormat for UserCommand {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.username)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            username: r.short_str("username")?,
        })
    }
}

/// Shell-glob over account names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListAccounts {
    pub pattern: String,
}

impl WireFormat for ListAccounts {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.pattern)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let pattern = if r.remaining() == 0 {
            DEFAULT_LIST_PATTERN.to_string()
        } else {
            r.short_str("wildcard")?
        };
        Ok(Self { pattern })
    }
}

/// Client acknowledgement after draining a read batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadAck {
    pub token: String,
}

impl WireFormat for ReadAck {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.token)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        let token = if r.remaining() == 0 {
            String::new()
        } else {
            r.short_str("token")?
        };
        Ok(Self { token })
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// A human-readable status line (ShortStr).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status(pub String);

impl WireFormat for Status {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.0)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(r.short_str("status")?))
    }
}

/// A long text body (LongStr): conversation dumps, account lists and
/// read sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongText(pub String);

impl WireFormat for LongText {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_long_str(&self.0)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self(r.long_str("text")?))
    }
}

/// Sender + body. Used for live pushes and for each item of a read batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: String,
    pub body: String,
}

impl WireFormat for ChatMessage {
    fn encode(&self, w: &mut PayloadWriter) -> Result<(), ProtocolError> {
        w.put_short_str(&self.sender)?;
        w.put_long_str(&self.body)
    }

    fn decode(r: &mut PayloadReader<'_>) -> Result<Self, ProtocolError> {
        Ok(Self {
            sender: r.short_str("sender")?,
            body: r.long_str("body")?,
        })
    }
}

// ---------------------------------------------------------------------------
// Request — the tagged union the session handler dispatches on
// ---------------------------------------------------------------------------

/// Every request a client may send, decoded and typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login(Credentials),
    CreateAccount(Credentials),
    SendMessage(SendMessage),
    ReadMessages(ReadMessages),
    DeleteMessages(DeleteMessages),
    ViewConversation(ViewConversation),
    DeleteAccount(UserCommand),
    Logoff(UserCommand),
    Close(UserCommand),
    ListAccounts(ListAccounts),
    ReadAck(ReadAck),
}

impl Request {
    /// Decodes a client frame.
    ///
    /// # Errors
    /// - `UnknownCommand` for ids outside the table, and for `ChatPush`,
    ///   which only the server may send.
    /// - Any field-level error if the payload doesn't match the command.
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let command = Command::try_from(frame.command_id())?;
        let request = match command {
            Command::Login => Self::Login(frame.decode()?),
            Command::CreateAccount => Self::CreateAccount(frame.decode()?),
            Command::SendMessage => Self::SendMessage(frame.decode()?),
            Command::ReadMessages => Self::ReadMessages(frame.decode()?),
            Command::DeleteMessages => Self::DeleteMessages(frame.decode()?),
            Command::ViewConversation => {
                Self::ViewConversation(frame.decode()?)
            }
            Command::DeleteAccount => Self::DeleteAccount(frame.decode()?),
            Command::Logoff => Self::Logoff(frame.decode()?),
            Command::Close if frame.payload().is_empty() => {
                Self::Close(UserCommand {
                    username: String::new(),
                })
            }
            Command::Close => Self::Close(frame.decode()?),
            Command::ListAccounts => Self::ListAccounts(frame.decode()?),
            Command::ReadAck => Self::ReadAck(frame.decode()?),
            Command::ChatPush => {
                return Err(ProtocolError::UnknownCommand(command.into()));
            }
        };
        Ok(request)
    }

    /// Encodes this request as a frame (client side).
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let command = self.command();
        match self {
            Self::Login(c) | Self::CreateAccount(c) => Frame::from_value(command, c),
            Self::SendMessage(m) => Frame::from_value(command, m),
            Self::ReadMessages(m) => Frame::from_value(command, m),
            Self::DeleteMessages(m) => Frame::from_value(command, m),
            Self::ViewConversation(m) => Frame::from_value(command, m),
            Self::DeleteAccount(m) | Self::Logoff(m) | Self::Close(m) => {
                Frame::from_value(command, m)
            }
            Self::ListAccounts(m) => Frame::from_value(command, m),
            Self::ReadAck(m) => Frame::from_value(command, m),
        }
    }

    /// The command id this request travels under.
    pub fn command(&self) -> Command {
        match self {
            Self::Login(_) => Command::Login,
            Self::CreateAccount(_) => Command::CreateAccount,
            Self::SendMessage(_) => Command::SendMessage,
            Self::ReadMessages(_) => Command::ReadMessages,
            Self::DeleteMessages(_) => Command::DeleteMessages,
            Self::ViewConversation(_) => Command::ViewConversation,
            Self::DeleteAccount(_) => Command::DeleteAccount,
            Self::Logoff(_) => Command::Logoff,
            Self::Close(_) => Command::Close,
            Self::ListAccounts(_) => Command::ListAccounts,
            Self::ReadAck(_) => Command::ReadAck,
        }
    }

    /// The username a request claims to act as, for requests that must
    /// act as the logged-in user.
    pub fn acting_user(&self) -> Option<&str> {
        match self {
            Self::SendMessage(m) => Some(&m.sender),
            Self::ReadMessages(m) => Some(&m.username),
            Self::DeleteMessages(m) => Some(&m.username),
            Self::ViewConversation(m) => Some(&m.username),
            Self::DeleteAccount(m) | Self::Logoff(m) => Some(&m.username),
            Self::Login(_)
            | Self::CreateAccount(_)
            | Self::Close(_)
            | Self::ListAccounts(_)
            | Self::ReadAck(_) => None,
        }
    }
}
