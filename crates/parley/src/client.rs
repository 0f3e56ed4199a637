//! A typed async client for the Parley protocol.
//!
//! The server can push a `ChatPush` frame at any moment, including in
//! the middle of a request/response exchange. The client therefore reads
//! on a background task that splits incoming frames into two channels:
//! pushes go to [`next_push`](ParleyClient::next_push), everything else
//! is the answer to the request in flight.
//!
//! ```rust,no_run
//! use parley::ParleyClient;
//!
//! # async fn demo() -> Result<(), parley::ParleyError> {
//! let mut client = ParleyClient::connect("127.0.0.1:56789").await?;
//! client.create_account("alice", "pw1").await?;
//! client.login("alice", "pw1").await?;
//! client.send("bob", "hi").await?;
//! # Ok(())
//! # }
//! ```

use parley_protocol::{
    ChatMessage, Command, Credentials, DeleteMessages, DeleteTarget, Frame,
    ListAccounts, LongText, ProtocolError, ReadAck, ReadMessages, Request,
    SendMessage, Status, UserCommand, ViewConversation, read_frame,
    write_frame,
};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{ParleyError, status};

/// Token a client sends after draining a read batch.
pub const READ_ACK_TOKEN: &str = "DONE";

/// A reply that is either long text or a short status line.
///
/// ViewConversation and ListAccounts answer with a LongStr on success
/// and a ShortStr status when refused. The two layouts can't be confused:
/// a ShortStr never parses as a complete LongStr, and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Status(String),
}

/// The result of one ReadMessages exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadBatch {
    pub messages: Vec<ChatMessage>,
    /// `NO_MESSAGES`, `END_OF_MESSAGES`, or a refusal.
    pub sentinel: String,
}

/// A connection to a Parley server.
pub struct ParleyClient {
    writer: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<Frame>,
    pushes: mpsc::UnboundedReceiver<ChatMessage>,
    reader: JoinHandle<()>,
    /// The user this client logged in as, or empty.
    username: String,
}

impl ParleyClient {
    /// Opens a connection and starts the background reader.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ParleyError> {
        let stream = TcpStream::connect(addr).await.map_err(ProtocolError::from)?;
        stream.set_nodelay(true).map_err(ProtocolError::from)?;
        let (read_half, writer) = stream.into_split();

        let (response_tx, responses) = mpsc::unbounded_channel();
        let (push_tx, pushes) = mpsc::unbounded_channel();
        let reader = tokio::spawn(demux(read_half, response_tx, push_tx));

        Ok(Self {
            writer,
            responses,
            pushes,
            reader,
            username: String::new(),
        })
    }

    /// The logged-in username, empty before login.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn create_account(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<String, ParleyError> {
        let request = Request::CreateAccount(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self.status_exchange(&request).await
    }

    /// Logs in. On success later calls act as `username`.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<String, ParleyError> {
        let request = Request::Login(Credentials {
            username: username.into(),
            password: password.into(),
        });
        let reply = self.status_exchange(&request).await?;
        if reply.starts_with(status::LOGIN_OK_PREFIX) {
            self.username = username.to_owned();
        }
        Ok(reply)
    }

    pub async fn send(&mut self, recipient: &str, body: &str) -> Result<String, ParleyError> {
        let request = Request::SendMessage(SendMessage {
            sender: self.username.clone(),
            recipient: recipient.into(),
            body: body.into(),
        });
        self.status_exchange(&request).await
    }

    /// Fetches up to `limit` queued messages (0 = all) and acknowledges
    /// the batch.
    pub async fn read(&mut self, limit: u8) -> Result<ReadBatch, ParleyError> {
        let request = Request::ReadMessages(ReadMessages {
            username: self.username.clone(),
            limit,
        });
        self.request(&request).await?;

        let mut messages = Vec::new();
        let sentinel = loop {
            let frame = self.next_response().await?;
            match frame.command() {
                Some(Command::ReadMessages) => messages.push(frame.decode::<ChatMessage>()?),
                Some(Command::ReadAck) => break frame.decode::<LongText>()?.0,
                _ => return Err(ParleyError::UnexpectedResponse(frame.command_id())),
            }
        };

        let ack = Request::ReadAck(ReadAck {
            token: READ_ACK_TOKEN.into(),
        });
        self.request(&ack).await?;
        Ok(ReadBatch { messages, sentinel })
    }

    /// Deletes queued messages by position (0 = oldest).
    pub async fn delete_queued(&mut self, indices: &[u8]) -> Result<String, ParleyError> {
        let request = Request::DeleteMessages(DeleteMessages {
            username: self.username.clone(),
            target: DeleteTarget::Queued {
                indices: indices.to_vec(),
            },
        });
        self.status_exchange(&request).await
    }

    /// Deletes messages by id from the conversation with `other`.
    pub async fn delete_in_conversation(
        &mut self,
        other: &str,
        ids: &[u8],
    ) -> Result<String, ParleyError> {
        let request = Request::DeleteMessages(DeleteMessages {
            username: self.username.clone(),
            target: DeleteTarget::Conversation {
                other: other.into(),
                ids: ids.to_vec(),
            },
        });
        self.status_exchange(&request).await
    }

    pub async fn view_conversation(&mut self, other: &str) -> Result<Reply, ParleyError> {
        let request = Request::ViewConversation(ViewConversation {
            username: self.username.clone(),
            other: other.into(),
        });
        self.text_exchange(&request).await
    }

    pub async fn list_accounts(&mut self, pattern: &str) -> Result<Reply, ParleyError> {
        let request = Request::ListAccounts(ListAccounts {
            pattern: pattern.into(),
        });
        self.text_exchange(&request).await
    }

    pub async fn delete_account(&mut self) -> Result<String, ParleyError> {
        let request = Request::DeleteAccount(UserCommand {
            username: self.username.clone(),
        });
        let reply = self.status_exchange(&request).await?;
        if reply == status::ACCOUNT_DELETED {
            self.username.clear();
        }
        Ok(reply)
    }

    pub async fn logoff(&mut self) -> Result<String, ParleyError> {
        let request = Request::Logoff(UserCommand {
            username: self.username.clone(),
        });
        let reply = self.status_exchange(&request).await?;
        if reply == status::LOGGED_OFF {
            self.username.clear();
        }
        Ok(reply)
    }

    /// Says goodbye; the server closes the connection after replying.
    pub async fn close(mut self) -> Result<String, ParleyError> {
        let request = Request::Close(UserCommand {
            username: self.username.clone(),
        });
        self.status_exchange(&request).await
    }

    /// Waits for the next live-delivered message. `None` once the
    /// connection is gone.
    pub async fn next_push(&mut self) -> Option<ChatMessage> {
        self.pushes.recv().await
    }

    /// Returns a push that has already arrived, without waiting.
    pub fn try_next_push(&mut self) -> Option<ChatMessage> {
        self.pushes.try_recv().ok()
    }

    // -- Raw access -------------------------------------------------------

    /// Sends a request without waiting for the reply.
    pub async fn request(&mut self, request: &Request) -> Result<(), ParleyError> {
        self.send_frame(&request.to_frame()?).await
    }

    /// Sends an arbitrary frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), ParleyError> {
        write_frame(&mut self.writer, frame).await?;
        Ok(())
    }

    /// Waits for the next non-push frame from the server.
    pub async fn next_response(&mut self) -> Result<Frame, ParleyError> {
        self.responses.recv().await.ok_or(ParleyError::Disconnected)
    }

    async fn status_exchange(&mut self, request: &Request) -> Result<String, ParleyError> {
        self.request(request).await?;
        let frame = self.next_response().await?;
        if frame.command_id() != u8::from(request.command()) {
            return Err(ParleyError::UnexpectedResponse(frame.command_id()));
        }
        Ok(frame.decode::<Status>()?.0)
    }

    async fn text_exchange(&mut self, request: &Request) -> Result<Reply, ParleyError> {
        self.request(request).await?;
        let frame = self.next_response().await?;
        if frame.command_id() != u8::from(request.command()) {
            return Err(ParleyError::UnexpectedResponse(frame.command_id()));
        }
        match frame.decode::<LongText>() {
            Ok(LongText(text)) => Ok(Reply::Text(text)),
            Err(_) => Ok(Reply::Status(frame.decode::<Status>()?.0)),
        }
    }
}

impl Drop for ParleyClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Splits incoming frames into pushes and responses until the stream ends.
async fn demux(
    mut reader: OwnedReadHalf,
    responses: mpsc::UnboundedSender<Frame>,
    pushes: mpsc::UnboundedSender<ChatMessage>,
) {
    loop {
        let frame = match read_frame(&mut reader).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "client read failed");
                break;
            }
        };

        if frame.command() == Some(Command::ChatPush) {
            match frame.decode::<ChatMessage>() {
                Ok(message) => {
                    let _ = pushes.send(message);
                }
                Err(e) => tracing::debug!(error = %e, "malformed push"),
            }
        } else if responses.send(frame).is_err() {
            break;
        }
    }
}
