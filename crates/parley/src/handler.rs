//! Per-connection handler: the session state machine and its writer.
//!
//! Each accepted connection gets two Tokio tasks:
//!
//! - the **reader** (this module's [`handle_connection`]) reads frames,
//!   decodes them into [`Request`]s and dispatches them against the
//!   directory;
//! - the **writer** ([`write_loop`]) owns the socket's write half and
//!   drains the connection's outbound channel. Replies from the reader
//!   and live pushes routed from other connections both arrive there.
//!
//! ```text
//!                 ┌──── login / create_account ────┐
//!                 ▼                                │
//!   ──→ Unauthenticated ──login──→ Authenticated ──┤
//!            ▲    │                     │          │
//!            └────┼──logoff / delete────┘          │
//!                 │                     │          │
//!                 └──close / EOF──→ Closed ←─close / EOF
//! ```
//!
//! Domain errors become status replies and the loop carries on. A frame
//! that can't be decoded ends the connection; an unknown command id is
//! answered and survived.

use std::sync::Arc;

use parley_directory::{
    DeleteScope, Message, MessageId, Outbound, OutboundReceiver,
    OutboundSender, outbound_channel, render_conversation,
};
use parley_protocol::{
    ChatMessage, Command, Credentials, DeleteMessages, DeleteTarget,
    END_OF_MESSAGES, ERROR_COMMAND_ID, Frame, LONG_STR_MAX, ListAccounts,
    LongText, NO_MESSAGES, PayloadWriter, ProtocolError, ReadMessages,
    Request, SendMessage, Status, ViewConversation, read_frame, write_frame,
};
use parley_transport::{Connection, ConnectionId};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::server::ServerState;
use crate::{ParleyError, status};

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    /// Only CreateAccount, Login and Close are accepted.
    Unauthenticated,
    /// Logged in; requests act as `username`.
    Authenticated { username: String },
    /// The loop has ended or is about to.
    Closed,
}

/// What the loop should do after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One connection's state, as seen by its reader task.
///
/// If the task ends without going through [`finish`](Self::finish) (a
/// panic, or the task being cancelled), `Drop` still releases the
/// directory session.
struct Session {
    conn_id: ConnectionId,
    state: SessionState,
    outbound: OutboundSender,
    server: Arc<ServerState>,
}

impl Drop for Session {
    fn drop(&mut self) {
        let SessionState::Authenticated { username } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let conn_id = self.conn_id;
        let server = Arc::clone(&self.server);
        runtime.spawn(async move {
            server.directory.lock().await.clear_session(&username, conn_id);
        });
    }
}

// ---------------------------------------------------------------------------
// Connection entry point
// ---------------------------------------------------------------------------

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Connection>(
    conn: C,
    server: Arc<ServerState>,
) -> Result<(), ParleyError> {
    let conn_id = conn.id();
    let (mut reader, writer) = conn.into_split();
    tracing::debug!(%conn_id, "handling new connection");

    let (outbound, rx) = outbound_channel();
    let writer_task =
        tokio::spawn(write_loop(conn_id, writer, rx, Arc::clone(&server)));

    let mut session = Session {
        conn_id,
        state: SessionState::Unauthenticated,
        outbound,
        server,
    };
    let result = session.run(&mut reader).await;
    session.finish().await;

    // Dropping the last sender lets the writer flush what is queued
    // (e.g. the Goodbye reply) and exit.
    drop(session);
    if let Err(e) = writer_task.await {
        tracing::warn!(%conn_id, error = %e, "writer task failed");
    }

    tracing::debug!(%conn_id, "connection closed");
    result
}

impl Session {
    async fn run<R>(&mut self, reader: &mut R) -> Result<(), ParleyError>
    where
        R: AsyncRead + Unpin,
    {
        loop {
            let Some(frame) = self.next_frame(reader).await? else {
                tracing::debug!(conn_id = %self.conn_id, "peer closed connection");
                return Ok(());
            };

            let request = match Request::from_frame(&frame) {
                Ok(request) => request,
                Err(ProtocolError::UnknownCommand(id)) => {
                    tracing::debug!(conn_id = %self.conn_id, id, "unknown command");
                    self.reply(unknown_command_frame()?)?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if self.dispatch(request).await? == Flow::Close {
                return Ok(());
            }
        }
    }

    async fn next_frame<R>(&self, reader: &mut R) -> Result<Option<Frame>, ParleyError>
    where
        R: AsyncRead + Unpin,
    {
        let Some(limit) = self.server.idle_timeout else {
            return Ok(read_frame(reader).await?);
        };
        match tokio::time::timeout(limit, read_frame(reader)).await {
            Ok(frame) => Ok(frame?),
            Err(_) => {
                tracing::info!(conn_id = %self.conn_id, "connection idle, closing");
                Err(ParleyError::IdleTimeout)
            }
        }
    }

    /// Releases the directory session, if any, and marks the connection
    /// closed.
    async fn finish(&mut self) {
        if let SessionState::Authenticated { username } =
            std::mem::replace(&mut self.state, SessionState::Closed)
        {
            self.server
                .directory
                .lock()
                .await
                .clear_session(&username, self.conn_id);
        }
    }

    // -- Dispatch ---------------------------------------------------------

    /// Checks the session state, then hands the request to its handler.
    async fn dispatch(&mut self, request: Request) -> Result<Flow, ParleyError> {
        let command = request.command();
        self.check_session_held().await;
        if let Some(refusal) = self.authorize(&request) {
            tracing::debug!(conn_id = %self.conn_id, %command, %refusal, "request refused");
            self.refuse(command, refusal)?;
            return Ok(Flow::Continue);
        }

        match request {
            Request::Login(c) => self.login(c).await,
            Request::CreateAccount(c) => self.create_account(c).await,
            Request::SendMessage(m) => self.send_message(m).await,
            Request::ReadMessages(m) => self.read_messages(m).await,
            Request::DeleteMessages(m) => self.delete_messages(m).await,
            Request::ViewConversation(m) => self.view_conversation(m).await,
            Request::DeleteAccount(m) => self.delete_account(&m.username).await,
            Request::Logoff(m) => self.logoff(&m.username).await,
            Request::Close(_) => self.close().await,
            Request::ListAccounts(m) => self.list_accounts(m).await,
            // Acknowledges a read batch; nothing to answer.
            Request::ReadAck(_) => Ok(Flow::Continue),
        }
    }

    /// Drops back to `Unauthenticated` if the directory no longer binds
    /// this connection's user to it. That happens when a new login
    /// replaced the session after this connection's writer died.
    async fn check_session_held(&mut self) {
        let SessionState::Authenticated { username } = &self.state else {
            return;
        };
        let holder = self
            .server
            .directory
            .lock()
            .await
            .session(username)
            .map(|session| session.conn_id);
        if holder != Some(self.conn_id) {
            tracing::info!(conn_id = %self.conn_id, user = %username, "session no longer held");
            self.state = SessionState::Unauthenticated;
        }
    }

    /// Returns the refusal text if the request may not run in this state.
    fn authorize(&self, request: &Request) -> Option<String> {
        if matches!(request, Request::ReadAck(_)) {
            return None;
        }
        match &self.state {
            SessionState::Authenticated { username } => match request.acting_user() {
                Some(user) if user != username => Some(status::not_logged_in_as(user)),
                _ => None,
            },
            _ if request.command().allowed_unauthenticated() => None,
            _ => Some(status::NOT_LOGGED_IN.to_string()),
        }
    }

    /// Sends a refusal where the client expects the reply.
    ///
    /// A read batch always ends on a ReadAck frame, so a refused read is
    /// reported in the sentinel position.
    fn refuse(&self, command: Command, text: String) -> Result<(), ParleyError> {
        match command {
            Command::ReadMessages => {
                self.reply(Frame::from_value(Command::ReadAck, &LongText(text))?)
            }
            _ => self.reply_status(command, text),
        }
    }

    // -- Handlers ---------------------------------------------------------

    async fn login(&mut self, c: Credentials) -> Result<Flow, ParleyError> {
        if matches!(self.state, SessionState::Authenticated { .. }) {
            self.reply_status(Command::Login, status::ALREADY_LOGGED_IN)?;
            return Ok(Flow::Continue);
        }

        let result = self.server.directory.lock().await.login(
            &c.username,
            &c.password,
            self.conn_id,
            self.outbound.clone(),
        );

        let text = match result {
            Ok(unread) => {
                self.state = SessionState::Authenticated {
                    username: c.username,
                };
                status::login_ok(unread)
            }
            Err(e) => {
                tracing::info!(conn_id = %self.conn_id, user = %c.username, error = %e, "login refused");
                status::for_directory_error(Command::Login, &e)
            }
        };
        self.reply_status(Command::Login, text)?;
        Ok(Flow::Continue)
    }

    async fn create_account(&mut self, c: Credentials) -> Result<Flow, ParleyError> {
        let result = self
            .server
            .directory
            .lock()
            .await
            .create_account(&c.username, &c.password);

        let text = match result {
            Ok(()) => status::ACCOUNT_CREATED.to_string(),
            Err(e) => status::for_directory_error(Command::CreateAccount, &e),
        };
        self.reply_status(Command::CreateAccount, text)?;
        Ok(Flow::Continue)
    }

    async fn send_message(&mut self, m: SendMessage) -> Result<Flow, ParleyError> {
        // Reject bodies whose push frame could never be built, before
        // anything is stored.
        let chat = ChatMessage {
            sender: m.sender,
            body: m.body,
        };
        if Frame::from_value(Command::ChatPush, &chat).is_err() {
            self.reply_status(Command::SendMessage, status::MESSAGE_TOO_LONG)?;
            return Ok(Flow::Continue);
        }

        let result = self
            .server
            .directory
            .lock()
            .await
            .send(&chat.sender, &m.recipient, &chat.body);

        let text = match result {
            Ok(_) => status::MESSAGE_SENT.to_string(),
            Err(e) => status::for_directory_error(Command::SendMessage, &e),
        };
        self.reply_status(Command::SendMessage, text)?;
        Ok(Flow::Continue)
    }

    async fn read_messages(&mut self, m: ReadMessages) -> Result<Flow, ParleyError> {
        let result = self
            .server
            .directory
            .lock()
            .await
            .pop_undelivered(&m.username, usize::from(m.limit));

        let messages = match result {
            Ok(messages) => messages,
            Err(e) => {
                let text = status::for_directory_error(Command::ReadMessages, &e);
                self.refuse(Command::ReadMessages, text)?;
                return Ok(Flow::Continue);
            }
        };

        let sentinel = if messages.is_empty() {
            NO_MESSAGES
        } else {
            END_OF_MESSAGES
        };
        let count = messages.len();
        let mut batch = messages.into_iter();
        while let Some(message) = batch.next() {
            if let Err(e) = self.outbound.send(Outbound::Batched(message)) {
                // The writer is gone; nothing taken may be lost.
                let mut back: Vec<Message> = e.0.into_undelivered().into_iter().collect();
                back.extend(batch);
                requeue(self.conn_id, &self.server, back).await;
                return Err(ParleyError::Disconnected);
            }
        }
        self.reply(Frame::from_value(Command::ReadAck, &LongText(sentinel.into()))?)?;

        tracing::debug!(
            conn_id = %self.conn_id,
            user = %m.username,
            count,
            "delivered queued messages"
        );
        Ok(Flow::Continue)
    }

    async fn delete_messages(&mut self, m: DeleteMessages) -> Result<Flow, ParleyError> {
        let result = {
            let mut directory = self.server.directory.lock().await;
            match &m.target {
                DeleteTarget::Queued { indices } => {
                    let indices: Vec<usize> =
                        indices.iter().map(|&i| usize::from(i)).collect();
                    directory.delete_messages(&m.username, DeleteScope::Queued(&indices))
                }
                DeleteTarget::Conversation { other, ids } => {
                    let ids: Vec<MessageId> =
                        ids.iter().map(|&id| MessageId(u64::from(id))).collect();
                    directory.delete_messages(
                        &m.username,
                        DeleteScope::Conversation { other, ids: &ids },
                    )
                }
            }
        };

        let text = match result {
            Ok(_) => status::MESSAGES_DELETED.to_string(),
            Err(e) => status::for_directory_error(Command::DeleteMessages, &e),
        };
        self.reply_status(Command::DeleteMessages, text)?;
        Ok(Flow::Continue)
    }

    async fn view_conversation(&mut self, m: ViewConversation) -> Result<Flow, ParleyError> {
        let result = self
            .server
            .directory
            .lock()
            .await
            .view_conversation(&m.username, &m.other);

        match result {
            Ok(history) => {
                let text = render_conversation(&history)
                    .unwrap_or_else(|| status::NO_CONVERSATION.to_string());
                self.reply(Frame::from_value(Command::ViewConversation, &LongText(text))?)?;
            }
            Err(e) => {
                let text = status::for_directory_error(Command::ViewConversation, &e);
                self.reply_status(Command::ViewConversation, text)?;
            }
        }
        Ok(Flow::Continue)
    }

    async fn delete_account(&mut self, username: &str) -> Result<Flow, ParleyError> {
        let result = self.server.directory.lock().await.delete_account(username);

        let text = match result {
            Ok(()) => {
                self.state = SessionState::Unauthenticated;
                status::ACCOUNT_DELETED.to_string()
            }
            Err(e) => status::for_directory_error(Command::DeleteAccount, &e),
        };
        self.reply_status(Command::DeleteAccount, text)?;
        Ok(Flow::Continue)
    }

    async fn logoff(&mut self, username: &str) -> Result<Flow, ParleyError> {
        self.server
            .directory
            .lock()
            .await
            .clear_session(username, self.conn_id);
        self.state = SessionState::Unauthenticated;
        tracing::info!(conn_id = %self.conn_id, user = %username, "logged off");

        self.reply_status(Command::Logoff, status::LOGGED_OFF)?;
        Ok(Flow::Continue)
    }

    async fn close(&mut self) -> Result<Flow, ParleyError> {
        self.finish().await;
        self.reply_status(Command::Close, status::GOODBYE)?;
        Ok(Flow::Close)
    }

    async fn list_accounts(&mut self, m: ListAccounts) -> Result<Flow, ParleyError> {
        let names = self.server.directory.lock().await.list_accounts(&m.pattern);
        let text = join_within(&names, LONG_STR_MAX);
        self.reply(Frame::from_value(Command::ListAccounts, &LongText(text))?)?;
        Ok(Flow::Continue)
    }

    // -- Replies ----------------------------------------------------------

    fn reply_status(
        &self,
        command: Command,
        text: impl Into<String>,
    ) -> Result<(), ParleyError> {
        let text = status::fit(text.into());
        self.reply(Frame::from_value(command, &Status(text))?)
    }

    /// Queues a frame for this connection's writer.
    fn reply(&self, frame: Frame) -> Result<(), ParleyError> {
        self.outbound
            .send(Outbound::Frame(frame))
            .map_err(|_| ParleyError::Disconnected)
    }
}

/// The reply to a frame whose command id is not in the table. It goes
/// out under id 0, which no command uses.
fn unknown_command_frame() -> Result<Frame, ParleyError> {
    let mut payload = PayloadWriter::new();
    payload.put_short_str(status::UNKNOWN_COMMAND)?;
    Ok(Frame::new(ERROR_COMMAND_ID, payload.into_bytes())?)
}

/// Comma-joins `names`, stopping before the text would exceed `max` bytes.
fn join_within(names: &[String], max: usize) -> String {
    let mut out = String::new();
    for name in names {
        let extra = if out.is_empty() { name.len() } else { name.len() + 1 };
        if out.len() + extra > max {
            break;
        }
        if !out.is_empty() {
            out.push(',');
        }
        out.push_str(name);
    }
    out
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Drains a connection's outbound channel onto its socket.
///
/// Runs until every sender is gone. On the first failed write it closes
/// the channel (so routing falls back to queueing from then on) and
/// hands the failed message plus every message still waiting, pushed or
/// batched, back to the directory.
async fn write_loop<W>(
    conn_id: ConnectionId,
    mut writer: W,
    mut rx: OutboundReceiver,
    server: Arc<ServerState>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    while let Some(item) = rx.recv().await {
        let written = match &item {
            Outbound::Frame(frame) => write_frame(&mut writer, frame).await,
            Outbound::Push(message) => {
                write_message(&mut writer, Command::ChatPush, message).await
            }
            Outbound::Batched(message) => {
                write_message(&mut writer, Command::ReadMessages, message).await
            }
        };

        if let Err(e) = written {
            tracing::debug!(%conn_id, error = %e, "write failed");
            rx.close();

            let mut undelivered: Vec<Message> = item.into_undelivered().into_iter().collect();
            while let Ok(pending) = rx.try_recv() {
                undelivered.extend(pending.into_undelivered());
            }
            requeue(conn_id, &server, undelivered).await;
            return;
        }
    }
}

async fn write_message<W>(
    writer: &mut W,
    command: Command,
    message: &Message,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = Frame::from_value(command, &message.to_chat())?;
    write_frame(writer, &frame).await
}

/// Puts messages that never reached the socket back in their queues.
async fn requeue(conn_id: ConnectionId, server: &ServerState, mut messages: Vec<Message>) {
    if messages.is_empty() {
        return;
    }
    messages.sort_by_key(|m| m.id);

    let mut directory = server.directory.lock().await;
    for message in messages {
        let recipient = message.recipient.clone();
        directory.clear_session(&recipient, conn_id);
        directory.requeue(&recipient, message);
    }
}
