//! The directory: every account, session and conversation on the server.
//!
//! # Concurrency note
//!
//! `Directory` is NOT thread-safe by itself. It is plain owned data,
//! mutated through `&mut self`. The server wraps a single instance in a
//! `tokio::sync::Mutex` and every logical operation (`login`, `send`,
//! `pop_undelivered`, ...) runs as one method call under that lock, so
//! read-then-modify sequences are atomic with respect to other
//! connections. Methods return owned data and never hand out borrows
//! that could be held across an `.await`.
//!
//! # Consistency
//!
//! A stored message lives in exactly one conversation. Until its
//! recipient reads it, a copy also sits in the recipient's undelivered
//! queue. Deleting a message removes it from both places, whichever
//! view the delete was addressed through.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use globset::Glob;
use parley_protocol::DEFAULT_LIST_PATTERN;
use parley_transport::ConnectionId;

use crate::router::{self, OutboundSender, Route};
use crate::{ConversationKey, DirectoryError, Message, MessageId, PasswordHash};

/// Character that separates names in a ListAccounts response.
const LIST_SEPARATOR: char = ',';

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A registered user.
#[derive(Debug)]
pub struct Account {
    username: String,
    password: PasswordHash,
    undelivered: VecDeque<Message>,
}

impl Account {
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Number of messages waiting to be read.
    pub fn undelivered_count(&self) -> usize {
        self.undelivered.len()
    }

    /// Queued messages, oldest first.
    pub fn undelivered(&self) -> impl Iterator<Item = &Message> {
        self.undelivered.iter()
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password.verify(password)
    }
}

/// The live connection an account is logged in on.
#[derive(Debug, Clone)]
pub struct Session {
    pub conn_id: ConnectionId,
    outbound: OutboundSender,
}

/// What a DeleteMessages request addresses.
#[derive(Debug, Clone, Copy)]
pub enum DeleteScope<'a> {
    /// Positions in the caller's undelivered queue (0 = oldest).
    Queued(&'a [usize]),
    /// Message ids in the caller's conversation with `other`.
    Conversation { other: &'a str, ids: &'a [MessageId] },
}

/// Outcome of a successful [`Directory::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sent {
    pub id: MessageId,
    pub route: Route,
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Owns all accounts, sessions and conversations.
///
/// ## Session lifecycle
///
/// ```text
/// create_account() ──→ login() ──→ logoff() / connection lost ──→ login() ...
///                         │
///                         └──→ delete_account() (only with an empty queue)
/// ```
#[derive(Debug)]
pub struct Directory {
    accounts: HashMap<String, Account>,
    /// At most one session per username.
    sessions: HashMap<String, Session>,
    conversations: HashMap<ConversationKey, Vec<Message>>,
    /// Next id to hand out. Starts at 1; only stored messages consume one.
    next_message_id: u64,
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

impl Directory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self {
            accounts: HashMap::new(),
            sessions: HashMap::new(),
            conversations: HashMap::new(),
            next_message_id: 1,
        }
    }

    // -- Accounts ---------------------------------------------------------

    /// Registers a new account with an empty queue.
    ///
    /// # Errors
    /// - [`DirectoryError::InvalidUsername`] for an empty name or one
    ///   containing the list separator
    /// - [`DirectoryError::AlreadyExists`] if the name is taken
    pub fn create_account(
        &mut self,
        username: &str,
        password: &str,
    ) -> Result<(), DirectoryError> {
        if username.is_empty() || username.contains(LIST_SEPARATOR) {
            return Err(DirectoryError::InvalidUsername(username.to_owned()));
        }
        if self.accounts.contains_key(username) {
            return Err(DirectoryError::AlreadyExists(username.to_owned()));
        }

        self.accounts.insert(
            username.to_owned(),
            Account {
                username: username.to_owned(),
                password: PasswordHash::new(password),
                undelivered: VecDeque::new(),
            },
        );
        tracing::info!(user = %username, "account created");
        Ok(())
    }

    pub fn find_account(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    /// Removes an account, its session and every conversation it took
    /// part in.
    ///
    /// Messages it sent that are still queued for other users go too, so
    /// a later account created under the same name starts with no history.
    ///
    /// # Errors
    /// - [`DirectoryError::NoSuchUser`]
    /// - [`DirectoryError::PendingMessages`] while the queue is non-empty
    pub fn delete_account(&mut self, username: &str) -> Result<(), DirectoryError> {
        let account = self.account(username)?;
        let count = account.undelivered_count();
        if count > 0 {
            return Err(DirectoryError::PendingMessages {
                user: username.to_owned(),
                count,
            });
        }

        self.accounts.remove(username);
        self.sessions.remove(username);

        let before = self.conversations.len();
        self.conversations.retain(|key, _| !key.involves(username));
        let dropped = before - self.conversations.len();
        for account in self.accounts.values_mut() {
            account.undelivered.retain(|m| m.sender != username);
        }

        tracing::info!(user = %username, conversations = dropped, "account deleted");
        Ok(())
    }

    /// Account names matching a shell glob (`*`, `?`, `[...]`), sorted.
    ///
    /// An empty pattern means `*`. A pattern that doesn't parse matches
    /// nothing.
    pub fn list_accounts(&self, pattern: &str) -> Vec<String> {
        let pattern = if pattern.is_empty() {
            DEFAULT_LIST_PATTERN
        } else {
            pattern
        };
        let matcher = match Glob::new(pattern) {
            Ok(glob) => glob.compile_matcher(),
            Err(e) => {
                tracing::debug!(%pattern, error = %e, "invalid account pattern");
                return Vec::new();
            }
        };

        let mut names: Vec<String> = self
            .accounts
            .keys()
            .filter(|name| matcher.is_match(name.as_str()))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Number of registered accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    // -- Sessions ---------------------------------------------------------

    /// Checks credentials and records a session for `conn_id`.
    ///
    /// Returns the number of messages waiting in the account's queue.
    ///
    /// # Errors
    /// - [`DirectoryError::NoSuchUser`]
    /// - [`DirectoryError::BadCredentials`]
    /// - [`DirectoryError::AlreadyLoggedIn`] if another live connection
    ///   holds the session
    pub fn login(
        &mut self,
        username: &str,
        password: &str,
        conn_id: ConnectionId,
        outbound: OutboundSender,
    ) -> Result<usize, DirectoryError> {
        let account = self.account(username)?;
        if !account.verify_password(password) {
            return Err(DirectoryError::BadCredentials);
        }
        let unread = account.undelivered_count();

        self.set_session(username, conn_id, outbound)?;
        tracing::info!(user = %username, %conn_id, unread, "logged in");
        Ok(unread)
    }

    /// Binds `username` to a connection.
    ///
    /// A session whose writer has already gone away is stale and gets
    /// replaced; a live one is never taken over.
    pub fn set_session(
        &mut self,
        username: &str,
        conn_id: ConnectionId,
        outbound: OutboundSender,
    ) -> Result<(), DirectoryError> {
        self.account(username)?;
        if let Some(existing) = self.sessions.get(username) {
            if !existing.outbound.is_closed() {
                return Err(DirectoryError::AlreadyLoggedIn(username.to_owned()));
            }
            tracing::debug!(
                user = %username,
                stale = %existing.conn_id,
                "replacing stale session"
            );
        }

        self.sessions
            .insert(username.to_owned(), Session { conn_id, outbound });
        Ok(())
    }

    /// Removes `username`'s session if it belongs to `conn_id`.
    ///
    /// Returns `false` (and changes nothing) if the user has no session
    /// or it belongs to a different connection.
    pub fn clear_session(&mut self, username: &str, conn_id: ConnectionId) -> bool {
        match self.sessions.get(username) {
            Some(session) if session.conn_id == conn_id => {
                self.sessions.remove(username);
                tracing::info!(user = %username, %conn_id, "session cleared");
                true
            }
            _ => false,
        }
    }

    pub fn session(&self, username: &str) -> Option<&Session> {
        self.sessions.get(username)
    }

    pub fn is_online(&self, username: &str) -> bool {
        self.sessions.contains_key(username)
    }

    // -- Messages ---------------------------------------------------------

    /// Stores a message and delivers it.
    ///
    /// The message is appended to the sender/recipient conversation under
    /// a fresh id, then pushed live if the recipient has a session, or
    /// appended to the recipient's queue otherwise.
    ///
    /// # Errors
    /// [`DirectoryError::NoSuchUser`] if either party is unknown. Nothing
    /// is stored and no id is consumed in that case.
    pub fn send(
        &mut self,
        sender: &str,
        recipient: &str,
        body: &str,
    ) -> Result<Sent, DirectoryError> {
        self.account(sender)?;
        self.account(recipient)?;

        let id = MessageId(self.next_message_id);
        self.next_message_id += 1;

        let message = Message {
            id,
            sender: sender.to_owned(),
            recipient: recipient.to_owned(),
            body: body.to_owned(),
            sent_at: Utc::now(),
        };
        self.append_conversation(message.clone());

        let live = self.sessions.get(recipient).map(|s| &s.outbound);
        let route = router::route(live, &message);
        if route == Route::Queue {
            self.append_undelivered(recipient, message)?;
        }

        tracing::debug!(%sender, %recipient, %id, ?route, "message routed");
        Ok(Sent { id, route })
    }

    /// Appends to the back of `username`'s queue.
    pub fn append_undelivered(
        &mut self,
        username: &str,
        message: Message,
    ) -> Result<(), DirectoryError> {
        self.account_mut(username)?.undelivered.push_back(message);
        Ok(())
    }

    /// Puts back a message whose live delivery failed.
    ///
    /// The message is inserted in id order. It is ignored (returns
    /// `false`) if the account is gone, if the message has been deleted
    /// from its conversation meanwhile, or if it is already queued.
    pub fn requeue(&mut self, username: &str, message: Message) -> bool {
        let key = ConversationKey::new(&message.sender, &message.recipient);
        let still_stored = self
            .conversations
            .get(&key)
            .is_some_and(|log| log.iter().any(|m| m.id == message.id));
        if !still_stored {
            return false;
        }

        let Some(account) = self.accounts.get_mut(username) else {
            return false;
        };
        if account.undelivered.iter().any(|m| m.id == message.id) {
            return false;
        }

        let id = message.id;
        let at = account.undelivered.partition_point(|m| m.id < id);
        account.undelivered.insert(at, message);
        tracing::warn!(user = %username, %id, "live delivery failed, message queued");
        true
    }

    /// Removes and returns up to `limit` of the oldest queued messages.
    /// A `limit` of 0 takes them all.
    pub fn pop_undelivered(
        &mut self,
        username: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DirectoryError> {
        let queue = &mut self.account_mut(username)?.undelivered;
        let take = if limit == 0 {
            queue.len()
        } else {
            limit.min(queue.len())
        };
        Ok(queue.drain(..take).collect())
    }

    /// Deletes messages by queue position or by conversation id.
    ///
    /// Returns how many distinct messages were removed.
    ///
    /// # Errors
    /// - [`DirectoryError::NoSuchUser`] if `username` is unknown
    /// - [`DirectoryError::NoMatch`] if nothing was removed
    pub fn delete_messages(
        &mut self,
        username: &str,
        scope: DeleteScope<'_>,
    ) -> Result<usize, DirectoryError> {
        let account = self.account(username)?;

        // Resolve the request to (conversation, ids) pairs first; the
        // removal below is then the same for both addressing modes.
        let targets: Vec<(ConversationKey, MessageId)> = match scope {
            DeleteScope::Queued(indices) => {
                let wanted: HashSet<usize> = indices.iter().copied().collect();
                account
                    .undelivered
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| wanted.contains(i))
                    .map(|(_, m)| {
                        (ConversationKey::new(&m.sender, &m.recipient), m.id)
                    })
                    .collect()
            }
            DeleteScope::Conversation { other, ids } => {
                let key = ConversationKey::new(username, other);
                let wanted: HashSet<MessageId> = ids.iter().copied().collect();
                self.conversations
                    .get(&key)
                    .map(|log| {
                        log.iter()
                            .filter(|m| wanted.contains(&m.id))
                            .map(|m| (key.clone(), m.id))
                            .collect()
                    })
                    .unwrap_or_default()
            }
        };

        if targets.is_empty() {
            return Err(DirectoryError::NoMatch);
        }

        let removed: HashSet<MessageId> = targets.iter().map(|(_, id)| *id).collect();
        for (key, _) in &targets {
            if let Some(log) = self.conversations.get_mut(key) {
                log.retain(|m| !removed.contains(&m.id));
                if log.is_empty() {
                    self.conversations.remove(key);
                }
            }
        }
        // Only the two participants of a conversation can have its
        // messages queued, but checking every account keeps this simple.
        for account in self.accounts.values_mut() {
            account.undelivered.retain(|m| !removed.contains(&m.id));
        }

        tracing::info!(user = %username, count = removed.len(), "messages deleted");
        Ok(removed.len())
    }

    /// The full history between `username` and `other`, oldest first.
    /// Read-only: queues are not touched.
    ///
    /// # Errors
    /// [`DirectoryError::NoSuchUser`] if either account is unknown.
    pub fn view_conversation(
        &self,
        username: &str,
        other: &str,
    ) -> Result<Vec<Message>, DirectoryError> {
        self.account(username)?;
        self.account(other)?;
        let key = ConversationKey::new(username, other);
        Ok(self.conversations.get(&key).cloned().unwrap_or_default())
    }

    /// Drops every message from `other` out of `username`'s queue and
    /// returns how many were dropped. The conversation keeps them.
    pub fn mark_read(
        &mut self,
        username: &str,
        other: &str,
    ) -> Result<usize, DirectoryError> {
        let queue = &mut self.account_mut(username)?.undelivered;
        let before = queue.len();
        queue.retain(|m| m.sender != other);
        Ok(before - queue.len())
    }

    /// Number of messages stored between `a` and `b`.
    pub fn conversation_len(&self, a: &str, b: &str) -> usize {
        self.conversations
            .get(&ConversationKey::new(a, b))
            .map_or(0, Vec::len)
    }

    // -- Internals --------------------------------------------------------

    fn append_conversation(&mut self, message: Message) {
        let key = ConversationKey::new(&message.sender, &message.recipient);
        self.conversations.entry(key).or_default().push(message);
    }

    fn account(&self, username: &str) -> Result<&Account, DirectoryError> {
        self.accounts
            .get(username)
            .ok_or_else(|| DirectoryError::NoSuchUser(username.to_owned()))
    }

    fn account_mut(&mut self, username: &str) -> Result<&mut Account, DirectoryError> {
        self.accounts
            .get_mut(username)
            .ok_or_else(|| DirectoryError::NoSuchUser(username.to_owned()))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `Directory`, named `test_{function}_{scenario}_{expected}`.

    use super::*;
    use crate::router::{Outbound, OutboundReceiver, outbound_channel};

    // -- Helpers ----------------------------------------------------------

    fn directory_with(users: &[&str]) -> Directory {
        let mut dir = Directory::new();
        for user in users {
            dir.create_account(user, "pw").unwrap();
        }
        dir
    }

    fn conn(n: u64) -> ConnectionId {
        ConnectionId::new(n)
    }

    fn login(dir: &mut Directory, user: &str, n: u64) -> OutboundReceiver {
        let (tx, rx) = outbound_channel();
        dir.login(user, "pw", conn(n), tx).unwrap();
        rx
    }

    fn bodies(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.body.as_str()).collect()
    }

    // =====================================================================
    // create_account / delete_account / list_accounts
    // =====================================================================

    #[test]
    fn test_create_account_duplicate_returns_already_exists() {
        let mut dir = directory_with(&["alice"]);
        assert_eq!(
            dir.create_account("alice", "other"),
            Err(DirectoryError::AlreadyExists("alice".into()))
        );
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_create_account_usernames_are_case_sensitive() {
        let mut dir = directory_with(&["alice"]);
        assert!(dir.create_account("Alice", "pw").is_ok());
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_create_account_invalid_names_rejected() {
        let mut dir = Directory::new();
        for bad in ["", "a,b"] {
            assert!(matches!(
                dir.create_account(bad, "pw"),
                Err(DirectoryError::InvalidUsername(_))
            ));
        }
        assert!(dir.is_empty());
    }

    #[test]
    fn test_delete_account_unknown_returns_no_such_user() {
        let mut dir = Directory::new();
        assert_eq!(
            dir.delete_account("ghost"),
            Err(DirectoryError::NoSuchUser("ghost".into()))
        );
    }

    #[test]
    fn test_delete_account_with_pending_messages_is_blocked() {
        let mut dir = directory_with(&["alice", "carol"]);
        dir.send("alice", "carol", "m1").unwrap();

        assert_eq!(
            dir.delete_account("carol"),
            Err(DirectoryError::PendingMessages {
                user: "carol".into(),
                count: 1
            })
        );
        assert!(dir.find_account("carol").is_some());
    }

    #[test]
    fn test_delete_account_removes_session_and_history() {
        let mut dir = directory_with(&["alice", "bob", "carol"]);
        dir.send("alice", "bob", "hi").unwrap();
        dir.send("alice", "carol", "untouched").unwrap();
        dir.pop_undelivered("bob", 0).unwrap();
        let _rx = login(&mut dir, "bob", 1);

        dir.delete_account("bob").unwrap();
        assert!(dir.find_account("bob").is_none());
        assert!(!dir.is_online("bob"));
        assert_eq!(dir.conversation_len("alice", "bob"), 0);
        assert_eq!(dir.conversation_len("alice", "carol"), 1);
    }

    #[test]
    fn test_delete_account_recreated_name_sees_no_old_history() {
        let mut dir = directory_with(&["alice", "bob"]);
        let sent = dir.send("alice", "bob", "secret for old bob").unwrap();
        dir.pop_undelivered("bob", 0).unwrap();
        dir.delete_account("bob").unwrap();

        dir.create_account("bob", "other").unwrap();
        assert!(dir.view_conversation("bob", "alice").unwrap().is_empty());
        let ids = [sent.id];
        assert_eq!(
            dir.delete_messages("bob", DeleteScope::Conversation { other: "alice", ids: &ids }),
            Err(DirectoryError::NoMatch)
        );
    }

    #[test]
    fn test_delete_account_drops_its_queued_outgoing_messages() {
        let mut dir = directory_with(&["alice", "bob"]);
        dir.send("bob", "alice", "from old bob").unwrap();
        dir.delete_account("bob").unwrap();

        dir.create_account("bob", "other").unwrap();
        assert_eq!(dir.find_account("alice").unwrap().undelivered_count(), 0);
    }

    #[test]
    fn test_list_accounts_glob_sorted() {
        let dir = directory_with(&["bob", "alice", "alan", "carol"]);
        assert_eq!(dir.list_accounts("al*"), vec!["alan", "alice"]);
        assert_eq!(dir.list_accounts("?ob"), vec!["bob"]);
        assert_eq!(dir.list_accounts("[bc]*"), vec!["bob", "carol"]);
        assert_eq!(dir.list_accounts("").len(), 4);
        assert_eq!(dir.list_accounts("*"), vec!["alan", "alice", "bob", "carol"]);
    }

    #[test]
    fn test_list_accounts_invalid_pattern_matches_nothing() {
        let dir = directory_with(&["alice"]);
        assert!(dir.list_accounts("[a").is_empty());
    }

    // =====================================================================
    // login / sessions
    // =====================================================================

    #[test]
    fn test_login_returns_unread_count() {
        let mut dir = directory_with(&["alice", "bob"]);
        dir.send("alice", "bob", "1").unwrap();
        dir.send("alice", "bob", "2").unwrap();

        let (tx, _rx) = outbound_channel();
        assert_eq!(dir.login("bob", "pw", conn(1), tx), Ok(2));
        assert!(dir.is_online("bob"));
    }

    #[test]
    fn test_login_wrong_password_returns_bad_credentials() {
        let mut dir = directory_with(&["alice"]);
        let (tx, _rx) = outbound_channel();
        assert_eq!(
            dir.login("alice", "nope", conn(1), tx),
            Err(DirectoryError::BadCredentials)
        );
        assert!(!dir.is_online("alice"));
    }

    #[test]
    fn test_login_unknown_user_returns_no_such_user() {
        let mut dir = Directory::new();
        let (tx, _rx) = outbound_channel();
        assert_eq!(
            dir.login("ghost", "pw", conn(1), tx),
            Err(DirectoryError::NoSuchUser("ghost".into()))
        );
    }

    #[test]
    fn test_login_while_active_is_rejected() {
        let mut dir = directory_with(&["alice"]);
        let _rx = login(&mut dir, "alice", 1);

        let (tx, _rx2) = outbound_channel();
        assert_eq!(
            dir.login("alice", "pw", conn(2), tx),
            Err(DirectoryError::AlreadyLoggedIn("alice".into()))
        );
        assert_eq!(dir.session("alice").unwrap().conn_id, conn(1));
    }

    #[test]
    fn test_login_replaces_stale_session() {
        let mut dir = directory_with(&["alice"]);
        let rx = login(&mut dir, "alice", 1);
        drop(rx);

        let _rx2 = login(&mut dir, "alice", 2);
        assert_eq!(dir.session("alice").unwrap().conn_id, conn(2));
    }

    #[test]
    fn test_clear_session_other_connection_is_noop() {
        let mut dir = directory_with(&["alice"]);
        let _rx = login(&mut dir, "alice", 1);

        assert!(!dir.clear_session("alice", conn(2)));
        assert!(dir.is_online("alice"));
        assert!(dir.clear_session("alice", conn(1)));
        assert!(!dir.is_online("alice"));
    }

    // =====================================================================
    // send / routing
    // =====================================================================

    #[test]
    fn test_send_online_recipient_pushes_and_skips_queue() {
        let mut dir = directory_with(&["alice", "bob"]);
        let mut rx = login(&mut dir, "bob", 1);

        let sent = dir.send("alice", "bob", "hi").unwrap();
        assert_eq!(sent.route, Route::Live);
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 0);

        match rx.try_recv().unwrap() {
            Outbound::Push(m) => {
                assert_eq!((m.sender.as_str(), m.body.as_str()), ("alice", "hi"));
                assert_eq!(m.id, sent.id);
            }
            other => panic!("expected push, got {other:?}"),
        }
    }

    #[test]
    fn test_send_offline_recipient_queues() {
        let mut dir = directory_with(&["alice", "bob"]);
        let sent = dir.send("alice", "bob", "hi").unwrap();
        assert_eq!(sent.route, Route::Queue);
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 1);
        assert_eq!(dir.conversation_len("bob", "alice"), 1);
    }

    #[test]
    fn test_send_closed_writer_falls_back_to_queue() {
        let mut dir = directory_with(&["alice", "bob"]);
        let rx = login(&mut dir, "bob", 1);
        drop(rx);

        let sent = dir.send("alice", "bob", "hi").unwrap();
        assert_eq!(sent.route, Route::Queue);
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 1);
    }

    #[test]
    fn test_send_unknown_recipient_stores_nothing() {
        let mut dir = directory_with(&["alice"]);
        assert_eq!(
            dir.send("alice", "ghost", "hi"),
            Err(DirectoryError::NoSuchUser("ghost".into()))
        );
        assert_eq!(dir.conversation_len("alice", "ghost"), 0);

        // No id was burned by the failed send.
        dir.create_account("bob", "pw").unwrap();
        assert_eq!(dir.send("alice", "bob", "x").unwrap().id, MessageId(1));
    }

    #[test]
    fn test_send_ids_strictly_increase_across_conversations() {
        let mut dir = directory_with(&["alice", "bob", "carol"]);
        let a = dir.send("alice", "bob", "1").unwrap().id;
        let b = dir.send("carol", "bob", "2").unwrap().id;
        let c = dir.send("bob", "alice", "3").unwrap().id;
        assert_eq!((a, b, c), (MessageId(1), MessageId(2), MessageId(3)));
    }

    // =====================================================================
    // pop_undelivered / requeue
    // =====================================================================

    #[test]
    fn test_pop_undelivered_limit_takes_oldest_first() {
        let mut dir = directory_with(&["alice", "bob"]);
        for body in ["1", "2", "3"] {
            dir.send("alice", "bob", body).unwrap();
        }

        let first = dir.pop_undelivered("bob", 2).unwrap();
        assert_eq!(bodies(&first), vec!["1", "2"]);
        let rest = dir.pop_undelivered("bob", 0).unwrap();
        assert_eq!(bodies(&rest), vec!["3"]);
        assert!(dir.pop_undelivered("bob", 0).unwrap().is_empty());
    }

    #[test]
    fn test_pop_undelivered_limit_larger_than_queue_takes_all() {
        let mut dir = directory_with(&["alice", "bob"]);
        dir.send("alice", "bob", "1").unwrap();
        assert_eq!(dir.pop_undelivered("bob", 200).unwrap().len(), 1);
    }

    #[test]
    fn test_requeue_inserts_in_id_order() {
        let mut dir = directory_with(&["alice", "bob"]);
        let mut rx = login(&mut dir, "bob", 1);
        dir.send("alice", "bob", "live").unwrap();
        dir.clear_session("bob", conn(1));
        dir.send("alice", "bob", "queued").unwrap();

        let Ok(Outbound::Push(pushed)) = rx.try_recv() else {
            panic!("expected a push");
        };
        assert!(dir.requeue("bob", pushed));

        let all = dir.pop_undelivered("bob", 0).unwrap();
        assert_eq!(bodies(&all), vec!["live", "queued"]);
    }

    #[test]
    fn test_requeue_deleted_message_is_ignored() {
        let mut dir = directory_with(&["alice", "bob"]);
        let mut rx = login(&mut dir, "bob", 1);
        let sent = dir.send("alice", "bob", "gone").unwrap();
        dir.delete_messages(
            "alice",
            DeleteScope::Conversation {
                other: "bob",
                ids: &[sent.id],
            },
        )
        .unwrap();

        let Ok(Outbound::Push(pushed)) = rx.try_recv() else {
            panic!("expected a push");
        };
        assert!(!dir.requeue("bob", pushed));
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 0);
    }

    // =====================================================================
    // delete_messages
    // =====================================================================

    #[test]
    fn test_delete_messages_by_id_twice_second_is_no_match() {
        let mut dir = directory_with(&["alice", "bob"]);
        let id = dir.send("alice", "bob", "x").unwrap().id;
        dir.send("alice", "bob", "y").unwrap();
        let scope = DeleteScope::Conversation {
            other: "alice",
            ids: &[id],
        };

        assert_eq!(dir.delete_messages("bob", scope), Ok(1));
        assert_eq!(dir.conversation_len("alice", "bob"), 1);
        assert_eq!(dir.delete_messages("bob", scope), Err(DirectoryError::NoMatch));
        assert_eq!(dir.conversation_len("alice", "bob"), 1);
    }

    #[test]
    fn test_delete_messages_by_id_also_clears_queue() {
        let mut dir = directory_with(&["alice", "bob"]);
        let id = dir.send("alice", "bob", "oops").unwrap().id;

        dir.delete_messages(
            "alice",
            DeleteScope::Conversation {
                other: "bob",
                ids: &[id, MessageId(99)],
            },
        )
        .unwrap();
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 0);
    }

    #[test]
    fn test_delete_messages_by_index_also_clears_conversation() {
        let mut dir = directory_with(&["alice", "bob"]);
        for body in ["0", "1", "2"] {
            dir.send("alice", "bob", body).unwrap();
        }

        assert_eq!(dir.delete_messages("bob", DeleteScope::Queued(&[0, 2, 2, 9])), Ok(2));
        let left: Vec<&str> = dir
            .find_account("bob")
            .unwrap()
            .undelivered()
            .map(|m| m.body.as_str())
            .collect();
        assert_eq!(left, vec!["1"]);
        assert_eq!(dir.conversation_len("alice", "bob"), 1);
    }

    #[test]
    fn test_delete_messages_out_of_range_index_is_no_match() {
        let mut dir = directory_with(&["bob"]);
        assert_eq!(
            dir.delete_messages("bob", DeleteScope::Queued(&[0])),
            Err(DirectoryError::NoMatch)
        );
    }

    #[test]
    fn test_delete_messages_cannot_reach_other_conversations() {
        let mut dir = directory_with(&["alice", "bob", "carol"]);
        let id = dir.send("alice", "bob", "private").unwrap().id;

        assert_eq!(
            dir.delete_messages(
                "carol",
                DeleteScope::Conversation {
                    other: "bob",
                    ids: &[id],
                },
            ),
            Err(DirectoryError::NoMatch)
        );
        assert_eq!(dir.conversation_len("alice", "bob"), 1);
    }

    // =====================================================================
    // view_conversation / mark_read
    // =====================================================================

    #[test]
    fn test_view_conversation_is_read_only() {
        let mut dir = directory_with(&["alice", "bob"]);
        dir.send("alice", "bob", "hi").unwrap();
        dir.send("bob", "alice", "hey").unwrap();

        let history = dir.view_conversation("bob", "alice").unwrap();
        assert_eq!(bodies(&history), vec!["hi", "hey"]);
        assert_eq!(dir.find_account("bob").unwrap().undelivered_count(), 1);
    }

    #[test]
    fn test_view_conversation_unknown_other_returns_no_such_user() {
        let dir = directory_with(&["alice"]);
        assert_eq!(
            dir.view_conversation("alice", "ghost"),
            Err(DirectoryError::NoSuchUser("ghost".into()))
        );
    }

    #[test]
    fn test_view_conversation_none_yet_is_empty() {
        let dir = directory_with(&["alice", "bob"]);
        assert!(dir.view_conversation("alice", "bob").unwrap().is_empty());
    }

    #[test]
    fn test_mark_read_drops_only_that_senders_messages() {
        let mut dir = directory_with(&["alice", "bob", "carol"]);
        dir.send("alice", "bob", "a1").unwrap();
        dir.send("carol", "bob", "c1").unwrap();
        dir.send("alice", "bob", "a2").unwrap();

        assert_eq!(dir.mark_read("bob", "alice"), Ok(2));
        let left = dir.pop_undelivered("bob", 0).unwrap();
        assert_eq!(bodies(&left), vec!["c1"]);
        assert_eq!(dir.conversation_len("alice", "bob"), 2);
    }
}
