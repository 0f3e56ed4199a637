//! Messages and conversation keys.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use parley_protocol::{ChatMessage, LONG_STR_MAX};

/// Process-wide message id. Allocated from 1 upward and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored chat message. Immutable once created; deletion removes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// The wire payload used for pushes and read-batch items.
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage {
            sender: self.sender.clone(),
            body: self.body.clone(),
        }
    }

    /// One line of a rendered conversation, newline included.
    pub fn history_line(&self) -> String {
        format!(
            "[ID {}] [{}] {}: {}\n",
            self.id,
            self.sent_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.sender,
            self.body
        )
    }
}

/// Identifies the conversation between two accounts.
///
/// The pair is stored sorted, so `(a, b)` and `(b, a)` are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationKey(String, String);

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            Self(a.to_owned(), b.to_owned())
        } else {
            Self(b.to_owned(), a.to_owned())
        }
    }

    /// Returns `true` if `user` is one of the two participants.
    pub fn involves(&self, user: &str) -> bool {
        self.0 == user || self.1 == user
    }
}

/// Renders a conversation as the text sent for ViewConversation.
///
/// Returns `None` for an empty conversation. If the full history does
/// not fit in a LongStr, the oldest lines are dropped until it does.
pub fn render_conversation(messages: &[Message]) -> Option<String> {
    if messages.is_empty() {
        return None;
    }

    let mut lines: Vec<String> = Vec::new();
    let mut total = 0;
    for line in messages.iter().rev().map(Message::history_line) {
        if total + line.len() > LONG_STR_MAX {
            break;
        }
        total += line.len();
        lines.push(line);
    }
    if lines.is_empty() {
        // The newest message alone is over the limit: cut it at a char
        // boundary rather than returning nothing.
        let mut line = messages[messages.len() - 1].history_line();
        let mut cut = LONG_STR_MAX;
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        line.truncate(cut);
        lines.push(line);
    }
    lines.reverse();
    Some(lines.concat())
}
