//! Status lines sent back to clients.
//!
//! These strings are part of the wire contract: existing clients match
//! on them, so they must not be reworded.

use parley_directory::DirectoryError;
use parley_protocol::{Command, SHORT_STR_MAX};

pub const ACCOUNT_CREATED: &str = "Account created";
pub const MESSAGE_SENT: &str = "Message sent";
pub const MESSAGES_DELETED: &str = "Specified messages deleted";
pub const ACCOUNT_DELETED: &str = "Account deleted";
pub const LOGGED_OFF: &str = "User logged off";
pub const GOODBYE: &str = "Goodbye";

pub const USERNAME_DOES_NOT_EXIST: &str = "Username does not exist";
pub const RECIPIENT_NOT_FOUND: &str = "Recipient not found";
pub const USER_NOT_FOUND: &str = "User not found";
pub const USERNAME_ALREADY_EXISTS: &str = "Username already exists";
pub const INCORRECT_PASSWORD: &str = "Incorrect password";
pub const ALREADY_LOGGED_IN: &str = "Already logged in";
pub const NO_MATCHING_MESSAGES: &str = "No matching messages to delete";
pub const INVALID_USERNAME: &str = "Invalid username";
pub const NOT_LOGGED_IN: &str = "Not logged in";
pub const MESSAGE_TOO_LONG: &str = "Message too long";
pub const UNKNOWN_COMMAND: &str = "Unknown command";
pub const NO_CONVERSATION: &str = "No conversation history found";

/// Prefix of a successful login reply; the unread count follows.
pub const LOGIN_OK_PREFIX: &str = "Login successful. Unread messages: ";

pub fn login_ok(unread: usize) -> String {
    format!("{LOGIN_OK_PREFIX}{unread}")
}

/// Reply when a request names a user other than the one logged in.
pub fn not_logged_in_as(user: &str) -> String {
    fit(format!("{NOT_LOGGED_IN} as {user}"))
}

/// The status line for a refused directory operation.
///
/// `NoSuchUser` reads differently depending on which side was missing,
/// so the command decides the wording.
pub fn for_directory_error(command: Command, err: &DirectoryError) -> String {
    match err {
        DirectoryError::NoSuchUser(_) => match command {
            Command::SendMessage => RECIPIENT_NOT_FOUND,
            Command::ViewConversation => USER_NOT_FOUND,
            _ => USERNAME_DOES_NOT_EXIST,
        }
        .to_string(),
        DirectoryError::AlreadyExists(_) => USERNAME_ALREADY_EXISTS.to_string(),
        DirectoryError::BadCredentials => INCORRECT_PASSWORD.to_string(),
        DirectoryError::AlreadyLoggedIn(_) => ALREADY_LOGGED_IN.to_string(),
        DirectoryError::NoMatch => NO_MATCHING_MESSAGES.to_string(),
        DirectoryError::PendingMessages { count, .. } => {
            format!("Account has {count} undelivered messages")
        }
        DirectoryError::InvalidUsername(_) => INVALID_USERNAME.to_string(),
    }
}

/// Cuts `text` to fit a ShortStr, on a char boundary.
pub fn fit(mut text: String) -> String {
    if text.len() > SHORT_STR_MAX {
        let mut cut = SHORT_STR_MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}
