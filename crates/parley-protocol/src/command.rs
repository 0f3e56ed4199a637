//! Command ids: the first byte of every frame.

use std::fmt;

use crate::ProtocolError;

/// Command id carried by frames that report an unknown command.
pub const ERROR_COMMAND_ID: u8 = 0;

/// Every command id in the protocol. The numeric values are a stable
/// contract with existing clients and must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Login = 1,
    CreateAccount = 2,
    SendMessage = 3,
    ReadMessages = 4,
    DeleteMessages = 5,
    ViewConversation = 6,
    DeleteAccount = 7,
    Logoff = 8,
    Close = 9,
    /// Server → client only: a message delivered live.
    ChatPush = 10,
    ListAccounts = 11,
    /// Terminates a read batch (server → client); acknowledges one
    /// (client → server).
    ReadAck = 12,
}

impl Command {
    /// All commands, in id order.
    pub const ALL: [Command; 12] = [
        Self::Login,
        Self::CreateAccount,
        Self::SendMessage,
        Self::ReadMessages,
        Self::DeleteMessages,
        Self::ViewConversation,
        Self::DeleteAccount,
        Self::Logoff,
        Self::Close,
        Self::ChatPush,
        Self::ListAccounts,
        Self::ReadAck,
    ];

    /// Returns `true` for commands a client may send before logging in.
    pub fn allowed_unauthenticated(self) -> bool {
        matches!(self, Self::Login | Self::CreateAccount | Self::Close)
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|cmd| *cmd as u8 == id)
            .ok_or(ProtocolError::UnknownCommand(id))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "Login",
            Self::CreateAccount => "CreateAccount",
            Self::SendMessage => "SendMessage",
            Self::ReadMessages => "ReadMessages",
            Self::DeleteMessages => "DeleteMessages",
            Self::ViewConversation => "ViewConversation",
            Self::DeleteAccount => "DeleteAccount",
            Self::Logoff => "Logoff",
            Self::Close => "Close",
            Self::ChatPush => "ChatPush",
            Self::ListAccounts => "ListAccounts",
            Self::ReadAck => "ReadAck",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_ids_match_wire_contract() {
        let expected: [(Command, u8); 12] = [
            (Command::Login, 1),
            (Command::CreateAccount, 2),
            (Command::SendMessage, 3),
            (Command::ReadMessages, 4),
            (Command::DeleteMessages, 5),
            (Command::ViewConversation, 6),
            (Command::DeleteAccount, 7),
            (Command::Logoff, 8),
            (Command::Close, 9),
            (Command::ChatPush, 10),
            (Command::ListAccounts, 11),
            (Command::ReadAck, 12),
        ];
        for (cmd, id) in expected {
            assert_eq!(u8::from(cmd), id);
            assert_eq!(Command::try_from(id).unwrap(), cmd);
        }
    }

    #[test]
    fn test_try_from_unknown_id_returns_error() {
        for id in [0u8, 13, 99, 255] {
            assert!(matches!(
                Command::try_from(id),
                Err(ProtocolError::UnknownCommand(got)) if got == id
            ));
        }
    }

    #[test]
    fn test_allowed_unauthenticated_only_auth_and_close() {
        let allowed: Vec<Command> = Command::ALL
            .into_iter()
            .filter(|c| c.allowed_unauthenticated())
            .collect();
        assert_eq!(
            allowed,
            vec![Command::Login, Command::CreateAccount, Command::Close]
        );
    }
}
