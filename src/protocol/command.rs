use crate::error::{ProtocolError, Result};
use std::fmt;

/// Command codes carried in the frame header.
///
/// Only [`Command::Announcement`] is acted on by this node; the others are
/// reserved protocol surface and must keep their wire values.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Peer introduction carrying features, port and chain state
    Announcement = 0,
    Response = 1,
    /// Keep-alive message (no payload)
    Ping = 2,
    /// Response to ping (no payload)
    Pong = 3,
    /// Request blocks from a peer
    GetBlock = 4,
}

impl Command {
    pub const ALL: [Command; 5] = [
        Command::Announcement,
        Command::Response,
        Command::Ping,
        Command::Pong,
        Command::GetBlock,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Announcement => "ANNOUNCEMENT",
            Command::Response => "RESPONSE",
            Command::Ping => "PING",
            Command::Pong => "PONG",
            Command::GetBlock => "GET_BLOCK",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Command::Announcement),
            1 => Ok(Command::Response),
            2 => Ok(Command::Ping),
            3 => Ok(Command::Pong),
            4 => Ok(Command::GetBlock),
            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

impl From<Command> for u8 {
    fn from(command: Command) -> Self {
        command as u8
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
