//! Line types exchanged between clients and the server.

use std::fmt;

/// Sentinel the server sends once, right after accepting a connection.
pub const SUBMIT_NAME: &str = "SUBMITNAME";

/// Command a client sends to end its session. Matched exactly.
pub const QUIT: &str = "QUIT";

/// Sender name used for system announcements.
pub const SERVER_NAME: &str = "SERVER";

const JOINED_SUFFIX: &str = " has joined the chat.";
const LEFT_SUFFIX: &str = " has left the chat.";

/// A line received from a client after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientLine<'a> {
    /// The client asked to leave
    Quit,

    /// Anything else, broadcast as-is
    Text(&'a str),
}

impl<'a> ClientLine<'a> {
    /// Classifies a client line (already stripped of its line ending).
    ///
    /// Only the exact, case-sensitive `QUIT` is a command; `quit` or
    /// ` QUIT` are chat text.
    pub fn parse(line: &'a str) -> Self {
        if line == QUIT {
            Self::Quit
        } else {
            Self::Text(line)
        }
    }
}

/// A line sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Handshake prompt asking the client for its display name
    SubmitName,

    /// `SERVER: <name> has joined the chat.`
    Joined { name: String },

    /// `SERVER: <name> has left the chat.`
    Left { name: String },

    /// `<name>: <text>`
    Chat { name: String, text: String },

    /// A line the parser could not classify
    Other(String),
}

impl ServerLine {
    /// Creates a join announcement.
    pub fn joined(name: impl Into<String>) -> Self {
        Self::Joined { name: name.into() }
    }

    /// Creates a leave announcement.
    pub fn left(name: impl Into<String>) -> Self {
        Self::Left { name: name.into() }
    }

    /// Creates a chat line attributed to `name`.
    pub fn chat(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Chat {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Parses a line received from the server.
    ///
    /// The sentinel is recognised by prefix, the way terminal clients have
    /// always detected it. Announcements are recognised by their `SERVER: `
    /// prefix and fixed suffix; everything else containing `": "` is a chat
    /// line split on the first separator.
    pub fn parse(line: &str) -> Self {
        if line.starts_with(SUBMIT_NAME) {
            return Self::SubmitName;
        }

        if let Some(rest) = line.strip_prefix(SERVER_NAME).and_then(|r| r.strip_prefix(": ")) {
            if let Some(name) = rest.strip_suffix(JOINED_SUFFIX) {
                return Self::joined(name);
            }
            if let Some(name) = rest.strip_suffix(LEFT_SUFFIX) {
                return Self::left(name);
            }
        }

        match line.split_once(": ") {
            Some((name, text)) => Self::chat(name, text),
            None => Self::Other(line.to_string()),
        }
    }

    /// Returns true for join/leave announcements.
    pub fn is_announcement(&self) -> bool {
        matches!(self, Self::Joined { .. } | Self::Left { .. })
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubmitName => f.write_str(SUBMIT_NAME),
            Self::Joined { name } => write!(f, "{SERVER_NAME}: {name}{JOINED_SUFFIX}"),
            Self::Left { name } => write!(f, "{SERVER_NAME}: {name}{LEFT_SUFFIX}"),
            Self::Chat { name, text } => write!(f, "{name}: {text}"),
            Self::Other(line) => f.write_str(line),
        }
    }
}
