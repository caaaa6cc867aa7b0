//! parley protocol - line framing shared by the server and client
//!
//! Every message on the wire is one newline-terminated UTF-8 line. The
//! server opens each connection with the `SUBMITNAME` sentinel; the first
//! line the client sends back is its display name, and every later line is
//! either the `QUIT` command or chat text.

pub mod message;
pub mod name;
pub mod parse;

pub use message::{ClientLine, ServerLine, QUIT, SERVER_NAME, SUBMIT_NAME};
pub use name::{NameError, ParticipantName};
pub use parse::{strip_line_ending, MAX_LINE_LENGTH};

/// Default TCP port the server listens on and the client dials.
pub const DEFAULT_PORT: u16 = 12345;
