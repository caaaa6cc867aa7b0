//! Terminal client library for parley.
//!
//! Connects to the chat server, answers the name prompt from stdin, then
//! forwards stdin lines to the server while printing every line it receives.

pub mod client;
pub mod error;

pub use client::{ChatClient, ClientConfig, DISCONNECTED, NAME_PROMPT};
pub use error::{ClientError, Result};
