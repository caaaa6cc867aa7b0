//! Per-connection protocol driver.
//!
//! ```text
//! AwaitingName ──(non-blank name)──▶ Active ──(QUIT / EOF / error)──▶ Terminated
//!      │                                                                 ▲
//!      └──────────────(blank name / EOF / error)─────────────────────────┘
//! ```
//!
//! Every exit path funnels into a single `terminate` call. Membership is
//! held in an `Option` that cleanup takes, so the leave announcement is
//! sent at most once per session.

use tracing::{debug, info, warn};

use parley_protocol::{ClientLine, ParticipantName, ServerLine, SUBMIT_NAME};

use crate::registry::{ParticipantId, RegistryError, RegistryHandle, Sink};

use super::broadcast::broadcast;
use super::connection::{Connection, ConnectionError};

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Prompted for a name, waiting for the reply
    AwaitingName,

    /// Registered and relaying messages
    Active,

    /// Cleaned up; the connection is closed
    Terminated,
}

/// Drives one participant's connection from handshake to cleanup.
pub struct SessionHandler {
    id: ParticipantId,
    connection: Connection,
    registry: RegistryHandle,
    state: SessionState,

    /// Set once the handshake succeeds; taken by cleanup
    membership: Option<ParticipantName>,
}

impl SessionHandler {
    pub fn new(id: ParticipantId, connection: Connection, registry: RegistryHandle) -> Self {
        Self {
            id,
            connection,
            registry,
            state: SessionState::AwaitingName,
            membership: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Runs the session to completion.
    ///
    /// Errors are logged here and never propagate past the session.
    pub async fn run(mut self) -> SessionState {
        debug!(id = %self.id, "Session started");

        if let Err(e) = self.drive().await {
            match &self.membership {
                Some(name) => warn!(id = %self.id, participant = %name, error = %e, "Session error"),
                None => warn!(id = %self.id, error = %e, "Session error before handshake"),
            }
        }

        self.terminate().await;
        self.state
    }

    async fn drive(&mut self) -> Result<(), SessionError> {
        let Some(name) = self.handshake().await? else {
            return Ok(());
        };
        self.relay(&name).await
    }

    /// Prompts for a name and registers the participant.
    ///
    /// Returns `None` when the client disconnects or submits a blank name;
    /// nothing is registered or announced in that case.
    async fn handshake(&mut self) -> Result<Option<ParticipantName>, SessionError> {
        self.connection.write_line(SUBMIT_NAME).await?;

        let Some(line) = self.connection.read_line().await? else {
            debug!(id = %self.id, "Client disconnected without submitting a name");
            return Ok(None);
        };

        let name = match ParticipantName::new(line) {
            Ok(name) => name,
            Err(e) => {
                debug!(id = %self.id, error = %e, "Rejected handshake name");
                return Ok(None);
            }
        };

        let sink = Sink::new(self.id, name.clone(), self.connection.sink_sender());
        self.registry.add(sink).await?;
        self.membership = Some(name.clone());
        self.state = SessionState::Active;

        info!(id = %self.id, participant = %name, "Participant joined");
        broadcast(&self.registry, &ServerLine::joined(name.as_str()).to_string()).await;

        Ok(Some(name))
    }

    /// Relays chat lines until QUIT, end of stream, or an error.
    async fn relay(&mut self, name: &ParticipantName) -> Result<(), SessionError> {
        loop {
            let Some(line) = self.connection.read_line().await? else {
                debug!(id = %self.id, participant = %name, "Client closed the stream");
                return Ok(());
            };

            match ClientLine::parse(&line) {
                ClientLine::Quit => {
                    debug!(id = %self.id, participant = %name, "Client sent QUIT");
                    return Ok(());
                }
                ClientLine::Text(text) => {
                    debug!(id = %self.id, participant = %name, "Relaying message");
                    broadcast(&self.registry, &ServerLine::chat(name.as_str(), text).to_string())
                        .await;
                }
            }
        }
    }

    /// Deregisters, announces the departure and closes the connection.
    ///
    /// Safe to call more than once; only the first call has any effect.
    async fn terminate(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }
        self.state = SessionState::Terminated;

        if let Some(name) = self.membership.take() {
            match self.registry.remove(self.id).await {
                Ok(true) => {}
                Ok(false) => warn!(id = %self.id, participant = %name, "Participant was not registered"),
                Err(e) => warn!(id = %self.id, participant = %name, error = %e, "Failed to deregister"),
            }

            info!(id = %self.id, participant = %name, "Participant left");
            broadcast(&self.registry, &ServerLine::left(name.as_str()).to_string()).await;
        }

        self.connection.close().await;
    }
}

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
    use tokio::sync::mpsc;

    use crate::registry::spawn_registry;
    use crate::server::connection::ConnectionSettings;

    fn handler(registry: &RegistryHandle, id: u64) -> (SessionHandler, DuplexStream) {
        let (server, peer) = duplex(64 * 1024);
        let (reader, writer) = split(server);
        let settings = ConnectionSettings {
            max_line_length: 1024,
            write_timeout: Duration::from_secs(1),
            outbound_buffer: 16,
        };
        let connection = Connection::new(reader, writer, settings, id);
        (
            SessionHandler::new(ParticipantId::new(id), connection, registry.clone()),
            peer,
        )
    }

    /// A bare sink standing in for another participant.
    async fn observer(registry: &RegistryHandle, id: u64) -> mpsc::Receiver<Arc<str>> {
        let (tx, rx) = mpsc::channel(16);
        let name = ParticipantName::new("observer").unwrap();
        registry
            .add(Sink::new(ParticipantId::new(id), name, tx))
            .await
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line.to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_full_session_lifecycle() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, mut peer) = handler(&registry, 1);

        peer.write_all(b"alice\nhello\nQUIT\n").await.unwrap();
        let state = session.run().await;
        assert_eq!(state, SessionState::Terminated);

        assert_eq!(
            drain(&mut obs),
            vec![
                "SERVER: alice has joined the chat.".to_string(),
                "alice: hello".to_string(),
                "SERVER: alice has left the chat.".to_string(),
            ]
        );
        assert_eq!(registry.len().await, 1);

        // The participant sees the prompt, its own join and its own message.
        let mut reader = BufReader::new(peer);
        let mut seen = Vec::new();
        let mut line = String::new();
        while reader.read_line(&mut line).await.unwrap() > 0 {
            seen.push(line.trim_end().to_string());
            line.clear();
        }
        assert_eq!(
            seen,
            vec!["SUBMITNAME", "SERVER: alice has joined the chat.", "alice: hello"]
        );
    }

    #[tokio::test]
    async fn test_blank_name_never_registers() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, mut peer) = handler(&registry, 1);

        peer.write_all(b"   \n").await.unwrap();
        session.run().await;

        assert!(drain(&mut obs).is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_eof_before_name_is_silent() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, peer) = handler(&registry, 1);

        drop(peer);
        session.run().await;

        assert!(drain(&mut obs).is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_eof_after_join_announces_leave() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, mut peer) = handler(&registry, 1);

        peer.write_all(b"bob\n").await.unwrap();
        peer.shutdown().await.unwrap();
        session.run().await;

        assert_eq!(
            drain(&mut obs),
            vec![
                "SERVER: bob has joined the chat.".to_string(),
                "SERVER: bob has left the chat.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_lowercase_quit_is_chat() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, mut peer) = handler(&registry, 1);

        peer.write_all(b"carol\nquit\nQUIT\n").await.unwrap();
        session.run().await;

        let lines = drain(&mut obs);
        assert!(lines.contains(&"carol: quit".to_string()));
        assert!(!lines.iter().any(|l| l.ends_with("QUIT")));
    }

    #[tokio::test]
    async fn test_terminate_twice_announces_once() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (mut session, mut peer) = handler(&registry, 1);

        peer.write_all(b"dave\n").await.unwrap();
        let name = session.handshake().await.unwrap();
        assert_eq!(name.map(|n| n.to_string()), Some("dave".to_string()));
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(registry.len().await, 2);

        session.terminate().await;
        session.terminate().await;

        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            drain(&mut obs),
            vec![
                "SERVER: dave has joined the chat.".to_string(),
                "SERVER: dave has left the chat.".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_future_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let registry = spawn_registry();
        let (session, peer) = handler(&registry, 1);
        drop(peer);

        let run = session.run();
        assert_send(&run);
        assert_eq!(run.await, SessionState::Terminated);
    }

    #[tokio::test]
    async fn test_oversized_line_ends_session_with_leave() {
        let registry = spawn_registry();
        let mut obs = observer(&registry, 100).await;
        let (session, mut peer) = handler(&registry, 1);

        peer.write_all(b"erin\n").await.unwrap();
        peer.write_all(&vec![b'x'; 2048]).await.unwrap();
        session.run().await;

        let lines = drain(&mut obs);
        assert_eq!(lines.last().map(String::as_str), Some("SERVER: erin has left the chat."));
        assert_eq!(registry.len().await, 1);
    }
}
