//! TCP server for the parley daemon.
//!
//! The server:
//! - Binds a TCP listener on the configured address
//! - Spawns a SessionHandler task for each accepted connection
//! - Caps concurrent sessions with a semaphore; extra clients wait at accept
//! - Stops accepting on cancellation and drains in-flight sessions
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ acquire permit, accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ SessionHandler  │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └───────┬─────────┘     └─────────────────┘
//!         │ broadcast(snapshot)
//!         ▼
//! ┌─────────────────┐
//! │  writer tasks   │
//! │ (one per sink)  │
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept and session errors are logged and allow continued operation

mod broadcast;
mod connection;
mod session;

pub use broadcast::{broadcast, BroadcastReport};
pub use connection::{Connection, ConnectionError, ConnectionSettings};
pub use session::{SessionError, SessionHandler, SessionState};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::registry::{spawn_registry, ParticipantId, RegistryHandle};

/// TCP chat server.
///
/// Owns the listener, the participant registry and every session task.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address the listener actually bound (resolves port 0)
    local_addr: SocketAddr,

    config: ServerConfig,

    /// Handle to the participant registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Session capacity; one permit per live session
    permits: Arc<Semaphore>,

    /// Tracks session tasks so shutdown can wait for them
    sessions: TaskTracker,

    /// Connection counter for generating participant ids
    connection_counter: AtomicU64,
}

impl ChatServer {
    /// Validates `config`, binds the listener and starts a fresh registry.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn bind(
        config: ServerConfig,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let addr = config.bind_addr();

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.clone(),
                error: e.to_string(),
            })?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::LocalAddr(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            permits: Arc::new(Semaphore::new(config.max_participants)),
            config,
            registry: spawn_registry(),
            cancel_token,
            sessions: TaskTracker::new(),
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns a handle to the participant registry.
    pub fn registry(&self) -> RegistryHandle {
        self.registry.clone()
    }

    /// Runs the accept loop until the cancellation token is triggered,
    /// then waits up to the shutdown grace period for sessions to finish.
    pub async fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr,
            max_participants = self.config.max_participants,
            "Chat server listening"
        );

        loop {
            let Some(permit) = self.acquire_slot().await else {
                break;
            };

            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let number = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, number, permit);
                        }
                        Err(e) => {
                            // Permit is released; keep accepting
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    /// Waits for a free session slot, or returns `None` on shutdown.
    async fn acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        if self.permits.available_permits() == 0 {
            info!(
                max_participants = self.config.max_participants,
                "At capacity, new connections wait for a free slot"
            );
        }

        tokio::select! {
            _ = self.cancel_token.cancelled() => {
                info!("Server shutdown requested");
                None
            }

            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        }
    }

    /// Spawns a session task for an accepted connection.
    fn handle_connection(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        number: u64,
        permit: OwnedSemaphorePermit,
    ) {
        info!(connection = number, peer = %peer, "New client connected");

        let (reader, writer) = stream.into_split();
        let connection =
            Connection::new(reader, writer, ConnectionSettings::from(&self.config), number);
        let handler =
            SessionHandler::new(ParticipantId::new(number), connection, self.registry.clone());

        self.sessions.spawn(async move {
            handler.run().await;
            drop(permit);
            debug!(connection = number, "Session slot released");
        });
    }

    /// Stops tracking new sessions and waits for in-flight ones.
    async fn drain(&self) {
        self.sessions.close();

        let in_flight = self.sessions.len();
        if in_flight > 0 {
            info!(sessions = in_flight, "Waiting for sessions to finish");
        }

        let grace = self.config.shutdown_grace();
        if timeout(grace, self.sessions.wait()).await.is_err() {
            warn!(
                sessions = self.sessions.len(),
                grace_secs = grace.as_secs(),
                "Sessions still running after grace period"
            );
        }

        info!("Server stopped");
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Failed to read local address: {0}")]
    LocalAddr(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
