//! Outbound message sinks.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use parley_protocol::ParticipantName;

/// Identifier the listener assigns to each accepted connection.
///
/// Names are not unique, so the registry keys entries by this instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(u64);

impl ParticipantId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant-{}", self.0)
    }
}

/// Write-side handle for one participant's connection.
///
/// Cloning is cheap: every clone feeds the same bounded outbound queue,
/// which the connection's writer task drains onto the socket.
#[derive(Clone)]
pub struct Sink {
    id: ParticipantId,
    name: ParticipantName,
    outbox: mpsc::Sender<Arc<str>>,
}

impl Sink {
    pub fn new(id: ParticipantId, name: ParticipantName, outbox: mpsc::Sender<Arc<str>>) -> Self {
        Self { id, name, outbox }
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn name(&self) -> &ParticipantName {
        &self.name
    }

    /// Queues one line for delivery without waiting.
    pub fn deliver(&self, line: &Arc<str>) -> Result<(), DeliveryError> {
        // Slow readers lose lines: a full queue rejects this one instead of
        // making the broadcaster wait.
        self.outbox
            .try_send(Arc::clone(line))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    /// Returns true once the connection's writer has stopped.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_closed()
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sink")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .finish()
    }
}

/// Why a line could not be queued for a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("Outbound queue is full")]
    Full,

    #[error("Connection writer has stopped")]
    Closed,
}
