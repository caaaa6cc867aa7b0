//! Registry actor commands and errors.
//!
//! Every command carries a oneshot channel for its reply, so callers can
//! await the result without blocking the actor.

use thiserror::Error;
use tokio::sync::oneshot;

use super::sink::{ParticipantId, Sink};

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Add a participant's sink.
    ///
    /// A sink with the same id replaces the previous entry.
    Add {
        /// Sink for the newly registered participant
        sink: Sink,
        /// Acknowledged once the sink is visible to snapshots
        respond_to: oneshot::Sender<()>,
    },

    /// Remove a participant's sink. Removing an absent id is a no-op.
    Remove {
        /// Id of the participant to remove
        id: ParticipantId,
        /// `true` if an entry was removed
        respond_to: oneshot::Sender<bool>,
    },

    /// Copy out every registered sink.
    Snapshot {
        /// Channel to send the copied sinks
        respond_to: oneshot::Sender<Vec<Sink>>,
    },

    /// Count registered participants.
    Len {
        /// Channel to send the count
        respond_to: oneshot::Sender<usize>,
    },

    /// List registered display names.
    Names {
        /// Channel to send the names
        respond_to: oneshot::Sender<Vec<String>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The registry actor has shut down.
    #[error("Registry channel closed")]
    ChannelClosed,
}
