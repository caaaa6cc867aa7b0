//! Participant registry using the actor pattern.
//!
//! The registry is the only shared mutable state in the server. A single
//! actor task owns the map of active sinks; session handlers talk to it
//! through a cloneable [`RegistryHandle`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   RegistryCommand   ┌─────────────────┐
//! │ SessionHandler  │────────────────────▶│  RegistryActor  │
//! │  (per client)   │   (mpsc channel)    │                 │
//! └─────────────────┘                     │ HashMap<        │
//!         ▲                               │  ParticipantId, │
//!         │  Vec<Sink> snapshot           │  Sink>          │
//!         └───────────────────────────────┤                 │
//!             (oneshot reply)             └─────────────────┘
//! ```
//!
//! The actor never touches a socket. Broadcast asks for a snapshot and
//! delivers outside the actor, so one slow connection cannot hold up
//! membership changes.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod sink;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use sink::{DeliveryError, ParticipantId, Sink};

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor runs until every handle has been dropped.
///
/// # Example
///
/// ```no_run
/// use parleyd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry();
///     let active = handle.len().await;
/// }
/// ```
pub fn spawn_registry() -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
