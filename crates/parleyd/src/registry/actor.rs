//! Registry actor - owns the set of active sinks and processes commands.
//!
//! Commands are handled one at a time in a single task, so every add,
//! remove and snapshot observes a consistent map.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::commands::RegistryCommand;
use super::sink::{ParticipantId, Sink};

/// The registry actor.
///
/// Receives commands over an mpsc channel and owns the only copy of the
/// participant map. Nothing outside this type can iterate or mutate it.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Active sinks keyed by participant id
    sinks: HashMap<ParticipantId, Sink>,
}

impl RegistryActor {
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            receiver,
            sinks: HashMap::new(),
        }
    }

    /// Runs the actor loop until all handles are dropped.
    pub async fn run(mut self) {
        debug!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(participants = self.sinks.len(), "Registry actor stopped");
    }

    fn handle_command(&mut self, cmd: RegistryCommand) {
        // Reply send errors are ignored: the caller may have given up waiting.
        match cmd {
            RegistryCommand::Add { sink, respond_to } => {
                self.handle_add(sink);
                let _ = respond_to.send(());
            }
            RegistryCommand::Remove { id, respond_to } => {
                let removed = self.handle_remove(id);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::Snapshot { respond_to } => {
                let _ = respond_to.send(self.sinks.values().cloned().collect());
            }
            RegistryCommand::Len { respond_to } => {
                let _ = respond_to.send(self.sinks.len());
            }
            RegistryCommand::Names { respond_to } => {
                let names = self
                    .sinks
                    .values()
                    .map(|sink| sink.name().as_str().to_string())
                    .collect();
                let _ = respond_to.send(names);
            }
        }
    }

    fn handle_add(&mut self, sink: Sink) {
        let id = sink.id();
        let name = sink.name().as_str().to_string();

        if self.sinks.insert(id, sink).is_some() {
            warn!(%id, participant = %name, "Replaced existing registry entry");
        }

        debug!(%id, participant = %name, total = self.sinks.len(), "Participant registered");
    }

    fn handle_remove(&mut self, id: ParticipantId) -> bool {
        match self.sinks.remove(&id) {
            Some(sink) => {
                debug!(
                    %id,
                    participant = %sink.name(),
                    total = self.sinks.len(),
                    "Participant removed"
                );
                true
            }
            None => false,
        }
    }
}
