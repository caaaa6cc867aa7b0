//! Fan-out of one line to every registered participant.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::registry::{DeliveryError, RegistryHandle};

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sinks the line was queued for
    pub delivered: usize,

    /// Sinks that were full or already closed
    pub failed: usize,
}

/// Delivers `message` to every sink registered at the moment of the call.
///
/// Delivery is best-effort and per sink: a full or closed sink is logged
/// and skipped, and never removed here. Its own session notices the dead
/// connection and deregisters.
pub async fn broadcast(registry: &RegistryHandle, message: &str) -> BroadcastReport {
    let sinks = registry.snapshot().await;
    let line: Arc<str> = Arc::from(message);
    let mut report = BroadcastReport::default();

    for sink in &sinks {
        match sink.deliver(&line) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                report.failed += 1;
                match e {
                    DeliveryError::Full => warn!(
                        id = %sink.id(),
                        participant = %sink.name(),
                        "Outbound queue full, dropping line"
                    ),
                    DeliveryError::Closed => debug!(
                        id = %sink.id(),
                        participant = %sink.name(),
                        "Sink already closed, skipping"
                    ),
                }
            }
        }
    }

    debug!(
        recipients = sinks.len(),
        delivered = report.delivered,
        failed = report.failed,
        "Broadcast"
    );
    report
}
