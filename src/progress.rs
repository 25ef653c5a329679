//! Advisory progress reporting for the build pipeline.
//!
//! Producers hand events to a [`ProgressSink`]; the bounded channel sink
//! applies backpressure (senders block when the consumer lags), and the
//! default [`NullSink`] drops everything with no behavior change.

use crossbeam_channel::{bounded, Receiver, Sender};
use log::info;

/// One advisory event from the build pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A worker finished mapping one document.
    DocumentMapped { path: String },
    /// A worker finished its whole split.
    MapStageDone { worker: usize },
    /// A reducer merged another batch of entries.
    EntriesReduced { count: u64 },
    /// One partition's reduction finished.
    PartitionReduced { partition: usize },
    /// The whole build finished.
    BuildDone,
}

/// Where build-pipeline events go. Reporting must never fail; a sink that
/// cannot keep an event simply drops it.
pub trait ProgressSink: Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn report(&self, _event: ProgressEvent) {}
}

/// Sends events into a bounded channel, blocking when it is full.
pub struct ChannelSink {
    sender: Sender<ProgressEvent>,
}

impl ChannelSink {
    /// Create a sink and its receiving end with the given capacity.
    pub fn bounded(capacity: usize) -> (ChannelSink, Receiver<ProgressEvent>) {
        let (sender, receiver) = bounded(capacity);
        (ChannelSink { sender }, receiver)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, event: ProgressEvent) {
        // A disconnected receiver means nobody is listening anymore.
        let _ = self.sender.send(event);
    }
}

/// Drain a receiver until every sink clone is dropped, rendering events to
/// the log. Meant to run on its own thread next to the build.
pub fn drain_to_log(receiver: Receiver<ProgressEvent>) {
    for event in receiver {
        match event {
            ProgressEvent::DocumentMapped { path } => info!("mapped {path}"),
            ProgressEvent::MapStageDone { worker } => info!("worker {worker} finished mapping"),
            ProgressEvent::EntriesReduced { count } => info!("reduced {count} entries"),
            ProgressEvent::PartitionReduced { partition } => {
                info!("partition {partition} reduced")
            }
            ProgressEvent::BuildDone => info!("index build complete"),
        }
    }
}
