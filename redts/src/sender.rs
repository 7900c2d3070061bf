//! Background sender.
//!
//! One dedicated thread drains the submission queue and executes every batch
//! as a single pipelined round trip on the write pool. Delivery is
//! best-effort: a failed pipeline is logged, counted and dropped. The writer
//! that committed it has already been told it succeeded.
//!
//! The loop ends when every sending half of the queue has been dropped, after
//! the batches still in the queue have been sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use crate::appender::Batch;
use crate::error::SendError;
use crate::pool::StoreClient;

/// Counters for the write path's batch hand-off.
///
/// Batches are lost in two places, a full (or closed) submission queue at
/// commit time and a failed pipeline in the sender; both are counted here.
#[derive(Debug, Default)]
pub struct SendStats {
    queued: AtomicU64,
    shed: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`SendStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendStatsSnapshot {
    /// Batches accepted by the submission queue.
    pub queued: u64,
    /// Batches dropped at commit because the queue was full or closed.
    pub shed: u64,
    /// Batches executed successfully.
    pub sent: u64,
    /// Batches whose pipeline failed.
    pub failed: u64,
}

impl SendStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current counter values.
    pub fn snapshot(&self) -> SendStatsSnapshot {
        SendStatsSnapshot {
            queued: self.queued.load(Ordering::Relaxed),
            shed: self.shed.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_shed(&self) {
        self.shed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawns the sender thread.
///
/// # Errors
///
/// Returns an error if the OS refuses to create the thread.
pub fn spawn_sender(
    client: Arc<dyn StoreClient>,
    queue: Receiver<Batch>,
    stats: Arc<SendStats>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("redts-sender".to_string())
        .spawn(move || run(client.as_ref(), &queue, &stats))
}

/// Drains `queue` until it is closed.
pub fn run(client: &dyn StoreClient, queue: &Receiver<Batch>, stats: &SendStats) {
    for batch in queue {
        match client.pipeline(&batch) {
            Ok(()) => {
                stats.record_sent();
                tracing::trace!(commands = batch.len(), "batch sent");
            }
            Err(e) => {
                stats.record_failed();
                let err = SendError::Failure {
                    commands: batch.len(),
                    source: Box::new(e),
                };
                tracing::error!(error = %err, "send failed, batch dropped");
            }
        }
    }
    tracing::debug!("submission queue closed, sender exiting");
}
