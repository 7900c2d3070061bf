//! Write batching.
//!
//! A [`StoreAppender`] turns each accepted sample into one `TS.ADD` command
//! and buffers it in the current batch. [`commit`](StoreAppender::commit)
//! hands the whole batch to the background sender through the bounded
//! submission queue without ever blocking: when the queue is full the batch
//! is dropped and logged. Collection latency wins over durability.
//!
//! # Transaction Flow
//!
//! 1. `add` / `add_fast` append commands to the open batch
//! 2. `commit` submits the batch and opens a fresh one, or
//!    `rollback` discards it
//! 3. The appender is immediately ready for the next transaction

use std::sync::mpsc::{SyncSender, TrySendError};

use crate::cache::RefCache;
use crate::error::{AppendError, Result};
use crate::key::key_for;
use crate::labels::Labels;
use crate::resp::Command;
use crate::sender::SendStats;

/// Command that appends one sample to a series.
pub const TS_ADD: &str = "TS.ADD";

/// Marker argument that precedes the label pairs of `TS.ADD`.
pub const LABELS: &str = "LABELS";

/// Default batch capacity. A sizing hint only: batches grow past it.
pub const DEFAULT_BATCH_CAPACITY: usize = 500;

/// An ordered list of commands executed as one pipeline.
pub type Batch = Vec<Command>;

/// Buffers samples for one storage and submits them in batches.
///
/// Appenders borrow their storage's queue, cache and counters, so several
/// can be used at once (one per thread) and none can outlive the storage.
pub struct StoreAppender<'a> {
    batch: Batch,
    batch_capacity: usize,
    cache: &'a RefCache,
    queue: &'a SyncSender<Batch>,
    stats: &'a SendStats,
}

impl<'a> StoreAppender<'a> {
    /// Creates an appender with an empty batch.
    pub fn new(
        queue: &'a SyncSender<Batch>,
        cache: &'a RefCache,
        stats: &'a SendStats,
        batch_capacity: usize,
    ) -> Self {
        Self {
            batch: Vec::with_capacity(batch_capacity),
            batch_capacity,
            cache,
            queue,
            stats,
        }
    }

    /// Appends a sample for the series identified by `labels`.
    ///
    /// Returns the series reference, which can be passed to
    /// [`add_fast`](Self::add_fast) for later samples of the same series.
    /// The reference is recorded even when the sample itself is dropped for
    /// having a non-finite value.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::InvalidLabelSet`] if `labels` has no metric name.
    pub fn add(&mut self, labels: &Labels, timestamp: i64, value: f64) -> Result<u64> {
        let (key, reference) = key_for(labels)?;
        self.cache.insert(reference, &key);
        self.push(&key, timestamp, value, labels);
        Ok(reference)
    }

    /// Appends a sample for a series previously seen by [`add`](Self::add).
    ///
    /// The command carries no `LABELS` section; the store already has them.
    ///
    /// # Errors
    ///
    /// Returns [`AppendError::UnknownReference`] if `reference` is not in the
    /// cache. The batch is left untouched.
    pub fn add_fast(&mut self, reference: u64, timestamp: i64, value: f64) -> Result<()> {
        let key = self
            .cache
            .get(reference)
            .ok_or(AppendError::UnknownReference { reference })?;
        self.push(&key, timestamp, value, &Labels::default());
        Ok(())
    }

    /// Submits the current batch to the sender and starts a new one.
    ///
    /// Never blocks and never fails: if the submission queue is full (or the
    /// storage is shutting down) the batch is dropped and an error is logged.
    /// Empty batches are not submitted.
    ///
    /// # Errors
    ///
    /// Always returns `Ok`; the signature matches the appender contract.
    pub fn commit(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_capacity));
        let commands = batch.len();

        match self.queue.try_send(batch) {
            Ok(()) => self.stats.record_queued(),
            Err(TrySendError::Full(_)) => {
                self.stats.record_shed();
                tracing::error!(commands, "submission queue full, batch dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.stats.record_shed();
                tracing::error!(commands, "sender has stopped, batch dropped");
            }
        }
        Ok(())
    }

    /// Discards every buffered command, keeping the batch's capacity.
    ///
    /// # Errors
    ///
    /// Always returns `Ok`.
    pub fn rollback(&mut self) -> Result<()> {
        tracing::debug!(commands = self.batch.len(), "batch rolled back");
        self.batch.clear();
        Ok(())
    }

    /// Commands buffered in the open batch, in submission order.
    pub fn pending(&self) -> &[Command] {
        &self.batch
    }

    /// Number of commands buffered in the open batch.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// Returns `true` if the open batch is empty.
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Builds the `TS.ADD` command for one sample, dropping non-finite values.
    fn push(&mut self, key: &str, timestamp: i64, value: f64, labels: &Labels) {
        if !value.is_finite() {
            return;
        }

        let mut cmd = Command::with_capacity(TS_ADD, 4 + labels.len() * 2);
        cmd.push_arg(key);
        cmd.push_arg(timestamp.to_string());
        cmd.push_arg(format!("{value:.6}"));
        if !labels.is_empty() {
            cmd.push_arg(LABELS);
        }
        for label in labels {
            cmd.push_arg(label.name.as_str());
            cmd.push_arg(label.value.as_str());
        }
        self.batch.push(cmd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RedtsError;
    use std::sync::mpsc::{Receiver, sync_channel};

    struct Harness {
        tx: SyncSender<Batch>,
        rx: Receiver<Batch>,
        cache: RefCache,
        stats: SendStats,
    }

    impl Harness {
        fn new(queue: usize) -> Self {
            let (tx, rx) = sync_channel(queue);
            Self {
                tx,
                rx,
                cache: RefCache::new(),
                stats: SendStats::new(),
            }
        }

        fn appender(&self) -> StoreAppender<'_> {
            StoreAppender::new(&self.tx, &self.cache, &self.stats, DEFAULT_BATCH_CAPACITY)
        }
    }

    fn cpu() -> Labels {
        Labels::from_pairs([("__name__", "cpu"), ("host", "a")])
    }

    #[test]
    fn test_add_builds_full_command() {
        let h = Harness::new(1);
        let mut app = h.appender();

        let reference = app.add(&cpu(), 1000, 0.5).unwrap();
        assert_eq!(reference, cpu().hash());

        let cmd = &app.pending()[0];
        assert_eq!(cmd.name(), TS_ADD);
        assert_eq!(
            cmd.args(),
            [
                "cpu{__name__=cpu,host=a}",
                "1000",
                "0.500000",
                "LABELS",
                "__name__",
                "cpu",
                "host",
                "a"
            ]
        );
    }

    #[test]
    fn test_add_fast_reuses_cached_key_without_labels() {
        let h = Harness::new(1);
        let mut app = h.appender();

        let reference = app.add(&cpu(), 1000, 0.5).unwrap();
        app.add_fast(reference, 2000, 0.7).unwrap();

        let cmd = &app.pending()[1];
        assert_eq!(
            cmd.args(),
            ["cpu{__name__=cpu,host=a}", "2000", "0.700000"]
        );
        assert_eq!(h.cache.len(), 1);
    }

    #[test]
    fn test_add_fast_unknown_reference() {
        let h = Harness::new(1);
        let mut app = h.appender();
        app.add(&cpu(), 1, 1.0).unwrap();

        let err = app.add_fast(12345, 2, 2.0).unwrap_err();
        assert!(matches!(
            err,
            RedtsError::Append(AppendError::UnknownReference { reference: 12345 })
        ));
        assert_eq!(app.len(), 1);
    }

    #[test]
    fn test_non_finite_values_are_dropped_silently() {
        let h = Harness::new(1);
        let mut app = h.appender();

        let reference = app.add(&cpu(), 1, f64::NAN).unwrap();
        assert!(app.is_empty());
        // The reference is still usable.
        app.add_fast(reference, 2, f64::INFINITY).unwrap();
        app.add_fast(reference, 3, f64::NEG_INFINITY).unwrap();
        assert!(app.is_empty());

        app.add_fast(reference, 4, 1.0).unwrap();
        assert_eq!(app.len(), 1);
    }

    #[test]
    fn test_invalid_label_set_appends_nothing() {
        let h = Harness::new(1);
        let mut app = h.appender();
        let labels = Labels::from_pairs([("host", "a")]);
        assert!(app.add(&labels, 1, 1.0).is_err());
        assert!(app.is_empty());
        assert!(h.cache.is_empty());
    }

    #[test]
    fn test_commit_submits_batch_in_order() {
        let h = Harness::new(1);
        let mut app = h.appender();

        let reference = app.add(&cpu(), 1000, 0.5).unwrap();
        app.add_fast(reference, 2000, 0.7).unwrap();
        app.commit().unwrap();
        assert!(app.is_empty());

        let batch = h.rx.try_recv().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].args()[1], "1000");
        assert_eq!(batch[1].args()[1], "2000");
        assert_eq!(batch[0].args()[0], batch[1].args()[0]);
        assert_eq!(h.stats.snapshot().queued, 1);
    }

    #[test]
    fn test_commit_drops_batch_when_queue_full() {
        let h = Harness::new(1);
        let mut app = h.appender();

        app.add(&cpu(), 1, 1.0).unwrap();
        app.commit().unwrap();
        app.add(&cpu(), 2, 2.0).unwrap();
        app.commit().unwrap();

        let snapshot = h.stats.snapshot();
        assert_eq!(snapshot.queued, 1);
        assert_eq!(snapshot.shed, 1);
        assert!(app.is_empty());

        let first = h.rx.try_recv().unwrap();
        assert_eq!(first[0].args()[1], "1");
        assert!(h.rx.try_recv().is_err());
    }

    #[test]
    fn test_commit_after_sender_stopped_does_not_error() {
        let (tx, rx) = sync_channel(1);
        drop(rx);
        let cache = RefCache::new();
        let stats = SendStats::new();
        let mut app = StoreAppender::new(&tx, &cache, &stats, 4);

        app.add(&cpu(), 1, 1.0).unwrap();
        assert!(app.commit().is_ok());
        assert_eq!(stats.snapshot().shed, 1);
    }

    #[test]
    fn test_rollback_then_commit_sends_nothing() {
        let h = Harness::new(1);
        let mut app = h.appender();

        app.add(&cpu(), 1, 1.0).unwrap();
        app.add(&cpu(), 2, 2.0).unwrap();
        app.rollback().unwrap();
        assert!(app.is_empty());

        app.commit().unwrap();
        assert!(h.rx.try_recv().is_err());
        assert_eq!(h.stats.snapshot().queued, 0);
    }

    #[test]
    fn test_appenders_share_cache() {
        let h = Harness::new(2);
        let reference = h.appender().add(&cpu(), 1, 1.0).unwrap();

        let mut other = h.appender();
        other.add_fast(reference, 2, 2.0).unwrap();
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_batch_grows_past_capacity_hint() {
        let (tx, _rx) = sync_channel(1);
        let cache = RefCache::new();
        let stats = SendStats::new();
        let mut app = StoreAppender::new(&tx, &cache, &stats, 2);
        for t in 0..5 {
            app.add(&cpu(), t, 1.0).unwrap();
        }
        assert_eq!(app.len(), 5);
    }
}
