//! Storage lifecycle.
//!
//! A [`Storage`] owns everything one remote store needs: the read pool, the
//! submission queue, the sender thread (which owns the write pool), the
//! series reference cache and the send counters. Appenders and queriers
//! borrow from it.
//!
//! Closing a storage (explicitly or by dropping it) closes the submission
//! queue, lets the sender flush what is already queued, and joins it.

use std::sync::Arc;
use std::sync::mpsc::{SyncSender, sync_channel};
use std::thread::JoinHandle;

use crate::appender::{Batch, StoreAppender};
use crate::cache::RefCache;
use crate::config::StorageConfig;
use crate::error::{PoolError, Result, SendError};
use crate::pool::{StoreClient, create_pools};
use crate::querier::StoreQuerier;
use crate::sender::{SendStats, SendStatsSnapshot, spawn_sender};

/// A remote time-series store.
pub struct Storage {
    queue: Option<SyncSender<Batch>>,
    sender: Option<JoinHandle<()>>,
    read: Arc<dyn StoreClient>,
    cache: Arc<RefCache>,
    stats: Arc<SendStats>,
    batch_capacity: usize,
}

impl Storage {
    /// Opens the storage configured by `url`.
    ///
    /// Returns `Ok(None)` when no URL is configured (absent or blank): remote
    /// storage is then disabled and the host should carry on without it.
    ///
    /// # Errors
    ///
    /// Returns configuration errors for a bad URL and
    /// [`PoolError::InitFailure`] if either pool cannot be created.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use redts::Storage;
    ///
    /// assert!(Storage::open(None)?.is_none());
    /// assert!(Storage::open(Some("  "))?.is_none());
    /// # Ok::<(), redts::RedtsError>(())
    /// ```
    pub fn open(url: Option<&str>) -> Result<Option<Self>> {
        match url.map(str::trim).filter(|u| !u.is_empty()) {
            None => {
                tracing::info!("no storage url configured, remote storage disabled");
                Ok(None)
            }
            Some(raw) => {
                let config = StorageConfig::from_url(raw)?;
                Self::connect(&config).map(Some)
            }
        }
    }

    /// Creates both pools for `config` and starts the sender.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InitFailure`] if either pool cannot be created,
    /// and [`SendError::Spawn`] if the sender thread cannot be started.
    pub fn connect(config: &StorageConfig) -> Result<Self> {
        let (write, read) = create_pools(config)?;
        tracing::info!(
            addressing = ?config.addressing,
            pool_size = config.pool_size,
            queue_capacity = config.queue_capacity,
            "remote storage connected"
        );
        Self::with_clients(
            Arc::new(write),
            Arc::new(read),
            Arc::new(RefCache::new()),
            config.queue_capacity,
            config.batch_capacity,
        )
    }

    /// Assembles a storage from existing clients.
    ///
    /// `write` moves into the sender thread; `read` serves queries. The
    /// cache may be shared with other storages. A `queue_capacity` of zero is
    /// raised to one.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Spawn`] if the sender thread cannot be started.
    pub fn with_clients(
        write: Arc<dyn StoreClient>,
        read: Arc<dyn StoreClient>,
        cache: Arc<RefCache>,
        queue_capacity: usize,
        batch_capacity: usize,
    ) -> Result<Self> {
        let (queue, receiver) = sync_channel(queue_capacity.max(1));
        let stats = Arc::new(SendStats::new());
        let sender = spawn_sender(write, receiver, Arc::clone(&stats))
            .map_err(|source| SendError::Spawn { source })?;

        Ok(Self {
            queue: Some(queue),
            sender: Some(sender),
            read,
            cache,
            stats,
            batch_capacity,
        })
    }

    /// Returns a fresh appender with an empty batch.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once the storage has been shut down.
    pub fn appender(&self) -> Result<StoreAppender<'_>> {
        let queue = self.queue.as_ref().ok_or(PoolError::Closed)?;
        Ok(StoreAppender::new(
            queue,
            &self.cache,
            &self.stats,
            self.batch_capacity,
        ))
    }

    /// Returns a querier over the read pool.
    pub fn querier(&self) -> StoreQuerier<'_> {
        StoreQuerier::new(self.read.as_ref())
    }

    /// Oldest timestamp the store can answer for. Unknown, so the maximum
    /// value: the host never assumes this storage holds its local range.
    pub fn start_time(&self) -> i64 {
        i64::MAX
    }

    /// Counters for the write path.
    pub fn stats(&self) -> SendStatsSnapshot {
        self.stats.snapshot()
    }

    /// The series reference cache.
    pub fn cache(&self) -> &RefCache {
        &self.cache
    }

    /// Shuts down, waiting for queued batches to be sent.
    ///
    /// # Errors
    ///
    /// Never fails; the signature matches the storage contract.
    pub fn close(mut self) -> Result<()> {
        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        // Dropping the last sending half ends the sender loop.
        drop(self.queue.take());

        let Some(sender) = self.sender.take() else {
            return;
        };
        if sender.join().is_err() {
            tracing::error!("sender thread panicked");
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            queued = stats.queued,
            shed = stats.shed,
            sent = stats.sent,
            failed = stats.failed,
            "remote storage closed"
        );
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        self.shutdown();
    }
}
