//! The single live [`Configuration`] shared between the data path and
//! the configuration path.

use crate::config::{Configuration, UpdateBatch};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info};

/// Holds the current configuration behind one lock.
///
/// Every [apply_updates](ConfigStore::apply_updates) and
/// [snapshot](ConfigStore::snapshot) call holds the lock for its whole
/// duration and for nothing else, so a reader never sees half of a batch.
#[derive(Debug)]
pub struct ConfigStore {
    current: Mutex<Configuration>,

    /// Advances once per batch that changed at least one value.
    revision_tx: watch::Sender<u64>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Configuration::default())
    }
}

impl ConfigStore {
    pub fn new(initial: Configuration) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            current: Mutex::new(initial),
            revision_tx,
        }
    }

    /// Apply a batch of named updates atomically and return the names
    /// whose value actually changed.
    ///
    /// Values equal to the current state are skipped. Subscribers are
    /// notified only when something changed.
    pub fn apply_updates(&self, batch: &UpdateBatch) -> Vec<String> {
        let mut current = self.lock();

        let changed: Vec<String> = batch
            .iter()
            .filter(|(name, value)| current.set(name, value))
            .map(|(name, _)| name.clone())
            .collect();

        if !changed.is_empty() {
            self.revision_tx.send_modify(|revision| *revision += 1);
        }
        drop(current);

        debug!(
            requested = batch.len(),
            changed = ?changed,
            "Applied configuration batch"
        );

        changed
    }

    /// A consistent copy of the current configuration.
    pub fn snapshot(&self) -> Configuration {
        self.lock().clone()
    }

    /// Number of effective batches applied so far.
    pub fn revision(&self) -> u64 {
        *self.revision_tx.borrow()
    }

    /// Watch the revision counter for configuration changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision_tx.subscribe()
    }

    /// Apply every batch received on `updates` until all senders are
    /// dropped.
    pub async fn listen(&self, updates: flume::Receiver<UpdateBatch>) {
        while let Ok(batch) = updates.recv_async().await {
            self.apply_updates(&batch);
        }
        info!("Configuration channel closed");
    }

    fn lock(&self) -> MutexGuard<'_, Configuration> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
