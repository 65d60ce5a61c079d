//! # Tombstone Cleanup
//!
//! Tombstones only need to outlive the window in which a stale event about
//! the deleted call can still arrive. The delete manager hands a
//! [`CleanupRequest`] to the [`CleanupScheduler`] whenever it writes one;
//! the [`DeletedCallRecordCleanupManager`] task consumes those requests and
//! deletes tombstones once they pass the retention window.
//!
//! ```text
//! ┌──────────────────┐  CleanupRequest   ┌─────────────────────────────────┐
//! │  DeleteManager   │ ────────────────► │ DeletedCallRecordCleanupManager │
//! │  (inside a tx)   │   unbounded mpsc  │ (tokio task)                    │
//! └──────────────────┘                   │  sleep until oldest expires     │
//!                                        │  db.write(delete_expired)       │
//!                                        └─────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::deleted_store::DeletedCallRecordStore;
use crate::error::Result;
use crate::storage::Database;

/// Default tombstone retention: 8 hours
pub const DEFAULT_TOMBSTONE_RETENTION_MS: i64 = 8 * 60 * 60 * 1000;

/// A tombstone was written and will need expiring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupRequest {
    /// When the tombstone was written (Unix timestamp ms)
    pub deleted_at_timestamp: i64,
}

/// Sending half of the cleanup queue
#[derive(Debug, Clone)]
pub struct CleanupScheduler {
    sender: mpsc::UnboundedSender<CleanupRequest>,
}

impl CleanupScheduler {
    pub(crate) fn new(sender: mpsc::UnboundedSender<CleanupRequest>) -> Self {
        Self { sender }
    }

    /// Queue a cleanup request. Never blocks.
    ///
    /// Returns `false` if the cleanup manager is no longer running; the
    /// tombstone then stays until the next manager run picks it up.
    pub fn schedule(&self, request: CleanupRequest) -> bool {
        match self.sender.send(request) {
            Ok(()) => true,
            Err(_) => {
                tracing::debug!("Tombstone cleanup manager not running, request dropped");
                false
            }
        }
    }
}

/// Expires tombstones once they pass the retention window
pub struct DeletedCallRecordCleanupManager {
    db: Arc<Database>,
    store: DeletedCallRecordStore,
    retention_ms: i64,
    receiver: mpsc::UnboundedReceiver<CleanupRequest>,
}

impl DeletedCallRecordCleanupManager {
    /// Create the manager together with the scheduler that feeds it
    pub fn new(db: Arc<Database>, retention_ms: i64) -> (CleanupScheduler, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let manager = Self {
            db,
            store: DeletedCallRecordStore::new(),
            retention_ms,
            receiver,
        };
        (CleanupScheduler::new(sender), manager)
    }

    /// Delete every tombstone older than the retention window at `now`.
    ///
    /// Returns how many were removed.
    pub fn cleanup_expired(&self, now: i64) -> Result<usize> {
        let cutoff = now.saturating_sub(self.retention_ms);
        let deleted = self.db.write(|tx| self.store.delete_expired(tx, cutoff))?;
        if deleted > 0 {
            tracing::info!("Expired {} call record tombstones", deleted);
        }
        Ok(deleted)
    }

    /// When the oldest remaining tombstone expires, if there is one
    pub fn next_expiry(&self) -> Result<Option<i64>> {
        let oldest = self.db.read(|conn| self.store.oldest_deleted_at(conn))?;
        Ok(oldest.map(|deleted_at| deleted_at.saturating_add(self.retention_ms)))
    }

    /// Run until every [`CleanupScheduler`] has been dropped.
    ///
    /// Tombstones already on disk at startup are handled too, so a restart
    /// never strands them.
    pub async fn run(mut self) {
        tracing::info!(
            "Tombstone cleanup manager started (retention {} ms)",
            self.retention_ms
        );

        loop {
            let next_expiry = match self.next_expiry() {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("Failed to read tombstone expiry: {}", e);
                    None
                }
            };

            match next_expiry {
                Some(expiry) => {
                    let now = crate::time::now_timestamp_millis();
                    if crate::time::is_expired(expiry, 0, now) {
                        if let Err(e) = self.cleanup_expired(now) {
                            tracing::error!("Failed to expire tombstones: {}", e);
                            // Wait for the next request instead of spinning
                            if self.receiver.recv().await.is_none() {
                                break;
                            }
                        }
                        continue;
                    }

                    let wait = Duration::from_millis((expiry - now) as u64);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        request = self.receiver.recv() => {
                            if request.is_none() {
                                break;
                            }
                        }
                    }
                }
                None => match self.receiver.recv().await {
                    Some(request) => {
                        tracing::debug!(
                            "Tombstone written at {}, scheduling cleanup",
                            request.deleted_at_timestamp
                        );
                    }
                    None => break,
                },
            }
        }

        tracing::info!("Tombstone cleanup manager stopped");
    }
}
