//! # Deleted Call Record Store
//!
//! Tombstones for deleted call records. A tombstone for (call id, thread)
//! stops any later event about that call from recreating the record, until
//! the cleanup manager expires it.

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use super::record::DeletedCallRecord;
use crate::error::{Error, Result};

/// Reads and writes tombstone rows
#[derive(Debug, Clone, Copy, Default)]
pub struct DeletedCallRecordStore;

impl DeletedCallRecordStore {
    /// Create a new store
    pub fn new() -> Self {
        Self
    }

    /// Record a tombstone
    pub fn insert(&self, tx: &Transaction<'_>, deleted: &DeletedCallRecord) -> Result<()> {
        tx.execute(
            "INSERT INTO deleted_call_record (call_id, thread_row_id, deleted_at_timestamp)
             VALUES (?, ?, ?)",
            params![
                deleted.call_id.to_string(),
                deleted.thread_row_id,
                deleted.deleted_at_timestamp
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to insert tombstone: {}", e)))?;

        tracing::debug!(
            "Tombstoned call {} in thread {}",
            deleted.call_id,
            deleted.thread_row_id
        );
        Ok(())
    }

    /// Fetch the tombstone for `call_id` in `thread_row_id`
    pub fn fetch(
        &self,
        conn: &Connection,
        call_id: u64,
        thread_row_id: i64,
    ) -> Result<Option<DeletedCallRecord>> {
        conn.query_row(
            "SELECT call_id, thread_row_id, deleted_at_timestamp
             FROM deleted_call_record INDEXED BY index_deleted_call_record_on_threadRowId_and_callId
             WHERE thread_row_id = ? AND call_id = ?",
            params![thread_row_id, call_id.to_string()],
            |row| {
                Ok(DeletedCallRecord {
                    call_id,
                    thread_row_id: row.get(1)?,
                    deleted_at_timestamp: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch tombstone: {}", e)))
    }

    /// Whether `call_id` in `thread_row_id` has been deleted
    pub fn contains(&self, conn: &Connection, call_id: u64, thread_row_id: i64) -> Result<bool> {
        Ok(self.fetch(conn, call_id, thread_row_id)?.is_some())
    }

    /// Re-point every tombstone of `from_thread_row_id` at
    /// `into_thread_row_id`.
    ///
    /// If the target thread already has a tombstone for the same call id the
    /// existing one wins and the source row is dropped.
    pub fn update_with_merged_thread(
        &self,
        tx: &Transaction<'_>,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<usize> {
        let moved = tx.execute(
            "UPDATE OR IGNORE deleted_call_record SET thread_row_id = ? WHERE thread_row_id = ?",
            params![into_thread_row_id, from_thread_row_id],
        )?;
        let dropped = tx.execute(
            "DELETE FROM deleted_call_record WHERE thread_row_id = ?",
            params![from_thread_row_id],
        )?;

        tracing::info!(
            "Moved {} tombstones from thread {} into thread {} ({} duplicates dropped)",
            moved,
            from_thread_row_id,
            into_thread_row_id,
            dropped
        );
        Ok(moved)
    }

    /// Delete every tombstone created at or before `timestamp`.
    ///
    /// Returns how many were removed.
    pub fn delete_expired(&self, tx: &Transaction<'_>, timestamp: i64) -> Result<usize> {
        let deleted = tx.execute(
            "DELETE FROM deleted_call_record WHERE deleted_at_timestamp <= ?",
            params![timestamp],
        )?;
        Ok(deleted)
    }

    /// Deletion time of the oldest tombstone, if any
    pub fn oldest_deleted_at(&self, conn: &Connection) -> Result<Option<i64>> {
        let oldest: Option<i64> = conn.query_row(
            "SELECT MIN(deleted_at_timestamp) FROM deleted_call_record",
            [],
            |row| row.get(0),
        )?;
        Ok(oldest)
    }

    /// Count every tombstone
    pub fn count(&self, conn: &Connection) -> Result<u64> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM deleted_call_record", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    fn tombstone(call_id: u64, thread_row_id: i64, at: i64) -> DeletedCallRecord {
        DeletedCallRecord {
            call_id,
            thread_row_id,
            deleted_at_timestamp: at,
        }
    }

    #[test]
    fn test_insert_fetch_contains() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let store = DeletedCallRecordStore::new();

        fx.db
            .write(|tx| store.insert(tx, &tombstone(u64::MAX, thread, 10)))
            .unwrap();

        assert!(fx.db.read(|conn| store.contains(conn, u64::MAX, thread)).unwrap());
        assert!(!fx.db.read(|conn| store.contains(conn, 1, thread)).unwrap());
        assert_eq!(
            fx.db.read(|conn| store.fetch(conn, u64::MAX, thread)).unwrap(),
            Some(tombstone(u64::MAX, thread, 10))
        );
    }

    #[test]
    fn test_duplicate_tombstone_rejected() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let store = DeletedCallRecordStore::new();

        fx.db.write(|tx| store.insert(tx, &tombstone(1, thread, 10))).unwrap();
        assert!(fx.db.write(|tx| store.insert(tx, &tombstone(1, thread, 11))).is_err());
    }

    #[test]
    fn test_merge_moves_tombstones_and_keeps_suppression() {
        let fx = Fixture::new();
        let from = fx.contact_thread();
        let into = fx.contact_thread();
        let store = DeletedCallRecordStore::new();

        fx.db
            .write(|tx| {
                store.insert(tx, &tombstone(1, from, 10))?;
                store.insert(tx, &tombstone(2, from, 20))?;
                store.insert(tx, &tombstone(2, into, 5))
            })
            .unwrap();

        let moved = fx
            .db
            .write(|tx| store.update_with_merged_thread(tx, from, into))
            .unwrap();
        assert_eq!(moved, 1);

        assert!(fx.db.read(|conn| store.contains(conn, 1, into)).unwrap());
        assert_eq!(
            fx.db.read(|conn| store.fetch(conn, 2, into)).unwrap(),
            Some(tombstone(2, into, 5))
        );
        assert!(!fx.db.read(|conn| store.contains(conn, 1, from)).unwrap());
        assert_eq!(fx.db.read(|conn| store.count(conn)).unwrap(), 2);
    }

    #[test]
    fn test_delete_expired_and_oldest() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let store = DeletedCallRecordStore::new();

        assert_eq!(fx.db.read(|conn| store.oldest_deleted_at(conn)).unwrap(), None);

        fx.db
            .write(|tx| {
                store.insert(tx, &tombstone(1, thread, 100))?;
                store.insert(tx, &tombstone(2, thread, 200))?;
                store.insert(tx, &tombstone(3, thread, 300))
            })
            .unwrap();
        assert_eq!(fx.db.read(|conn| store.oldest_deleted_at(conn)).unwrap(), Some(100));

        let deleted = fx.db.write(|tx| store.delete_expired(tx, 200)).unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(fx.db.read(|conn| store.oldest_deleted_at(conn)).unwrap(), Some(300));
    }
}
