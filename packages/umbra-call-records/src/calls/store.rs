//! # Call Record Store
//!
//! Row-level reads and writes on the `call_record` table. Status changes go
//! through [`CallRecordStore::update_status_if_allowed`], which consults the
//! transition rules before touching the row.
//!
//! Every mutating method also updates the in-memory [`CallRecord`] it was
//! handed, so callers can keep using it afterwards.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::record::{CallDirection, CallRecord, CallStatus, CallUnreadStatus};
use super::transition::is_transition_allowed;
use crate::error::{Error, Result};

/// Reads and writes call record rows
#[derive(Debug, Clone, Copy, Default)]
pub struct CallRecordStore;

impl CallRecordStore {
    /// Create a new store
    pub fn new() -> Self {
        Self
    }

    /// Insert a new record and set its row id.
    pub fn insert(&self, tx: &Transaction<'_>, record: &mut CallRecord) -> Result<()> {
        if !record.call_status.matches(record.call_type) {
            tracing::error!(
                "Refusing to insert call {} with status {:?} for {:?}",
                record.call_id,
                record.call_status,
                record.call_type
            );
            return Err(Error::CallStatusMismatch {
                call_type: record.call_type,
                status: record.call_status,
            });
        }

        tx.execute(
            "INSERT INTO call_record (
                call_id, interaction_row_id, thread_row_id, call_type, direction,
                status, unread_status, timestamp, group_call_ringer_aci
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                record.call_id.to_string(),
                record.interaction_row_id,
                record.thread_row_id,
                record.call_type.raw_value(),
                record.call_direction.raw_value(),
                record.call_status.raw_value(),
                record.unread_status.raw_value(),
                record.call_began_timestamp,
                record.group_call_ringer_aci.map(|aci| aci.to_string()),
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to insert call record: {}", e)))?;

        record.id = Some(tx.last_insert_rowid());
        tracing::info!(
            "Inserted call record {} in thread {} ({:?}, {:?})",
            record.call_id,
            record.thread_row_id,
            record.call_direction,
            record.call_status
        );
        Ok(())
    }

    /// Fetch the record for `call_id` in `thread_row_id`
    pub fn fetch(&self, conn: &Connection, call_id: u64, thread_row_id: i64) -> Result<Option<CallRecord>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM call_record INDEXED BY index_call_record_on_callId_and_threadId
                 WHERE call_id = ? AND thread_row_id = ?",
                CallRecord::COLUMNS
            ),
            params![call_id.to_string(), thread_row_id],
            CallRecord::from_row,
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch call record: {}", e)))
    }

    /// Fetch the record attached to an interaction
    pub fn fetch_by_interaction_row_id(
        &self,
        conn: &Connection,
        interaction_row_id: i64,
    ) -> Result<Option<CallRecord>> {
        conn.query_row(
            &format!(
                "SELECT {} FROM call_record WHERE interaction_row_id = ?",
                CallRecord::COLUMNS
            ),
            params![interaction_row_id],
            CallRecord::from_row,
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch call record: {}", e)))
    }

    /// Move `record` to `new_status` if the transition is allowed.
    ///
    /// Returns `false` and changes nothing when it is not. The unread status
    /// is re-derived from the new call status.
    pub fn update_status_if_allowed(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        new_status: CallStatus,
    ) -> Result<bool> {
        if !new_status.matches(record.call_type) {
            tracing::error!(
                "Status {:?} does not apply to {:?} call {}",
                new_status,
                record.call_type,
                record.call_id
            );
            return Err(Error::CallStatusMismatch {
                call_type: record.call_type,
                status: new_status,
            });
        }

        if !is_transition_allowed(record.call_status, new_status) {
            tracing::warn!(
                "Ignoring status transition {:?} -> {:?} for call {} in thread {}",
                record.call_status,
                new_status,
                record.call_id,
                record.thread_row_id
            );
            return Ok(false);
        }

        let unread_status = new_status.unread_status();
        tx.execute(
            "UPDATE call_record SET status = ?, unread_status = ?
             WHERE call_id = ? AND thread_row_id = ?",
            params![
                new_status.raw_value(),
                unread_status.raw_value(),
                record.call_id.to_string(),
                record.thread_row_id
            ],
        )?;

        tracing::info!(
            "Call {} in thread {}: {:?} -> {:?}",
            record.call_id,
            record.thread_row_id,
            record.call_status,
            new_status
        );
        record.call_status = new_status;
        record.unread_status = unread_status;
        Ok(true)
    }

    /// Overwrite the call direction
    pub fn update_direction(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        new_direction: CallDirection,
    ) -> Result<()> {
        tx.execute(
            "UPDATE call_record SET direction = ? WHERE call_id = ? AND thread_row_id = ?",
            params![
                new_direction.raw_value(),
                record.call_id.to_string(),
                record.thread_row_id
            ],
        )?;
        record.call_direction = new_direction;
        Ok(())
    }

    /// Overwrite the group call ringer
    pub fn update_group_call_ringer_aci(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        new_ringer_aci: Uuid,
    ) -> Result<()> {
        debug_assert!(record.call_type.is_group());

        tx.execute(
            "UPDATE call_record SET group_call_ringer_aci = ?
             WHERE call_id = ? AND thread_row_id = ?",
            params![
                new_ringer_aci.to_string(),
                record.call_id.to_string(),
                record.thread_row_id
            ],
        )?;
        record.group_call_ringer_aci = Some(new_ringer_aci);
        Ok(())
    }

    /// Move the call's began timestamp back to `timestamp` if it is earlier.
    ///
    /// Returns whether anything changed.
    pub fn update_call_began_timestamp_if_earlier(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        timestamp: i64,
    ) -> Result<bool> {
        if timestamp >= record.call_began_timestamp {
            return Ok(false);
        }

        tx.execute(
            "UPDATE call_record SET timestamp = ? WHERE call_id = ? AND thread_row_id = ?",
            params![timestamp, record.call_id.to_string(), record.thread_row_id],
        )?;
        record.call_began_timestamp = timestamp;
        Ok(true)
    }

    /// Clear the unread flag without touching the call status
    pub fn mark_as_read(&self, tx: &Transaction<'_>, record: &mut CallRecord) -> Result<()> {
        tx.execute(
            "UPDATE call_record SET unread_status = ? WHERE call_id = ? AND thread_row_id = ?",
            params![
                CallUnreadStatus::Read.raw_value(),
                record.call_id.to_string(),
                record.thread_row_id
            ],
        )?;
        record.unread_status = CallUnreadStatus::Read;
        Ok(())
    }

    /// Records that cannot survive merging `from_thread_row_id` into
    /// `into_thread_row_id`.
    ///
    /// These are source records whose call id is already tombstoned or
    /// recorded in the target, and target records whose call id is
    /// tombstoned in the source.
    pub fn fetch_merge_conflicts(
        &self,
        conn: &Connection,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<Vec<CallRecord>> {
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM call_record AS r
                 WHERE (r.thread_row_id = ?1 AND (
                        EXISTS (SELECT 1 FROM deleted_call_record AS d
                                WHERE d.call_id = r.call_id AND d.thread_row_id = ?2)
                        OR EXISTS (SELECT 1 FROM call_record AS o
                                   WHERE o.call_id = r.call_id AND o.thread_row_id = ?2)))
                    OR (r.thread_row_id = ?2 AND
                        EXISTS (SELECT 1 FROM deleted_call_record AS d
                                WHERE d.call_id = r.call_id AND d.thread_row_id = ?1))",
                CallRecord::COLUMNS
            ))
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare merge query: {}", e)))?;

        let records = stmt
            .query_map(
                params![from_thread_row_id, into_thread_row_id],
                CallRecord::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Re-point every record of `from_thread_row_id` at `into_thread_row_id`.
    ///
    /// Conflicting records must already be gone, see
    /// [`CallRecordStore::fetch_merge_conflicts`].
    ///
    /// Returns how many records moved.
    pub fn update_with_merged_thread(
        &self,
        tx: &Transaction<'_>,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<usize> {
        let moved = tx.execute(
            "UPDATE call_record SET thread_row_id = ? WHERE thread_row_id = ?",
            params![into_thread_row_id, from_thread_row_id],
        )?;
        tracing::info!(
            "Moved {} call records from thread {} into thread {}",
            moved,
            from_thread_row_id,
            into_thread_row_id
        );
        Ok(moved)
    }

    /// Delete a record row. Returns whether a row was removed.
    pub fn delete(&self, tx: &Transaction<'_>, record: &CallRecord) -> Result<bool> {
        let deleted = tx.execute(
            "DELETE FROM call_record WHERE call_id = ? AND thread_row_id = ?",
            params![record.call_id.to_string(), record.thread_row_id],
        )?;
        Ok(deleted > 0)
    }

    /// Count records with unread status
    pub fn count_unread(&self, conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM call_record INDEXED BY index_call_record_on_unread_status_and_timestamp
             WHERE unread_status = ?",
            params![CallUnreadStatus::Unread.raw_value()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Count every record
    pub fn count(&self, conn: &Connection) -> Result<u64> {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM call_record", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ============================================================================
// TESTS
// ============================================================================
