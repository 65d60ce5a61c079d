//! # Call Record Delete Manager
//!
//! The only way call records leave the table. Each deletion writes a
//! tombstone in the same transaction, so a later event about the call can
//! never bring it back.

use std::sync::Arc;

use rusqlite::Transaction;

use super::cleanup::{CleanupRequest, CleanupScheduler};
use super::deleted_store::DeletedCallRecordStore;
use super::querier::{CallRecordQuerier, FetchOrdering};
use super::record::{CallRecord, DeletedCallRecord};
use super::store::CallRecordStore;
use super::sync::{CallLogAnchor, CallLogEventType, OutgoingCallEvent, SyncMessageSender};
use crate::error::Result;
use crate::storage::InteractionStore;

/// Deletes call records and records their tombstones
#[derive(Clone)]
pub struct CallRecordDeleteManager {
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    querier: CallRecordQuerier,
    interactions: Arc<dyn InteractionStore>,
    sync: Arc<dyn SyncMessageSender>,
    cleanup: CleanupScheduler,
}

impl CallRecordDeleteManager {
    /// Create a new delete manager
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        sync: Arc<dyn SyncMessageSender>,
        cleanup: CleanupScheduler,
    ) -> Self {
        Self {
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            querier: CallRecordQuerier::new(),
            interactions,
            sync,
            cleanup,
        }
    }

    /// Delete one record, tombstone it, and optionally tell linked devices.
    pub fn delete_call_record(
        &self,
        tx: &Transaction<'_>,
        record: &CallRecord,
        send_sync_message: bool,
    ) -> Result<()> {
        self.delete_call_records(tx, std::slice::from_ref(record), send_sync_message)
            .map(|_| ())
    }

    /// Delete several records. One sync message is sent per record when
    /// `send_sync_message` is set.
    ///
    /// Records already gone from the table are skipped. Returns how many
    /// were deleted.
    pub fn delete_call_records(
        &self,
        tx: &Transaction<'_>,
        records: &[CallRecord],
        send_sync_message: bool,
    ) -> Result<usize> {
        let now = crate::time::now_timestamp_millis();
        let mut deleted = 0;

        for record in records {
            if !self.store.delete(tx, record)? {
                tracing::warn!(
                    "Call {} in thread {} was already deleted",
                    record.call_id,
                    record.thread_row_id
                );
                continue;
            }

            self.deleted_store
                .insert(tx, &DeletedCallRecord::for_record(record, now))?;

            if send_sync_message {
                self.sync.send_call_event(
                    tx,
                    record,
                    OutgoingCallEvent::CallDeleted,
                    record.call_began_timestamp,
                )?;
            }
            deleted += 1;
        }

        if deleted > 0 {
            tracing::info!("Deleted {} call records", deleted);
            self.cleanup.schedule(CleanupRequest {
                deleted_at_timestamp: now,
            });
        }
        Ok(deleted)
    }

    /// Tombstone a call that was never seen on this device.
    ///
    /// Used when a linked device deletes a call we have no record of, so
    /// the call cannot appear later. Never sends a sync message.
    pub fn mark_call_as_deleted(
        &self,
        tx: &Transaction<'_>,
        call_id: u64,
        thread_row_id: i64,
    ) -> Result<()> {
        if self.deleted_store.contains(tx, call_id, thread_row_id)? {
            tracing::debug!(
                "Call {} in thread {} is already tombstoned",
                call_id,
                thread_row_id
            );
            return Ok(());
        }

        let now = crate::time::now_timestamp_millis();
        self.deleted_store.insert(
            tx,
            &DeletedCallRecord {
                call_id,
                thread_row_id,
                deleted_at_timestamp: now,
            },
        )?;
        self.cleanup.schedule(CleanupRequest {
            deleted_at_timestamp: now,
        });
        Ok(())
    }

    /// Delete every record that began at or before `timestamp`, along with
    /// its chat-timeline entry on this device.
    ///
    /// With `send_sync_message` one `Cleared` call log event is sent,
    /// anchored at the newest deleted record. Returns how many records were
    /// deleted.
    pub fn delete_all_call_records_before(
        &self,
        tx: &Transaction<'_>,
        timestamp: i64,
        send_sync_message: bool,
    ) -> Result<usize> {
        let records = self
            .querier
            .fetch_cursor(
                tx,
                FetchOrdering::DescendingBefore(timestamp.saturating_add(1)),
                None,
                None,
            )
            .collect::<Result<Vec<_>>>()?;

        let Some(newest) = records.first() else {
            tracing::debug!("No call records at or before {} to delete", timestamp);
            return Ok(0);
        };
        let anchor = CallLogAnchor::for_record(newest);

        let deleted = self.delete_call_records(tx, &records, false)?;
        for record in &records {
            self.interactions
                .delete_interaction(tx, record.interaction_row_id)?;
        }

        if send_sync_message {
            self.sync
                .send_call_log_event(tx, CallLogEventType::Cleared, anchor)?;
        }
        Ok(deleted)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{CallDirection, GroupCallStatus, IndividualCallStatus};
    use crate::testing::{Fixture, SentSyncMessage};

    #[test]
    fn test_delete_records_writes_tombstones_and_selective_sync() {
        let fx = Fixture::new();
        let contact = fx.contact_thread();
        let group = fx.group_thread();
        let records = vec![
            fx.insert_individual_record(contact, 1, CallDirection::Outgoing, IndividualCallStatus::Accepted, 10),
            fx.insert_group_record(group, 2, CallDirection::Incoming, GroupCallStatus::Joined, 20),
            fx.insert_individual_record(contact, 3, CallDirection::Incoming, IndividualCallStatus::IncomingMissed, 30),
            fx.insert_group_record(group, 4, CallDirection::Incoming, GroupCallStatus::RingingMissed, 40),
        ];
        let manager = fx.delete_manager();

        fx.db
            .write(|tx| {
                manager.delete_call_records(tx, &records[..2], true)?;
                manager.delete_call_record(tx, &records[2], false)?;
                manager.delete_call_record(tx, &records[3], false)
            })
            .unwrap();

        assert_eq!(fx.record_count(), 0);
        assert_eq!(fx.tombstone_count(), 4);
        for record in &records {
            assert!(fx.is_tombstoned(record.call_id, record.thread_row_id));
        }

        let sent = fx.sync.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|m| matches!(
            m,
            SentSyncMessage::CallEvent { event: OutgoingCallEvent::CallDeleted, .. }
        )));
        assert_eq!(fx.cleanup_requests(), 3);
    }

    #[test]
    fn test_delete_record_keeps_interaction() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let record = fx.insert_individual_record(thread, 1, CallDirection::Outgoing, IndividualCallStatus::Accepted, 10);

        fx.db
            .write(|tx| fx.delete_manager().delete_call_record(tx, &record, false))
            .unwrap();
        assert!(fx.interaction(record.interaction_row_id).is_some());
    }

    #[test]
    fn test_deleting_twice_skips_missing_record() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let record = fx.insert_individual_record(thread, 1, CallDirection::Outgoing, IndividualCallStatus::Accepted, 10);
        let manager = fx.delete_manager();

        fx.db.write(|tx| manager.delete_call_record(tx, &record, true)).unwrap();
        fx.db.write(|tx| manager.delete_call_record(tx, &record, true)).unwrap();

        assert_eq!(fx.tombstone_count(), 1);
        assert_eq!(fx.sync.sent().len(), 1);
    }

    #[test]
    fn test_mark_call_as_deleted_is_idempotent_and_silent() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        let manager = fx.delete_manager();

        fx.db.write(|tx| manager.mark_call_as_deleted(tx, 77, thread)).unwrap();
        fx.db.write(|tx| manager.mark_call_as_deleted(tx, 77, thread)).unwrap();

        assert!(fx.is_tombstoned(77, thread));
        assert_eq!(fx.tombstone_count(), 1);
        assert!(fx.sync.sent().is_empty());
        assert_eq!(fx.cleanup_requests(), 1);
    }

    #[test]
    fn test_delete_all_before_is_inclusive() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let old = fx.insert_individual_record(thread, 1, CallDirection::Outgoing, IndividualCallStatus::Accepted, 100);
        let at_cutoff = fx.insert_individual_record(thread, 2, CallDirection::Outgoing, IndividualCallStatus::Accepted, 200);
        let newer = fx.insert_individual_record(thread, 3, CallDirection::Outgoing, IndividualCallStatus::Accepted, 300);

        let deleted = fx
            .db
            .write(|tx| fx.delete_manager().delete_all_call_records_before(tx, 200, true))
            .unwrap();
        assert_eq!(deleted, 2);

        assert!(fx.record(old.call_id, thread).is_none());
        assert!(fx.record(at_cutoff.call_id, thread).is_none());
        assert!(fx.record(newer.call_id, thread).is_some());
        assert!(fx.interaction(old.interaction_row_id).is_none());
        assert!(fx.interaction(newer.interaction_row_id).is_some());

        assert_eq!(
            fx.sync.sent(),
            vec![SentSyncMessage::CallLogEvent {
                event: CallLogEventType::Cleared,
                anchor: CallLogAnchor::for_record(&at_cutoff),
            }]
        );
    }

    #[test]
    fn test_delete_all_before_with_nothing_to_delete() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        fx.insert_individual_record(thread, 1, CallDirection::Outgoing, IndividualCallStatus::Accepted, 500);

        let deleted = fx
            .db
            .write(|tx| fx.delete_manager().delete_all_call_records_before(tx, 100, true))
            .unwrap();
        assert_eq!(deleted, 0);
        assert!(fx.sync.sent().is_empty());
    }
}
