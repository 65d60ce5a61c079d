//! # Group Call Record Manager
//!
//! Create-or-update orchestration for group calls. Unlike individual calls,
//! a group call's direction can change after the fact (we thought someone
//! else started it, then learn we rang it from a linked device), and its
//! began timestamp is pulled back to the earliest event seen.

use std::sync::Arc;

use rusqlite::Transaction;
use uuid::Uuid;

use super::deleted_store::DeletedCallRecordStore;
use super::record::{CallDirection, CallRecord, CallStatus, CallType, GroupCallStatus};
use super::store::CallRecordStore;
use super::sync::{OutgoingCallEvent, SyncMessageSender};
use crate::error::Result;
use crate::storage::{InteractionRecord, InteractionStore};

/// Manages call records for group calls
#[derive(Clone)]
pub struct GroupCallRecordManager {
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    interactions: Arc<dyn InteractionStore>,
    sync: Arc<dyn SyncMessageSender>,
}

impl GroupCallRecordManager {
    /// Create a new manager
    pub fn new(interactions: Arc<dyn InteractionStore>, sync: Arc<dyn SyncMessageSender>) -> Self {
        Self {
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            interactions,
            sync,
        }
    }

    /// Insert a record for a group call interaction
    #[allow(clippy::too_many_arguments)]
    pub fn create_group_call_record(
        &self,
        tx: &Transaction<'_>,
        call_id: u64,
        interaction: &InteractionRecord,
        call_direction: CallDirection,
        status: GroupCallStatus,
        ringer_aci: Option<Uuid>,
        call_event_timestamp: i64,
        send_sync_message: bool,
    ) -> Result<CallRecord> {
        let mut record = CallRecord::new(
            call_id,
            interaction.id,
            interaction.thread_row_id,
            CallType::GroupCall,
            call_direction,
            CallStatus::Group(status),
            ringer_aci,
            call_event_timestamp,
        )?;
        self.store.insert(tx, &mut record)?;

        if send_sync_message {
            self.sync.send_call_event(
                tx,
                &record,
                OutgoingCallEvent::CallUpdated,
                call_event_timestamp,
            )?;
        }
        Ok(record)
    }

    /// Apply a group call event to an existing record.
    ///
    /// Direction, ringer and began timestamp are reconciled regardless of
    /// whether the status transition is allowed. Returns whether the status
    /// changed; a sync message is sent only in that case.
    #[allow(clippy::too_many_arguments)]
    pub fn update_group_call_record(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        new_direction: CallDirection,
        new_status: GroupCallStatus,
        new_ringer_aci: Option<Uuid>,
        call_event_timestamp: i64,
        send_sync_message: bool,
    ) -> Result<bool> {
        if record.call_direction != new_direction {
            self.store.update_direction(tx, record, new_direction)?;
        }
        if let Some(ringer) = new_ringer_aci {
            self.store.update_group_call_ringer_aci(tx, record, ringer)?;
        }
        self.store
            .update_call_began_timestamp_if_earlier(tx, record, call_event_timestamp)?;

        let updated = self
            .store
            .update_status_if_allowed(tx, record, CallStatus::Group(new_status))?;

        if updated && send_sync_message {
            self.sync.send_call_event(
                tx,
                record,
                OutgoingCallEvent::CallUpdated,
                call_event_timestamp,
            )?;
        }
        Ok(updated)
    }

    /// Create or update the record for `call_id` in a group thread.
    ///
    /// A new record gets a fresh group call interaction. Returns `None`
    /// without touching anything if the call was deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn create_or_update_call_record(
        &self,
        tx: &Transaction<'_>,
        call_id: u64,
        group_thread_row_id: i64,
        call_direction: CallDirection,
        status: GroupCallStatus,
        ringer_aci: Option<Uuid>,
        call_event_timestamp: i64,
        send_sync_message: bool,
    ) -> Result<Option<CallRecord>> {
        if self.deleted_store.contains(tx, call_id, group_thread_row_id)? {
            tracing::warn!(
                "Ignoring group call {} in thread {}: call was deleted",
                call_id,
                group_thread_row_id
            );
            return Ok(None);
        }

        match self.store.fetch(tx, call_id, group_thread_row_id)? {
            Some(mut record) => {
                self.update_group_call_record(
                    tx,
                    &mut record,
                    call_direction,
                    status,
                    ringer_aci,
                    call_event_timestamp,
                    send_sync_message,
                )?;
                Ok(Some(record))
            }
            None => {
                let interaction = self.interactions.insert_group_call_interaction(
                    tx,
                    group_thread_row_id,
                    call_event_timestamp,
                )?;
                let record = self.create_group_call_record(
                    tx,
                    call_id,
                    &interaction,
                    call_direction,
                    status,
                    ringer_aci,
                    call_event_timestamp,
                    send_sync_message,
                )?;
                Ok(Some(record))
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, SentSyncMessage};

    #[test]
    fn test_create_or_update_creates_interaction_and_record() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        let ringer = Uuid::new_v4();

        let record = fx
            .db
            .write(|tx| {
                fx.group_manager().create_or_update_call_record(
                    tx,
                    11,
                    thread,
                    CallDirection::Incoming,
                    GroupCallStatus::Ringing,
                    Some(ringer),
                    1_000,
                    true,
                )
            })
            .unwrap()
            .unwrap();

        assert_eq!(record.group_call_ringer_aci, Some(ringer));
        let interaction = fx.interaction(record.interaction_row_id).unwrap();
        assert_eq!(interaction.thread_row_id, thread);
        assert_eq!(interaction.timestamp, 1_000);
        assert_eq!(fx.sync.sent(), vec![SentSyncMessage::call_updated(&record, 1_000)]);
    }

    #[test]
    fn test_update_reconciles_direction_and_earliest_timestamp() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        let mut record = fx.insert_group_record(thread, 1, CallDirection::Incoming, GroupCallStatus::Generic, 500);
        let manager = fx.group_manager();

        let updated = fx
            .db
            .write(|tx| {
                manager.update_group_call_record(
                    tx,
                    &mut record,
                    CallDirection::Outgoing,
                    GroupCallStatus::RingingAccepted,
                    None,
                    200,
                    false,
                )
            })
            .unwrap();
        assert!(updated);

        // A later event never moves the timestamp forward
        fx.db
            .write(|tx| {
                manager.update_group_call_record(
                    tx,
                    &mut record,
                    CallDirection::Outgoing,
                    GroupCallStatus::RingingAccepted,
                    None,
                    900,
                    false,
                )
            })
            .unwrap();

        let stored = fx.record(1, thread).unwrap();
        assert_eq!(stored.call_direction, CallDirection::Outgoing);
        assert_eq!(stored.call_began_timestamp, 200);
        assert_eq!(stored.call_status, CallStatus::Group(GroupCallStatus::RingingAccepted));
    }

    #[test]
    fn test_rejected_transition_still_reconciles_but_never_syncs() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        let mut record = fx.insert_group_record(thread, 1, CallDirection::Incoming, GroupCallStatus::RingingAccepted, 500);
        let ringer = Uuid::new_v4();

        let updated = fx
            .db
            .write(|tx| {
                fx.group_manager().update_group_call_record(
                    tx,
                    &mut record,
                    CallDirection::Incoming,
                    GroupCallStatus::Joined,
                    Some(ringer),
                    100,
                    true,
                )
            })
            .unwrap();

        assert!(!updated);
        assert!(fx.sync.sent().is_empty());
        let stored = fx.record(1, thread).unwrap();
        assert_eq!(stored.call_began_timestamp, 100);
        assert_eq!(stored.group_call_ringer_aci, Some(ringer));
        assert_eq!(stored.call_status, CallStatus::Group(GroupCallStatus::RingingAccepted));
    }

    #[test]
    fn test_tombstoned_group_call_is_complete_noop() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        fx.db
            .write(|tx| fx.delete_manager().mark_call_as_deleted(tx, 42, thread))
            .unwrap();

        let result = fx
            .db
            .write(|tx| {
                fx.group_manager().create_or_update_call_record(
                    tx,
                    42,
                    thread,
                    CallDirection::Incoming,
                    GroupCallStatus::Joined,
                    None,
                    1_000,
                    true,
                )
            })
            .unwrap();

        assert!(result.is_none());
        assert_eq!(fx.record_count(), 0);
        assert_eq!(fx.interaction_count(), 0);
        assert!(fx.sync.sent().is_empty());
    }
}
