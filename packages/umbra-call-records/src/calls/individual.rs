//! # Individual Call Record Manager
//!
//! Create-or-update orchestration for one-to-one calls. The chat-timeline
//! entry is the source of truth for how an individual call looks; the call
//! record follows it.

use std::sync::Arc;

use rusqlite::Transaction;

use super::deleted_store::DeletedCallRecordStore;
use super::record::{CallDirection, CallRecord, CallStatus, CallType, IndividualCallStatus};
use super::store::CallRecordStore;
use super::sync::{OutgoingCallEvent, SyncMessageSender};
use crate::error::{Error, Result};
use crate::storage::{
    CallOfferType, IndividualCallInteractionType, InteractionKind, InteractionRecord,
    InteractionStore,
};

/// Manages call records for one-to-one calls
#[derive(Clone)]
pub struct IndividualCallRecordManager {
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    interactions: Arc<dyn InteractionStore>,
    sync: Arc<dyn SyncMessageSender>,
}

impl IndividualCallRecordManager {
    /// Create a new manager
    pub fn new(interactions: Arc<dyn InteractionStore>, sync: Arc<dyn SyncMessageSender>) -> Self {
        Self {
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            interactions,
            sync,
        }
    }

    /// Insert a record for an individual call interaction.
    ///
    /// A sync message goes out only if requested and the call has moved
    /// past `Pending`.
    #[allow(clippy::too_many_arguments)]
    pub fn create_record_for_interaction(
        &self,
        tx: &Transaction<'_>,
        interaction: &InteractionRecord,
        call_id: u64,
        call_type: CallType,
        call_direction: CallDirection,
        status: IndividualCallStatus,
        call_event_timestamp: i64,
        send_sync_message: bool,
    ) -> Result<CallRecord> {
        let mut record = CallRecord::new(
            call_id,
            interaction.id,
            interaction.thread_row_id,
            call_type,
            call_direction,
            CallStatus::Individual(status),
            None,
            interaction.timestamp,
        )?;
        self.store.insert(tx, &mut record)?;

        if send_sync_message && status != IndividualCallStatus::Pending {
            self.sync.send_call_event(
                tx,
                &record,
                OutgoingCallEvent::CallUpdated,
                call_event_timestamp,
            )?;
        }
        Ok(record)
    }

    /// Move an existing record to `new_status`.
    ///
    /// Returns whether the transition was accepted. Rejected transitions
    /// never send a sync message.
    pub fn update_record(
        &self,
        tx: &Transaction<'_>,
        record: &mut CallRecord,
        new_status: IndividualCallStatus,
        call_event_timestamp: i64,
        send_sync_message: bool,
    ) -> Result<bool> {
        let updated =
            self.store
                .update_status_if_allowed(tx, record, CallStatus::Individual(new_status))?;

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

    /// Bring the record for `call_id` in line with `interaction`, creating
    /// it if needed.
    ///
    /// Returns `None` without touching anything if the call was deleted.
    pub fn create_or_update_record_for_interaction(
        &self,
        tx: &Transaction<'_>,
        interaction: &InteractionRecord,
        call_id: u64,
        send_sync_message: bool,
    ) -> Result<Option<CallRecord>> {
        let interaction_type = individual_interaction_type(interaction)?;
        let thread_row_id = interaction.thread_row_id;

        if self.deleted_store.contains(tx, call_id, thread_row_id)? {
            tracing::warn!(
                "Ignoring update for call {} in thread {}: call was deleted",
                call_id,
                thread_row_id
            );
            return Ok(None);
        }

        let status = interaction_type.individual_call_status();
        match self.store.fetch(tx, call_id, thread_row_id)? {
            Some(mut record) => {
                self.update_record(tx, &mut record, status, interaction.timestamp, send_sync_message)?;
                Ok(Some(record))
            }
            None => {
                let call_type = match interaction.offer_type {
                    Some(CallOfferType::Video) => CallType::VideoCall,
                    _ => CallType::AudioCall,
                };
                let record = self.create_record_for_interaction(
                    tx,
                    interaction,
                    call_id,
                    call_type,
                    interaction_type.call_direction(),
                    status,
                    interaction.timestamp,
                    send_sync_message,
                )?;
                Ok(Some(record))
            }
        }
    }

    /// Change how an interaction is displayed, and move its call record
    /// along if it has one.
    pub fn update_interaction_type_and_record_if_exists(
        &self,
        tx: &Transaction<'_>,
        interaction: &InteractionRecord,
        new_interaction_type: IndividualCallInteractionType,
        send_sync_message: bool,
    ) -> Result<()> {
        individual_interaction_type(interaction)?;

        self.interactions
            .update_individual_call_interaction_type(tx, interaction.id, new_interaction_type)?;

        match self.store.fetch_by_interaction_row_id(tx, interaction.id)? {
            Some(mut record) => {
                self.update_record(
                    tx,
                    &mut record,
                    new_interaction_type.individual_call_status(),
                    interaction.timestamp,
                    send_sync_message,
                )?;
            }
            None => {
                tracing::debug!(
                    "Interaction {} has no call record, updated display type only",
                    interaction.id
                );
            }
        }
        Ok(())
    }
}

fn individual_interaction_type(
    interaction: &InteractionRecord,
) -> Result<IndividualCallInteractionType> {
    match (interaction.kind, interaction.call_type) {
        (InteractionKind::IndividualCall, Some(call_type)) => Ok(call_type),
        _ => {
            tracing::error!("Interaction {} is not an individual call", interaction.id);
            Err(Error::Internal(format!(
                "interaction {} is not an individual call",
                interaction.id
            )))
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
    fn test_create_pending_never_syncs() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let interaction = fx.individual_interaction(thread, IndividualCallInteractionType::OutgoingIncomplete, 100);
        let manager = fx.individual_manager();

        let record = fx
            .db
            .write(|tx| manager.create_or_update_record_for_interaction(tx, &interaction, 1, true))
            .unwrap()
            .unwrap();

        assert_eq!(record.call_status, CallStatus::Individual(IndividualCallStatus::Pending));
        assert_eq!(record.call_direction, CallDirection::Outgoing);
        assert_eq!(record.call_type, CallType::AudioCall);
        assert!(fx.sync.sent().is_empty());
    }

    #[test]
    fn test_create_then_update_syncs_on_accepted_transitions_only() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let interaction = fx.individual_interaction(thread, IndividualCallInteractionType::IncomingIncomplete, 100);
        let manager = fx.individual_manager();

        fx.db
            .write(|tx| manager.create_or_update_record_for_interaction(tx, &interaction, 5, true))
            .unwrap();

        fx.db
            .write(|tx| {
                manager.update_interaction_type_and_record_if_exists(
                    tx,
                    &interaction,
                    IndividualCallInteractionType::Incoming,
                    true,
                )
            })
            .unwrap();
        assert_eq!(fx.sync.sent().len(), 1);

        // accepted -> incomingMissed is not allowed
        fx.db
            .write(|tx| {
                manager.update_interaction_type_and_record_if_exists(
                    tx,
                    &interaction,
                    IndividualCallInteractionType::IncomingMissed,
                    true,
                )
            })
            .unwrap();
        assert_eq!(fx.sync.sent().len(), 1);

        let record = fx.record(5, thread).unwrap();
        assert_eq!(record.call_status, CallStatus::Individual(IndividualCallStatus::Accepted));

        // The display type still follows the latest event
        let stored = fx.interaction(interaction.id).unwrap();
        assert_eq!(stored.call_type, Some(IndividualCallInteractionType::IncomingMissed));
    }

    #[test]
    fn test_create_non_trivial_syncs_with_record() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let interaction = fx.individual_interaction(thread, IndividualCallInteractionType::IncomingMissed, 100);

        let record = fx
            .db
            .write(|tx| fx.individual_manager().create_or_update_record_for_interaction(tx, &interaction, 9, true))
            .unwrap()
            .unwrap();

        assert_eq!(
            fx.sync.sent(),
            vec![SentSyncMessage::call_updated(&record, 100)]
        );
    }

    #[test]
    fn test_update_interaction_type_without_record() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        let interaction = fx.individual_interaction(thread, IndividualCallInteractionType::IncomingIncomplete, 100);

        fx.db
            .write(|tx| {
                fx.individual_manager().update_interaction_type_and_record_if_exists(
                    tx,
                    &interaction,
                    IndividualCallInteractionType::IncomingDeclined,
                    true,
                )
            })
            .unwrap();

        assert_eq!(
            fx.interaction(interaction.id).unwrap().call_type,
            Some(IndividualCallInteractionType::IncomingDeclined)
        );
        assert_eq!(fx.record_count(), 0);
        assert!(fx.sync.sent().is_empty());
    }

    #[test]
    fn test_tombstoned_call_is_not_recreated() {
        let fx = Fixture::new();
        let thread = fx.contact_thread();
        fx.db
            .write(|tx| fx.delete_manager().mark_call_as_deleted(tx, 3, thread))
            .unwrap();

        let interaction = fx.individual_interaction(thread, IndividualCallInteractionType::Incoming, 100);
        let result = fx
            .db
            .write(|tx| fx.individual_manager().create_or_update_record_for_interaction(tx, &interaction, 3, true))
            .unwrap();

        assert!(result.is_none());
        assert_eq!(fx.record_count(), 0);
        assert!(fx.sync.sent().is_empty());
    }

    #[test]
    fn test_group_interaction_rejected() {
        let fx = Fixture::new();
        let thread = fx.group_thread();
        let interaction_id = fx.group_interaction(thread, 100);
        let interaction = fx.interaction(interaction_id).unwrap();

        let result = fx
            .db
            .write(|tx| fx.individual_manager().create_or_update_record_for_interaction(tx, &interaction, 3, false));
        assert!(matches!(result, Err(Error::Internal(_))));
    }
}
