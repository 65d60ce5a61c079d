//! # Incoming Call Event Sync Messages
//!
//! A linked device tells us it accepted, declined or deleted a call. We
//! bring our own record in line without echoing anything back.
//!
//! ## Group status mapping
//!
//! ```text
//! ┌──────────────────────┬────────────────────┬────────────────────┬──────────────────────┐
//! │ existing             │ incoming accepted  │ outgoing accepted  │ incoming notAccepted │
//! ├──────────────────────┼────────────────────┼────────────────────┼──────────────────────┤
//! │ (none)               │ joined             │ ringingAccepted    │ ringingDeclined      │
//! │ generic / joined     │ joined             │ ringingAccepted    │ joined → rAccepted   │
//! │                      │                    │                    │ generic → rDeclined  │
//! │ ringing-class        │ ringingAccepted    │ ringingAccepted    │ rAccepted stays,     │
//! │                      │                    │                    │ others rDeclined     │
//! └──────────────────────┴────────────────────┴────────────────────┴──────────────────────┘
//! ```
//!
//! Outgoing accepted always leaves the record outgoing. Outgoing
//! notAccepted cannot happen and is dropped.

use std::sync::Arc;

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calls::delete_manager::CallRecordDeleteManager;
use crate::calls::deleted_store::DeletedCallRecordStore;
use crate::calls::group::GroupCallRecordManager;
use crate::calls::individual::IndividualCallRecordManager;
use crate::calls::record::{
    CallDirection, CallRecord, CallStatus, CallType, GroupCallStatus, IndividualCallStatus,
};
use crate::calls::store::CallRecordStore;
use crate::error::{Error, Result};
use crate::storage::{CallOfferType, IndividualCallInteractionType, InteractionStore, ThreadStore};

/// The conversation a synced call happened in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncConversation {
    /// A one-to-one call
    #[serde(rename_all = "camelCase")]
    Individual {
        /// The other party
        service_id: Uuid,
        /// Whether the call was a video call
        is_video: bool,
    },
    /// A group call
    #[serde(rename_all = "camelCase")]
    Group {
        /// Group identifier bytes
        group_id: Vec<u8>,
    },
}

/// What a linked device did with a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomingCallEvent {
    /// Joined or answered
    Accepted,
    /// Declined
    NotAccepted,
    /// Deleted from the call log
    Deleted,
}

/// Parsed call event sync message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallEventSyncMessageParams {
    /// Where the call happened
    pub conversation: SyncConversation,
    /// Call identifier
    pub call_id: u64,
    /// When the call happened on the linked device (Unix timestamp ms)
    pub call_timestamp: i64,
    /// What happened
    pub call_event: IncomingCallEvent,
    /// Who started the call
    pub call_direction: CallDirection,
}

impl IncomingCallEventSyncMessageParams {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Applies call event sync messages from linked devices
#[derive(Clone)]
pub struct IncomingCallEventSyncMessageManager {
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    threads: Arc<dyn ThreadStore>,
    interactions: Arc<dyn InteractionStore>,
    individual_manager: IndividualCallRecordManager,
    group_manager: GroupCallRecordManager,
    delete_manager: CallRecordDeleteManager,
}

impl IncomingCallEventSyncMessageManager {
    /// Create a new manager
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        interactions: Arc<dyn InteractionStore>,
        individual_manager: IndividualCallRecordManager,
        group_manager: GroupCallRecordManager,
        delete_manager: CallRecordDeleteManager,
    ) -> Self {
        Self {
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            threads,
            interactions,
            individual_manager,
            group_manager,
            delete_manager,
        }
    }

    /// Apply `params`, received in a sync message sent at
    /// `sync_message_timestamp`.
    ///
    /// Unknown conversations, deleted calls and impossible event
    /// combinations are logged and ignored.
    pub fn create_or_update_record_for_incoming_sync_message(
        &self,
        tx: &Transaction<'_>,
        params: &IncomingCallEventSyncMessageParams,
        sync_message_timestamp: i64,
    ) -> Result<()> {
        let call_id = params.call_id;
        let direction = params.call_direction;

        let thread_row_id = match &params.conversation {
            SyncConversation::Individual { service_id, .. } => {
                self.threads.fetch_contact_thread(tx, service_id)?.map(|t| t.id)
            }
            SyncConversation::Group { group_id } => {
                self.threads.fetch_group_thread(tx, group_id)?.map(|t| t.id)
            }
        };
        let Some(thread_row_id) = thread_row_id else {
            tracing::error!(
                "Missing thread for call event sync message, call {} ({:?}, {:?})",
                call_id,
                direction,
                params.call_event
            );
            return Ok(());
        };

        if self.deleted_store.contains(tx, call_id, thread_row_id)? {
            tracing::warn!(
                "Ignoring {:?} sync message for deleted call {} in thread {}",
                params.call_event,
                call_id,
                thread_row_id
            );
            return Ok(());
        }

        let existing = self.store.fetch(tx, call_id, thread_row_id)?;

        let accepted = match params.call_event {
            IncomingCallEvent::Deleted => {
                return self.delete_for_sync_message(tx, call_id, thread_row_id, existing);
            }
            IncomingCallEvent::Accepted => true,
            IncomingCallEvent::NotAccepted => false,
        };

        if direction == CallDirection::Outgoing
            && !accepted
            && matches!(params.conversation, SyncConversation::Group { .. })
        {
            tracing::error!(
                "Ignoring notAccepted sync message for our own outgoing group call {}",
                call_id
            );
            return Ok(());
        }

        let interaction_row_id = match &params.conversation {
            SyncConversation::Individual { is_video, .. } => self.apply_individual(
                tx,
                params,
                thread_row_id,
                existing,
                accepted,
                *is_video,
            )?,
            SyncConversation::Group { .. } => {
                self.apply_group(tx, params, thread_row_id, existing, accepted)?
            }
        };

        if let Some(interaction_row_id) = interaction_row_id {
            let marked = self
                .interactions
                .mark_call_interactions_read_for_incoming_sync_message(tx, interaction_row_id)?;
            tracing::debug!(
                "Marked {} call interactions read at sync timestamp {}",
                marked,
                sync_message_timestamp
            );
        }
        Ok(())
    }

    fn delete_for_sync_message(
        &self,
        tx: &Transaction<'_>,
        call_id: u64,
        thread_row_id: i64,
        existing: Option<CallRecord>,
    ) -> Result<()> {
        match existing {
            Some(record) => {
                tracing::info!(
                    "Deleting call {} in thread {} for sync message",
                    call_id,
                    thread_row_id
                );
                self.delete_manager.delete_call_record(tx, &record, false)?;
                self.interactions
                    .delete_interaction(tx, record.interaction_row_id)
            }
            None => self
                .delete_manager
                .mark_call_as_deleted(tx, call_id, thread_row_id),
        }
    }

    /// Returns the interaction to mark read, if the message was applied
    fn apply_individual(
        &self,
        tx: &Transaction<'_>,
        params: &IncomingCallEventSyncMessageParams,
        thread_row_id: i64,
        existing: Option<CallRecord>,
        accepted: bool,
        is_video: bool,
    ) -> Result<Option<i64>> {
        let (status, interaction_type) = match (params.call_direction, accepted) {
            (CallDirection::Incoming, true) => (
                IndividualCallStatus::Accepted,
                IndividualCallInteractionType::IncomingAnsweredElsewhere,
            ),
            (CallDirection::Incoming, false) => (
                IndividualCallStatus::NotAccepted,
                IndividualCallInteractionType::IncomingDeclinedElsewhere,
            ),
            (CallDirection::Outgoing, true) => (
                IndividualCallStatus::Accepted,
                IndividualCallInteractionType::Outgoing,
            ),
            (CallDirection::Outgoing, false) => (
                IndividualCallStatus::NotAccepted,
                IndividualCallInteractionType::OutgoingMissed,
            ),
        };

        match existing {
            Some(mut record) => {
                if !matches!(record.call_status, CallStatus::Individual(_)) {
                    tracing::error!(
                        "Call {} in contact thread {} has a group status",
                        record.call_id,
                        thread_row_id
                    );
                    return Ok(None);
                }
                tracing::info!("Updating call {} for individual call sync message", record.call_id);
                self.interactions.update_individual_call_interaction_type(
                    tx,
                    record.interaction_row_id,
                    interaction_type,
                )?;
                self.individual_manager.update_record(
                    tx,
                    &mut record,
                    status,
                    params.call_timestamp,
                    false,
                )?;
                Ok(Some(record.interaction_row_id))
            }
            None => {
                tracing::info!("Creating call {} for individual call sync message", params.call_id);
                let call_type = if is_video {
                    CallType::VideoCall
                } else {
                    CallType::AudioCall
                };
                let offer_type = if is_video {
                    CallOfferType::Video
                } else {
                    CallOfferType::Audio
                };
                let interaction = self.interactions.insert_individual_call_interaction(
                    tx,
                    thread_row_id,
                    interaction_type,
                    offer_type,
                    params.call_timestamp,
                )?;
                self.individual_manager.create_record_for_interaction(
                    tx,
                    &interaction,
                    params.call_id,
                    call_type,
                    params.call_direction,
                    status,
                    interaction.timestamp,
                    false,
                )?;
                Ok(Some(interaction.id))
            }
        }
    }

    /// Returns the interaction to mark read, if the message was applied
    fn apply_group(
        &self,
        tx: &Transaction<'_>,
        params: &IncomingCallEventSyncMessageParams,
        thread_row_id: i64,
        existing: Option<CallRecord>,
        accepted: bool,
    ) -> Result<Option<i64>> {
        match existing {
            Some(mut record) => {
                let CallStatus::Group(existing_status) = record.call_status else {
                    tracing::error!(
                        "Call {} in group thread {} has an individual status",
                        record.call_id,
                        thread_row_id
                    );
                    return Ok(None);
                };

                if params.call_direction == CallDirection::Outgoing
                    && record.call_direction == CallDirection::Outgoing
                    && existing_status == GroupCallStatus::RingingAccepted
                {
                    tracing::warn!(
                        "Ignoring duplicate outgoing sync message for call {}",
                        record.call_id
                    );
                    return Ok(None);
                }

                let (direction, status) =
                    group_status_for_existing(existing_status, record.call_direction, params.call_direction, accepted);

                tracing::info!(
                    "Updating call {} for group call sync message: {:?} -> {:?}",
                    record.call_id,
                    existing_status,
                    status
                );
                self.group_manager.update_group_call_record(
                    tx,
                    &mut record,
                    direction,
                    status,
                    None,
                    params.call_timestamp,
                    false,
                )?;
                Ok(Some(record.interaction_row_id))
            }
            None => {
                let status = match (params.call_direction, accepted) {
                    (CallDirection::Outgoing, _) => GroupCallStatus::RingingAccepted,
                    (CallDirection::Incoming, true) => GroupCallStatus::Joined,
                    (CallDirection::Incoming, false) => GroupCallStatus::RingingDeclined,
                };

                tracing::info!("Creating call {} for group call sync message", params.call_id);
                let interaction = self.interactions.insert_group_call_interaction(
                    tx,
                    thread_row_id,
                    params.call_timestamp,
                )?;
                self.group_manager.create_group_call_record(
                    tx,
                    params.call_id,
                    &interaction,
                    params.call_direction,
                    status,
                    None,
                    params.call_timestamp,
                    false,
                )?;
                Ok(Some(interaction.id))
            }
        }
    }
}

/// Direction and status an existing group record moves to.
///
/// Only called with accepted events or incoming notAccepted.
fn group_status_for_existing(
    existing: GroupCallStatus,
    existing_direction: CallDirection,
    event_direction: CallDirection,
    accepted: bool,
) -> (CallDirection, GroupCallStatus) {
    use GroupCallStatus::*;

    match (event_direction, accepted) {
        (CallDirection::Outgoing, _) => (CallDirection::Outgoing, RingingAccepted),
        (CallDirection::Incoming, true) => match existing {
            Generic | Joined => (existing_direction, Joined),
            Ringing | RingingAccepted | RingingDeclined | RingingMissed => {
                (existing_direction, RingingAccepted)
            }
        },
        (CallDirection::Incoming, false) => match existing {
            Joined | RingingAccepted => (existing_direction, RingingAccepted),
            Generic | Ringing | RingingMissed | RingingDeclined => {
                (existing_direction, RingingDeclined)
            }
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
