//! # Incoming Call Log Event Sync Messages
//!
//! Bulk operations a linked device ran over its call log. The cutoff is the
//! anchor call's began timestamp when we know that call, and the timestamp
//! carried in the message otherwise.

use std::sync::Arc;

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use super::incoming_call_event::SyncConversation;
use crate::calls::delete_manager::CallRecordDeleteManager;
use crate::calls::missed::CallRecordMissedCallManager;
use crate::calls::record::CallRecord;
use crate::calls::store::CallRecordStore;
use crate::error::{Error, Result};
use crate::storage::ThreadStore;

/// Bulk operation run on a linked device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncomingCallLogEventType {
    /// Calls were deleted
    Cleared,
    /// Calls were marked read
    MarkedAsRead,
    /// Calls in one conversation were marked read
    MarkedAsReadInConversation,
}

/// Identifies the anchor call of a call log event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallIdentifiers {
    /// Call identifier
    pub call_id: u64,
    /// Conversation the call happened in
    pub conversation: SyncConversation,
}

/// Parsed call log event sync message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallLogEventSyncMessageParams {
    /// What happened
    pub event_type: IncomingCallLogEventType,
    /// The anchor call, if the linked device sent one
    #[serde(default)]
    pub anchor_call_identifiers: Option<CallIdentifiers>,
    /// Cutoff to use when the anchor call is not known here (Unix timestamp ms)
    pub anchor_timestamp: i64,
}

impl IncomingCallLogEventSyncMessageParams {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::SerializationError(e.to_string()))
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }
}

/// Applies call log event sync messages from linked devices
#[derive(Clone)]
pub struct IncomingCallLogEventSyncMessageManager {
    store: CallRecordStore,
    threads: Arc<dyn ThreadStore>,
    delete_manager: CallRecordDeleteManager,
    missed_call_manager: CallRecordMissedCallManager,
}

impl IncomingCallLogEventSyncMessageManager {
    /// Create a new manager
    pub fn new(
        threads: Arc<dyn ThreadStore>,
        delete_manager: CallRecordDeleteManager,
        missed_call_manager: CallRecordMissedCallManager,
    ) -> Self {
        Self {
            store: CallRecordStore::new(),
            threads,
            delete_manager,
            missed_call_manager,
        }
    }

    /// Apply `params`. Nothing is sent back to linked devices.
    pub fn handle_incoming_sync_message(
        &self,
        tx: &Transaction<'_>,
        params: &IncomingCallLogEventSyncMessageParams,
    ) -> Result<()> {
        let anchor = match &params.anchor_call_identifiers {
            Some(identifiers) => self.fetch_anchor(tx, identifiers)?,
            None => None,
        };
        let cutoff = anchor
            .as_ref()
            .map_or(params.anchor_timestamp, |r| r.call_began_timestamp);

        match params.event_type {
            IncomingCallLogEventType::Cleared => {
                let deleted = self
                    .delete_manager
                    .delete_all_call_records_before(tx, cutoff, false)?;
                tracing::info!("Cleared {} calls at or before {} for sync message", deleted, cutoff);
            }
            IncomingCallLogEventType::MarkedAsRead => {
                let marked = self
                    .missed_call_manager
                    .mark_unread_calls_as_read(tx, Some(cutoff), false)?;
                tracing::info!("Marked {} calls read at or before {} for sync message", marked, cutoff);
            }
            IncomingCallLogEventType::MarkedAsReadInConversation => {
                let Some(anchor) = anchor else {
                    tracing::warn!("Ignoring conversation mark-as-read without a known anchor call");
                    return Ok(());
                };
                let marked = self
                    .missed_call_manager
                    .mark_unread_calls_in_conversation_as_read(tx, &anchor, false)?;
                tracing::info!(
                    "Marked {} calls read in thread {} for sync message",
                    marked,
                    anchor.thread_row_id
                );
            }
        }
        Ok(())
    }

    fn fetch_anchor(
        &self,
        tx: &Transaction<'_>,
        identifiers: &CallIdentifiers,
    ) -> Result<Option<CallRecord>> {
        let thread = match &identifiers.conversation {
            SyncConversation::Individual { service_id, .. } => {
                self.threads.fetch_contact_thread(tx, service_id)?
            }
            SyncConversation::Group { group_id } => self.threads.fetch_group_thread(tx, group_id)?,
        };
        let Some(thread) = thread else {
            tracing::debug!("Anchor call {} is in an unknown thread", identifiers.call_id);
            return Ok(None);
        };
        self.store.fetch(tx, identifiers.call_id, thread.id)
    }
}

// ============================================================================
// TESTS
// ============================================================================
