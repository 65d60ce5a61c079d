//! # Outgoing Sync Messages
//!
//! The engine decides *whether* a linked device needs to hear about a local
//! change; the [`SyncMessageSender`] collaborator decides how to get it
//! there. Senders are invoked inside the caller's transaction so an
//! implementation can enqueue into an outbox table atomically with the
//! change it describes.

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

use crate::calls::record::CallRecord;
use crate::error::Result;

/// What happened to a single call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutgoingCallEvent {
    /// The record was created or its status changed
    CallUpdated,
    /// The record was deleted
    CallDeleted,
}

/// Bulk call log operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallLogEventType {
    /// Every call at or before the anchor was deleted
    Cleared,
    /// Every call at or before the anchor was marked read
    MarkedAsRead,
    /// Every call at or before the anchor, in the anchor's conversation,
    /// was marked read
    MarkedAsReadInConversation,
}

/// The call a bulk operation is anchored at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogAnchor {
    /// Call id of the anchor call
    pub call_id: u64,
    /// Conversation of the anchor call
    pub thread_row_id: i64,
    /// Began timestamp of the anchor call (Unix timestamp ms)
    pub timestamp: i64,
}

impl CallLogAnchor {
    /// Anchor at `record`
    pub fn for_record(record: &CallRecord) -> Self {
        Self {
            call_id: record.call_id,
            thread_row_id: record.thread_row_id,
            timestamp: record.call_began_timestamp,
        }
    }
}

/// Sends call sync messages to this account's linked devices
pub trait SyncMessageSender: Send + Sync {
    /// A single call changed
    fn send_call_event(
        &self,
        tx: &Transaction<'_>,
        record: &CallRecord,
        event: OutgoingCallEvent,
        event_timestamp: i64,
    ) -> Result<()>;

    /// A bulk operation ran over the call log
    fn send_call_log_event(
        &self,
        tx: &Transaction<'_>,
        event: CallLogEventType,
        anchor: CallLogAnchor,
    ) -> Result<()>;
}
