//! # Missed Calls
//!
//! Unread counts and mark-as-read for missed calls. Marking a call read
//! clears its unread flag only; the call status is left alone.

use std::sync::Arc;

use rusqlite::{Connection, Transaction};

use super::querier::{CallRecordQuerier, FetchOrdering};
use super::record::CallRecord;
use super::store::CallRecordStore;
use super::sync::{CallLogAnchor, CallLogEventType, SyncMessageSender};
use crate::error::Result;

/// Unread counts and mark-as-read for missed calls
#[derive(Clone)]
pub struct CallRecordMissedCallManager {
    store: CallRecordStore,
    querier: CallRecordQuerier,
    sync: Arc<dyn SyncMessageSender>,
}

impl CallRecordMissedCallManager {
    /// Create a new manager
    pub fn new(sync: Arc<dyn SyncMessageSender>) -> Self {
        Self {
            store: CallRecordStore::new(),
            querier: CallRecordQuerier::new(),
            sync,
        }
    }

    /// Number of unread missed calls
    pub fn count_unread_missed_calls(&self, conn: &Connection) -> Result<u64> {
        self.store.count_unread(conn)
    }

    /// Mark every unread call at or before `before_timestamp` as read, or
    /// every unread call if no cutoff is given.
    ///
    /// If anything changed and `send_sync_message` is set, one
    /// `MarkedAsRead` event goes out, anchored at the newest call at or
    /// before the cutoff whether or not that call was unread. Returns how
    /// many calls changed.
    pub fn mark_unread_calls_as_read(
        &self,
        tx: &Transaction<'_>,
        before_timestamp: Option<i64>,
        send_sync_message: bool,
    ) -> Result<usize> {
        let ordering = inclusive_ordering(before_timestamp);
        let changed = self.mark_unread_as_read(tx, ordering, None)?;

        if changed > 0 && send_sync_message {
            let anchor = self
                .querier
                .fetch_cursor(tx, ordering, None, None)
                .next()
                .transpose()?;

            match anchor {
                Some(anchor) => self.sync.send_call_log_event(
                    tx,
                    CallLogEventType::MarkedAsRead,
                    CallLogAnchor::for_record(&anchor),
                )?,
                None => tracing::error!("Marked calls read but found no anchor call"),
            }
        }
        Ok(changed)
    }

    /// Mark every unread call in `before_call_record`'s conversation at or
    /// before it as read.
    ///
    /// The sync message, if any, is anchored at `before_call_record`.
    pub fn mark_unread_calls_in_conversation_as_read(
        &self,
        tx: &Transaction<'_>,
        before_call_record: &CallRecord,
        send_sync_message: bool,
    ) -> Result<usize> {
        let ordering = inclusive_ordering(Some(before_call_record.call_began_timestamp));
        let changed =
            self.mark_unread_as_read(tx, ordering, Some(before_call_record.thread_row_id))?;

        if changed > 0 && send_sync_message {
            self.sync.send_call_log_event(
                tx,
                CallLogEventType::MarkedAsReadInConversation,
                CallLogAnchor::for_record(before_call_record),
            )?;
        }
        Ok(changed)
    }

    fn mark_unread_as_read(
        &self,
        tx: &Transaction<'_>,
        ordering: FetchOrdering,
        thread_row_id: Option<i64>,
    ) -> Result<usize> {
        let unread = self
            .querier
            .fetch_unread_cursor(tx, ordering, thread_row_id)
            .collect::<Result<Vec<_>>>()?;

        for mut record in unread.iter().cloned() {
            self.store.mark_as_read(tx, &mut record)?;
        }

        if !unread.is_empty() {
            tracing::info!("Marked {} missed calls as read", unread.len());
        }
        Ok(unread.len())
    }
}

/// Newest-first ordering covering everything at or before `timestamp`
fn inclusive_ordering(timestamp: Option<i64>) -> FetchOrdering {
    match timestamp {
        Some(timestamp) => FetchOrdering::DescendingBefore(timestamp.saturating_add(1)),
        None => FetchOrdering::Descending,
    }
}

// ============================================================================
// TESTS
// ============================================================================
