//! # Group Ring Updates
//!
//! Maps group ring signaling onto group call statuses.
//!
//! ```text
//! ┌─────────────────┬────────────┬───────────────────┬────────────────┬─────────────────┬─────────────────┐
//! │ existing        │ Requested  │ ExpiredRing /     │ BusyOnAnother  │ AcceptedOn      │ DeclinedOn      │
//! │                 │            │ CancelledByRinger │ Device         │ AnotherDevice   │ AnotherDevice   │
//! │                 │            │ / BusyLocally     │                │                 │                 │
//! ├─────────────────┼────────────┼───────────────────┼────────────────┼─────────────────┼─────────────────┤
//! │ (none)/generic  │ ringing  R │ ringingMissed  R  │ ringingMissed  │ ringingAccepted │ ringingDeclined │
//! │ ringing         │ -          │ ringingMissed  R  │ ringingMissed  │ ringingAccepted │ ringingDeclined │
//! │ joined          │ rAccepted R│ ringingAccepted R │ rAccepted      │ ringingAccepted │ ringingAccepted │
//! │ ringingMissed   │ -          │ -                 │ -              │ ringingAccepted │ ringingDeclined │
//! │ ringingDeclined │ -          │ -                 │ -              │ ringingAccepted │ -               │
//! │ ringingAccepted │ -          │ -                 │ -              │ -               │ -               │
//! └─────────────────┴────────────┴───────────────────┴────────────────┴─────────────────┴─────────────────┘
//!   R = ringer recorded
//! ```
//!
//! Outgoing calls are never reclassified by ring updates.

use std::sync::Arc;

use rusqlite::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::deleted_store::DeletedCallRecordStore;
use super::group::GroupCallRecordManager;
use super::record::{CallDirection, CallStatus, GroupCallStatus};
use super::store::CallRecordStore;
use crate::error::Result;
use crate::storage::ThreadStore;

/// Ring signaling event for a group call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RingUpdate {
    /// Someone is ringing us
    Requested,
    /// The ring timed out
    ExpiredRing,
    /// The ringer hung up before anyone answered
    CancelledByRinger,
    /// We were already in a call on this device
    BusyLocally,
    /// A linked device was already in a call
    BusyOnAnotherDevice,
    /// A linked device answered
    AcceptedOnAnotherDevice,
    /// A linked device declined
    DeclinedOnAnotherDevice,
}

impl RingUpdate {
    /// Whether this event identifies the ringer
    fn records_ringer(&self) -> bool {
        matches!(
            self,
            RingUpdate::Requested
                | RingUpdate::ExpiredRing
                | RingUpdate::CancelledByRinger
                | RingUpdate::BusyLocally
        )
    }
}

/// Status a ring update moves a call to, given its current status.
///
/// `None` for the current status means no record exists yet. Returns `None`
/// when the update should leave the record alone.
pub fn status_for_ring_update(
    existing: Option<GroupCallStatus>,
    update: RingUpdate,
) -> Option<GroupCallStatus> {
    use GroupCallStatus::*;
    use RingUpdate::*;

    match (existing, update) {
        (None | Some(Generic), Requested) => Some(Ringing),
        (None | Some(Generic) | Some(Ringing), _) => Some(match update {
            Requested => return None,
            ExpiredRing | CancelledByRinger | BusyLocally | BusyOnAnotherDevice => RingingMissed,
            AcceptedOnAnotherDevice => RingingAccepted,
            DeclinedOnAnotherDevice => RingingDeclined,
        }),
        (Some(Joined), _) => Some(RingingAccepted),
        (Some(RingingMissed), AcceptedOnAnotherDevice) => Some(RingingAccepted),
        (Some(RingingMissed), DeclinedOnAnotherDevice) => Some(RingingDeclined),
        (Some(RingingDeclined), AcceptedOnAnotherDevice) => Some(RingingAccepted),
        (Some(RingingMissed | RingingDeclined | RingingAccepted), _) => None,
    }
}

/// Applies group ring updates to call records
#[derive(Clone)]
pub struct GroupCallRecordRingUpdateHandler {
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    threads: Arc<dyn ThreadStore>,
    group_manager: GroupCallRecordManager,
}

impl GroupCallRecordRingUpdateHandler {
    /// Create a new handler
    pub fn new(threads: Arc<dyn ThreadStore>, group_manager: GroupCallRecordManager) -> Self {
        Self {
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            threads,
            group_manager,
        }
    }

    /// Call id for a ring id. Ring ids are signed on the wire; the call id
    /// keeps the same bits.
    pub fn call_id_for_ring_id(ring_id: i64) -> u64 {
        ring_id as u64
    }

    /// Apply `ring_update` for ring `ring_id` in group `group_id`, rung by
    /// `ring_update_sender`.
    pub fn did_receive_ring_update(
        &self,
        tx: &Transaction<'_>,
        group_id: &[u8],
        ring_id: i64,
        ring_update: RingUpdate,
        ring_update_sender: Uuid,
    ) -> Result<()> {
        let Some(thread) = self.threads.fetch_group_thread(tx, group_id)? else {
            tracing::warn!(
                "Ignoring ring update {:?} for unknown group {}",
                ring_update,
                hex::encode(group_id)
            );
            return Ok(());
        };

        let call_id = Self::call_id_for_ring_id(ring_id);
        if self.deleted_store.contains(tx, call_id, thread.id)? {
            tracing::warn!(
                "Ignoring ring update {:?} for deleted call {} in thread {}",
                ring_update,
                call_id,
                thread.id
            );
            return Ok(());
        }

        let ringer = if ring_update.records_ringer() {
            Some(ring_update_sender)
        } else {
            None
        };
        let now = crate::time::now_timestamp_millis();

        match self.store.fetch(tx, call_id, thread.id)? {
            Some(mut record) => {
                if record.call_direction == CallDirection::Outgoing {
                    tracing::info!(
                        "Ignoring ring update {:?} for outgoing call {}",
                        ring_update,
                        call_id
                    );
                    return Ok(());
                }

                let CallStatus::Group(existing) = record.call_status else {
                    tracing::error!(
                        "Call {} in group thread {} has an individual status",
                        call_id,
                        thread.id
                    );
                    return Ok(());
                };

                let Some(new_status) = status_for_ring_update(Some(existing), ring_update) else {
                    tracing::debug!(
                        "Ring update {:?} leaves call {} at {:?}",
                        ring_update,
                        call_id,
                        existing
                    );
                    return Ok(());
                };

                let direction = record.call_direction;
                self.group_manager.update_group_call_record(
                    tx,
                    &mut record,
                    direction,
                    new_status,
                    ringer,
                    now,
                    false,
                )?;
            }
            None => {
                let Some(status) = status_for_ring_update(None, ring_update) else {
                    return Ok(());
                };

                tracing::info!(
                    "Creating call {} in group {} from ring update {:?}",
                    call_id,
                    hex::encode(group_id),
                    ring_update
                );
                self.group_manager.create_or_update_call_record(
                    tx,
                    call_id,
                    thread.id,
                    CallDirection::Incoming,
                    status,
                    ringer,
                    now,
                    false,
                )?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
