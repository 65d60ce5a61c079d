//! # Calls Module
//!
//! The call history: one record per call, a status state machine per call
//! class, tombstones for deleted calls, and cross-device sync.
//!
//! ## Components
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CALL RECORD ENGINE                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Inbound                                                                │
//! │  ───────                                                                │
//! │  GroupCallRecordRingUpdateHandler      ring signaling                   │
//! │  IncomingCallEventSyncMessageManager   linked device call events        │
//! │  IncomingCallLogEventSyncMessageManager linked device bulk events       │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  Orchestration                                                          │
//! │  ─────────────                                                          │
//! │  IndividualCallRecordManager   GroupCallRecordManager                   │
//! │  CallRecordDeleteManager       CallRecordMissedCallManager              │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  Storage                                                                │
//! │  ───────                                                                │
//! │  CallRecordStore  DeletedCallRecordStore  CallRecordQuerier             │
//! │  (transition rules enforced on every status write)                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//!
//! - At most one record per `(call_id, thread_row_id)`.
//! - A tombstoned `(call_id, thread_row_id)` never gets a record again
//!   until the tombstone expires.
//! - Status only moves along allowed transitions; anything else is
//!   dropped without a sync message.
//! - Individual statuses only on audio/video calls, group statuses only
//!   on group calls.

mod cleanup;
mod delete_manager;
mod deleted_store;
mod group;
mod individual;
mod missed;
mod querier;
pub(crate) mod record;
mod ring_update;
mod store;
pub mod sync;
mod transition;

pub use cleanup::{
    CleanupRequest, CleanupScheduler, DeletedCallRecordCleanupManager,
    DEFAULT_TOMBSTONE_RETENTION_MS,
};
pub use delete_manager::CallRecordDeleteManager;
pub use deleted_store::DeletedCallRecordStore;
pub use group::GroupCallRecordManager;
pub use individual::IndividualCallRecordManager;
pub use missed::CallRecordMissedCallManager;
pub use querier::{CallRecordCursor, CallRecordQuerier, FetchOrdering};
pub use record::{
    CallDirection, CallRecord, CallStatus, CallType, CallUnreadStatus, DeletedCallRecord,
    GroupCallStatus, IndividualCallStatus,
};
pub use ring_update::{status_for_ring_update, GroupCallRecordRingUpdateHandler, RingUpdate};
pub use store::CallRecordStore;
pub use sync::{
    CallIdentifiers, CallLogAnchor, CallLogEventType, IncomingCallEvent,
    IncomingCallEventSyncMessageManager, IncomingCallEventSyncMessageParams,
    IncomingCallLogEventSyncMessageManager, IncomingCallLogEventSyncMessageParams,
    IncomingCallLogEventType, OutgoingCallEvent, SyncConversation, SyncMessageSender,
};
pub use transition::{
    is_group_transition_allowed, is_individual_transition_allowed, is_transition_allowed,
};
