//! # Cross-Device Sync
//!
//! ```text
//! ┌──────────────────────┐   CallEvent / CallLogEvent   ┌──────────────────────┐
//! │  Engine (this device)│ ────────────────────────────▶│   SyncMessageSender  │
//! └──────────────────────┘                               └──────────────────────┘
//!            ▲
//!            │  IncomingCallEventSyncMessageParams
//!            │  IncomingCallLogEventSyncMessageParams
//! ┌──────────────────────┐
//! │    Linked devices    │
//! └──────────────────────┘
//! ```
//!
//! Inbound handlers never send anything back.

mod incoming_call_event;
mod incoming_call_log_event;
mod outgoing;

pub use incoming_call_event::{
    IncomingCallEvent, IncomingCallEventSyncMessageManager, IncomingCallEventSyncMessageParams,
    SyncConversation,
};
pub use incoming_call_log_event::{
    CallIdentifiers, IncomingCallLogEventSyncMessageManager, IncomingCallLogEventSyncMessageParams,
    IncomingCallLogEventType,
};
pub use outgoing::{CallLogAnchor, CallLogEventType, OutgoingCallEvent, SyncMessageSender};
