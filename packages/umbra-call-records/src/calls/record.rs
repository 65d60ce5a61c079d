//! # Call Record Types
//!
//! The call record row and the enums stored in it.
//!
//! Raw values are persisted and shared with linked devices, so they never
//! change. Individual and group status raw values live in disjoint ranges
//! so a stored status alone identifies its call class.

use rusqlite::types::Type;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// CALL TYPE / DIRECTION
// ============================================================================

/// Kind of call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    /// One-to-one audio call
    AudioCall,
    /// One-to-one video call
    VideoCall,
    /// Group call
    GroupCall,
}

impl CallType {
    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            CallType::AudioCall => 0,
            CallType::VideoCall => 1,
            CallType::GroupCall => 2,
        }
    }

    /// Parse a raw database value
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(CallType::AudioCall),
            1 => Some(CallType::VideoCall),
            2 => Some(CallType::GroupCall),
            _ => None,
        }
    }

    /// Whether this is a group call
    pub fn is_group(&self) -> bool {
        matches!(self, CallType::GroupCall)
    }
}

/// Who placed the call, from this account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallDirection {
    /// Someone else called us
    Incoming,
    /// We called someone
    Outgoing,
}

impl CallDirection {
    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            CallDirection::Incoming => 0,
            CallDirection::Outgoing => 1,
        }
    }

    /// Parse a raw database value
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(CallDirection::Incoming),
            1 => Some(CallDirection::Outgoing),
            _ => None,
        }
    }
}

// ============================================================================
// CALL STATUS
// ============================================================================

/// Status of a one-to-one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndividualCallStatus {
    /// Ringing, not yet resolved
    Pending,
    /// Connected
    Accepted,
    /// Declined, or an outgoing call nobody picked up
    NotAccepted,
    /// Incoming call that rang out
    IncomingMissed,
}

impl IndividualCallStatus {
    /// Every individual status
    pub const ALL: [IndividualCallStatus; 4] = [
        IndividualCallStatus::Pending,
        IndividualCallStatus::Accepted,
        IndividualCallStatus::NotAccepted,
        IndividualCallStatus::IncomingMissed,
    ];

    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            IndividualCallStatus::Pending => 0,
            IndividualCallStatus::Accepted => 1,
            IndividualCallStatus::NotAccepted => 2,
            IndividualCallStatus::IncomingMissed => 3,
        }
    }
}

/// Status of a group call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupCallStatus {
    /// We know a call happened but were not rung for it
    Generic,
    /// We joined without being rung
    Joined,
    /// We are being rung
    Ringing,
    /// We were rung and joined
    RingingAccepted,
    /// We were rung and declined
    RingingDeclined,
    /// We were rung and never answered
    RingingMissed,
}

impl GroupCallStatus {
    /// Every group status
    pub const ALL: [GroupCallStatus; 6] = [
        GroupCallStatus::Generic,
        GroupCallStatus::Joined,
        GroupCallStatus::Ringing,
        GroupCallStatus::RingingAccepted,
        GroupCallStatus::RingingDeclined,
        GroupCallStatus::RingingMissed,
    ];

    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            GroupCallStatus::Generic => 4,
            GroupCallStatus::Joined => 5,
            GroupCallStatus::Ringing => 6,
            GroupCallStatus::RingingAccepted => 7,
            GroupCallStatus::RingingDeclined => 8,
            GroupCallStatus::RingingMissed => 9,
        }
    }
}

/// Status of a call, tagged by call class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallStatus {
    /// One-to-one call status
    Individual(IndividualCallStatus),
    /// Group call status
    Group(GroupCallStatus),
}

impl CallStatus {
    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            CallStatus::Individual(status) => status.raw_value(),
            CallStatus::Group(status) => status.raw_value(),
        }
    }

    /// Parse a raw database value
    pub fn from_raw(raw: i64) -> Option<Self> {
        IndividualCallStatus::ALL
            .iter()
            .find(|s| s.raw_value() == raw)
            .map(|s| CallStatus::Individual(*s))
            .or_else(|| {
                GroupCallStatus::ALL
                    .iter()
                    .find(|s| s.raw_value() == raw)
                    .map(|s| CallStatus::Group(*s))
            })
    }

    /// Whether this status variant belongs to `call_type`'s call class
    pub fn matches(&self, call_type: CallType) -> bool {
        match self {
            CallStatus::Individual(_) => !call_type.is_group(),
            CallStatus::Group(_) => call_type.is_group(),
        }
    }

    /// Unread status implied by this call status
    pub fn unread_status(&self) -> CallUnreadStatus {
        match self {
            CallStatus::Individual(IndividualCallStatus::IncomingMissed)
            | CallStatus::Group(GroupCallStatus::RingingMissed) => CallUnreadStatus::Unread,
            _ => CallUnreadStatus::Read,
        }
    }
}

/// Whether a missed call has been seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallUnreadStatus {
    /// Seen, or never needed attention
    Read,
    /// Missed and not yet seen
    Unread,
}

impl CallUnreadStatus {
    /// Raw value stored in the database
    pub fn raw_value(&self) -> i64 {
        match self {
            CallUnreadStatus::Read => 0,
            CallUnreadStatus::Unread => 1,
        }
    }

    /// Parse a raw database value
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(CallUnreadStatus::Read),
            1 => Some(CallUnreadStatus::Unread),
            _ => None,
        }
    }
}

// ============================================================================
// CALL RECORD
// ============================================================================

/// One call visible to this account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRecord {
    /// Row id, set once the record has been inserted
    pub id: Option<i64>,
    /// Call id assigned by the calling protocol
    pub call_id: u64,
    /// The chat-timeline entry for this call
    pub interaction_row_id: i64,
    /// Owning conversation
    pub thread_row_id: i64,
    /// Audio, video or group
    pub call_type: CallType,
    /// Incoming or outgoing
    pub call_direction: CallDirection,
    /// Current status; always matches `call_type`'s call class
    pub call_status: CallStatus,
    /// Derived from `call_status`, then cleared by mark-as-read
    pub unread_status: CallUnreadStatus,
    /// Earliest timestamp seen for this call (Unix timestamp ms)
    pub call_began_timestamp: i64,
    /// Who rang the group, if we were rung
    pub group_call_ringer_aci: Option<Uuid>,
}

impl CallRecord {
    /// Build a new, not yet inserted record.
    ///
    /// Fails with [`Error::CallStatusMismatch`] if `call_status` is not a
    /// status of `call_type`'s call class.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        call_id: u64,
        interaction_row_id: i64,
        thread_row_id: i64,
        call_type: CallType,
        call_direction: CallDirection,
        call_status: CallStatus,
        group_call_ringer_aci: Option<Uuid>,
        call_began_timestamp: i64,
    ) -> Result<Self> {
        if !call_status.matches(call_type) {
            return Err(Error::CallStatusMismatch {
                call_type,
                status: call_status,
            });
        }

        Ok(Self {
            id: None,
            call_id,
            interaction_row_id,
            thread_row_id,
            call_type,
            call_direction,
            call_status,
            unread_status: call_status.unread_status(),
            call_began_timestamp,
            group_call_ringer_aci: if call_type.is_group() {
                group_call_ringer_aci
            } else {
                None
            },
        })
    }

    /// Columns read by [`CallRecord::from_row`], in order
    pub(crate) const COLUMNS: &'static str = "id, call_id, interaction_row_id, thread_row_id, \
        call_type, direction, status, unread_status, timestamp, group_call_ringer_aci";

    /// Decode a row selected with [`CallRecord::COLUMNS`]
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        fn corrupted(idx: usize, ty: Type, what: String) -> rusqlite::Error {
            rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(Error::StorageCorrupted(what)))
        }

        let call_id: String = row.get(1)?;
        let call_id = call_id
            .parse::<u64>()
            .map_err(|_| corrupted(1, Type::Text, format!("invalid call id {}", call_id)))?;

        let call_type: i64 = row.get(4)?;
        let call_type = CallType::from_raw(call_type)
            .ok_or_else(|| corrupted(4, Type::Integer, format!("unknown call type {}", call_type)))?;

        let direction: i64 = row.get(5)?;
        let call_direction = CallDirection::from_raw(direction)
            .ok_or_else(|| corrupted(5, Type::Integer, format!("unknown direction {}", direction)))?;

        let status: i64 = row.get(6)?;
        let call_status = CallStatus::from_raw(status)
            .filter(|s| s.matches(call_type))
            .ok_or_else(|| {
                corrupted(
                    6,
                    Type::Integer,
                    format!("status {} invalid for {:?}", status, call_type),
                )
            })?;

        let unread: i64 = row.get(7)?;
        let unread_status = CallUnreadStatus::from_raw(unread)
            .ok_or_else(|| corrupted(7, Type::Integer, format!("unknown unread status {}", unread)))?;

        let ringer: Option<String> = row.get(9)?;
        let group_call_ringer_aci = ringer
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?;

        Ok(CallRecord {
            id: Some(row.get(0)?),
            call_id,
            interaction_row_id: row.get(2)?,
            thread_row_id: row.get(3)?,
            call_type,
            call_direction,
            call_status,
            unread_status,
            call_began_timestamp: row.get(8)?,
            group_call_ringer_aci,
        })
    }
}

/// Tombstone for a deleted call record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedCallRecord {
    /// Call id of the deleted record
    pub call_id: u64,
    /// Thread the deleted record belonged to
    pub thread_row_id: i64,
    /// When the record was deleted (Unix timestamp ms)
    pub deleted_at_timestamp: i64,
}

impl DeletedCallRecord {
    /// Tombstone for `record`, deleted at `deleted_at_timestamp`
    pub fn for_record(record: &CallRecord, deleted_at_timestamp: i64) -> Self {
        Self {
            call_id: record.call_id,
            thread_row_id: record.thread_row_id,
            deleted_at_timestamp,
        }
    }
}
