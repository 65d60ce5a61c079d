//! # Interactions
//!
//! Chat-timeline entries for calls. Every call record points at exactly one
//! interaction; deleting the interaction cascades to the call record.
//!
//! ## Individual call display types
//!
//! ```text
//! ┌──────────────────────────────────────────┬───────────┬──────────────┐
//! │ IndividualCallInteractionType            │ Direction │ Status       │
//! ├──────────────────────────────────────────┼───────────┼──────────────┤
//! │ Incoming / IncomingAnsweredElsewhere     │ incoming  │ accepted     │
//! │ Outgoing                                 │ outgoing  │ accepted     │
//! │ IncomingDeclined / ..DeclinedElsewhere   │ incoming  │ notAccepted  │
//! │ OutgoingMissed                           │ outgoing  │ notAccepted  │
//! │ IncomingMissed / ..BusyElsewhere /       │ incoming  │ incomingMiss │
//! │   ..ChangedIdentity / ..DoNotDisturb     │           │              │
//! │ IncomingIncomplete                       │ incoming  │ pending      │
//! │ OutgoingIncomplete                       │ outgoing  │ pending      │
//! └──────────────────────────────────────────┴───────────┴──────────────┘
//! ```

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};

use crate::calls::{CallDirection, CallType, IndividualCallStatus};
use crate::error::{Error, Result};

/// How an individual call is shown in the chat timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndividualCallInteractionType {
    /// Incoming call answered on this device
    Incoming,
    /// Outgoing call that connected
    Outgoing,
    /// Incoming call nobody answered
    IncomingMissed,
    /// Outgoing call still ringing
    OutgoingIncomplete,
    /// Incoming call still ringing
    IncomingIncomplete,
    /// Missed because the caller's safety number changed
    IncomingMissedBecauseOfChangedIdentity,
    /// Incoming call declined on this device
    IncomingDeclined,
    /// Outgoing call the other side never picked up
    OutgoingMissed,
    /// Incoming call answered on a linked device
    IncomingAnsweredElsewhere,
    /// Incoming call declined on a linked device
    IncomingDeclinedElsewhere,
    /// Incoming call while a linked device was busy
    IncomingBusyElsewhere,
    /// Missed because do-not-disturb was on
    IncomingMissedBecauseOfDoNotDisturb,
}

impl IndividualCallInteractionType {
    /// Raw value stored in the interactions table
    pub fn raw_value(&self) -> i64 {
        match self {
            Self::Incoming => 1,
            Self::Outgoing => 2,
            Self::IncomingMissed => 3,
            Self::OutgoingIncomplete => 4,
            Self::IncomingIncomplete => 5,
            Self::IncomingMissedBecauseOfChangedIdentity => 6,
            Self::IncomingDeclined => 7,
            Self::OutgoingMissed => 8,
            Self::IncomingAnsweredElsewhere => 9,
            Self::IncomingDeclinedElsewhere => 10,
            Self::IncomingBusyElsewhere => 11,
            Self::IncomingMissedBecauseOfDoNotDisturb => 12,
        }
    }

    /// Parse a raw value from the interactions table
    pub fn from_raw(raw: i64) -> Option<Self> {
        Some(match raw {
            1 => Self::Incoming,
            2 => Self::Outgoing,
            3 => Self::IncomingMissed,
            4 => Self::OutgoingIncomplete,
            5 => Self::IncomingIncomplete,
            6 => Self::IncomingMissedBecauseOfChangedIdentity,
            7 => Self::IncomingDeclined,
            8 => Self::OutgoingMissed,
            9 => Self::IncomingAnsweredElsewhere,
            10 => Self::IncomingDeclinedElsewhere,
            11 => Self::IncomingBusyElsewhere,
            12 => Self::IncomingMissedBecauseOfDoNotDisturb,
            _ => return None,
        })
    }

    /// Direction of the call this entry represents
    pub fn call_direction(&self) -> CallDirection {
        match self {
            Self::Outgoing | Self::OutgoingIncomplete | Self::OutgoingMissed => {
                CallDirection::Outgoing
            }
            _ => CallDirection::Incoming,
        }
    }

    /// Call record status this entry corresponds to
    pub fn individual_call_status(&self) -> IndividualCallStatus {
        match self {
            Self::Incoming | Self::Outgoing | Self::IncomingAnsweredElsewhere => {
                IndividualCallStatus::Accepted
            }
            Self::IncomingDeclined | Self::OutgoingMissed | Self::IncomingDeclinedElsewhere => {
                IndividualCallStatus::NotAccepted
            }
            Self::IncomingMissed
            | Self::IncomingBusyElsewhere
            | Self::IncomingMissedBecauseOfChangedIdentity
            | Self::IncomingMissedBecauseOfDoNotDisturb => IndividualCallStatus::IncomingMissed,
            Self::OutgoingIncomplete | Self::IncomingIncomplete => IndividualCallStatus::Pending,
        }
    }
}

/// Media offered by an individual call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallOfferType {
    /// Audio only
    Audio,
    /// Audio and video
    Video,
}

impl CallOfferType {
    /// Raw value stored in the interactions table
    pub fn raw_value(&self) -> i64 {
        match self {
            CallOfferType::Audio => 0,
            CallOfferType::Video => 1,
        }
    }

    /// Parse a raw value from the interactions table
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(CallOfferType::Audio),
            1 => Some(CallOfferType::Video),
            _ => None,
        }
    }

    /// Offer type for an individual call type, `None` for group calls
    pub fn for_call_type(call_type: CallType) -> Option<Self> {
        match call_type {
            CallType::AudioCall => Some(CallOfferType::Audio),
            CallType::VideoCall => Some(CallOfferType::Video),
            CallType::GroupCall => None,
        }
    }
}

/// Kind of call interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InteractionKind {
    /// One-to-one call entry
    IndividualCall,
    /// Group call entry
    GroupCall,
}

impl InteractionKind {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::IndividualCall => "individual_call",
            InteractionKind::GroupCall => "group_call",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "individual_call" => Some(InteractionKind::IndividualCall),
            "group_call" => Some(InteractionKind::GroupCall),
            _ => None,
        }
    }
}

/// A stored call interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    /// Row id
    pub id: i64,
    /// Owning thread
    pub thread_row_id: i64,
    /// Individual or group call entry
    pub kind: InteractionKind,
    /// Display type (individual calls only)
    pub call_type: Option<IndividualCallInteractionType>,
    /// Audio or video (individual calls only)
    pub offer_type: Option<CallOfferType>,
    /// When the call event happened (Unix timestamp ms)
    pub timestamp: i64,
    /// Whether the user has seen this entry
    pub read: bool,
}

impl InteractionRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let corrupted = |idx: usize, what: String| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Integer,
                Box::new(Error::StorageCorrupted(what)),
            )
        };

        let kind: String = row.get(2)?;
        let kind = InteractionKind::parse(&kind)
            .ok_or_else(|| corrupted(2, format!("unknown interaction kind {}", kind)))?;

        let call_type = match row.get::<_, Option<i64>>(3)? {
            Some(raw) => Some(
                IndividualCallInteractionType::from_raw(raw)
                    .ok_or_else(|| corrupted(3, format!("unknown call interaction type {}", raw)))?,
            ),
            None => None,
        };
        let offer_type = match row.get::<_, Option<i64>>(4)? {
            Some(raw) => Some(
                CallOfferType::from_raw(raw)
                    .ok_or_else(|| corrupted(4, format!("unknown offer type {}", raw)))?,
            ),
            None => None,
        };

        Ok(InteractionRecord {
            id: row.get(0)?,
            thread_row_id: row.get(1)?,
            kind,
            call_type,
            offer_type,
            timestamp: row.get(5)?,
            read: row.get(6)?,
        })
    }
}

/// Chat-timeline operations the call record engine depends on
pub trait InteractionStore: Send + Sync {
    /// Insert an individual call entry
    fn insert_individual_call_interaction(
        &self,
        tx: &Transaction<'_>,
        thread_row_id: i64,
        call_type: IndividualCallInteractionType,
        offer_type: CallOfferType,
        timestamp: i64,
    ) -> Result<InteractionRecord>;

    /// Insert a group call entry
    fn insert_group_call_interaction(
        &self,
        tx: &Transaction<'_>,
        thread_row_id: i64,
        timestamp: i64,
    ) -> Result<InteractionRecord>;

    /// Fetch an interaction by row id
    fn fetch(&self, conn: &Connection, interaction_row_id: i64) -> Result<Option<InteractionRecord>>;

    /// Change the display type of an individual call entry
    fn update_individual_call_interaction_type(
        &self,
        tx: &Transaction<'_>,
        interaction_row_id: i64,
        call_type: IndividualCallInteractionType,
    ) -> Result<()>;

    /// Delete an interaction on this device only. Its call record, if any,
    /// goes with it.
    fn delete_interaction(&self, tx: &Transaction<'_>, interaction_row_id: i64) -> Result<()>;

    /// Mark `interaction_row_id` and every earlier call entry in its thread
    /// as read, in response to a linked device having handled the call.
    ///
    /// Returns how many entries changed.
    fn mark_call_interactions_read_for_incoming_sync_message(
        &self,
        tx: &Transaction<'_>,
        interaction_row_id: i64,
    ) -> Result<usize>;

    /// Move every interaction of `from_thread_row_id` into
    /// `into_thread_row_id`. Returns how many moved.
    fn update_with_merged_thread(
        &self,
        tx: &Transaction<'_>,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<usize>;
}

const INTERACTION_COLUMNS: &str = "id, thread_row_id, kind, call_type, offer_type, timestamp, read";

/// SQLite-backed [`InteractionStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteInteractionStore;

impl SqliteInteractionStore {
    /// Create a new interaction store
    pub fn new() -> Self {
        Self
    }
}

impl InteractionStore for SqliteInteractionStore {
    fn insert_individual_call_interaction(
        &self,
        tx: &Transaction<'_>,
        thread_row_id: i64,
        call_type: IndividualCallInteractionType,
        offer_type: CallOfferType,
        timestamp: i64,
    ) -> Result<InteractionRecord> {
        tx.execute(
            "INSERT INTO interactions (thread_row_id, kind, call_type, offer_type, timestamp, read)
             VALUES (?, ?, ?, ?, ?, 0)",
            params![
                thread_row_id,
                InteractionKind::IndividualCall.as_str(),
                call_type.raw_value(),
                offer_type.raw_value(),
                timestamp
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to insert call interaction: {}", e)))?;

        Ok(InteractionRecord {
            id: tx.last_insert_rowid(),
            thread_row_id,
            kind: InteractionKind::IndividualCall,
            call_type: Some(call_type),
            offer_type: Some(offer_type),
            timestamp,
            read: false,
        })
    }

    fn insert_group_call_interaction(
        &self,
        tx: &Transaction<'_>,
        thread_row_id: i64,
        timestamp: i64,
    ) -> Result<InteractionRecord> {
        tx.execute(
            "INSERT INTO interactions (thread_row_id, kind, timestamp, read) VALUES (?, ?, ?, 0)",
            params![thread_row_id, InteractionKind::GroupCall.as_str(), timestamp],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to insert call interaction: {}", e)))?;

        Ok(InteractionRecord {
            id: tx.last_insert_rowid(),
            thread_row_id,
            kind: InteractionKind::GroupCall,
            call_type: None,
            offer_type: None,
            timestamp,
            read: false,
        })
    }

    fn fetch(&self, conn: &Connection, interaction_row_id: i64) -> Result<Option<InteractionRecord>> {
        conn.query_row(
            &format!("SELECT {} FROM interactions WHERE id = ?", INTERACTION_COLUMNS),
            params![interaction_row_id],
            InteractionRecord::from_row,
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch interaction: {}", e)))
    }

    fn update_individual_call_interaction_type(
        &self,
        tx: &Transaction<'_>,
        interaction_row_id: i64,
        call_type: IndividualCallInteractionType,
    ) -> Result<()> {
        let updated = tx.execute(
            "UPDATE interactions SET call_type = ? WHERE id = ? AND kind = ?",
            params![
                call_type.raw_value(),
                interaction_row_id,
                InteractionKind::IndividualCall.as_str()
            ],
        )?;
        if updated == 0 {
            return Err(Error::InteractionNotFound(interaction_row_id));
        }
        Ok(())
    }

    fn delete_interaction(&self, tx: &Transaction<'_>, interaction_row_id: i64) -> Result<()> {
        tx.execute(
            "DELETE FROM interactions WHERE id = ?",
            params![interaction_row_id],
        )?;
        Ok(())
    }

    fn mark_call_interactions_read_for_incoming_sync_message(
        &self,
        tx: &Transaction<'_>,
        interaction_row_id: i64,
    ) -> Result<usize> {
        let Some(interaction) = self.fetch(tx, interaction_row_id)? else {
            return Err(Error::InteractionNotFound(interaction_row_id));
        };

        let changed = tx.execute(
            "UPDATE interactions SET read = 1
             WHERE thread_row_id = ? AND id <= ? AND read = 0",
            params![interaction.thread_row_id, interaction.id],
        )?;

        tracing::debug!(
            "Marked {} call interactions read in thread {}",
            changed,
            interaction.thread_row_id
        );
        Ok(changed)
    }

    fn update_with_merged_thread(
        &self,
        tx: &Transaction<'_>,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<usize> {
        let moved = tx
            .execute(
                "UPDATE interactions SET thread_row_id = ? WHERE thread_row_id = ?",
                params![into_thread_row_id, from_thread_row_id],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to merge interactions: {}", e)))?;
        Ok(moved)
    }
}

// ============================================================================
// TESTS
// ============================================================================
