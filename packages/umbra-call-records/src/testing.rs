//! Test fixtures shared by the unit test modules.

use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Transaction;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::calls::{
    CallDirection, CallLogAnchor, CallLogEventType, CallRecord, CallRecordDeleteManager,
    CallRecordMissedCallManager, CallRecordStore, CallStatus, CallType, CleanupRequest,
    CleanupScheduler, DeletedCallRecordStore, GroupCallRecordManager,
    GroupCallRecordRingUpdateHandler, GroupCallStatus, IncomingCallEventSyncMessageManager,
    IncomingCallLogEventSyncMessageManager, IndividualCallRecordManager, IndividualCallStatus,
    OutgoingCallEvent, SyncMessageSender,
};
use crate::error::Result;
use crate::storage::{
    CallOfferType, Database, IndividualCallInteractionType, InteractionRecord, InteractionStore,
    SqliteInteractionStore, SqliteThreadStore, ThreadStore,
};

// ============================================================================
// MOCK SYNC MESSAGE SENDER
// ============================================================================

/// One recorded [`SyncMessageSender`] invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentSyncMessage {
    /// `send_call_event`
    CallEvent {
        call_id: u64,
        thread_row_id: i64,
        event: OutgoingCallEvent,
        event_timestamp: i64,
        status: CallStatus,
        direction: CallDirection,
    },
    /// `send_call_log_event`
    CallLogEvent {
        event: CallLogEventType,
        anchor: CallLogAnchor,
    },
}

impl SentSyncMessage {
    /// The message a `CallUpdated` send for `record` records
    pub fn call_updated(record: &CallRecord, event_timestamp: i64) -> Self {
        SentSyncMessage::CallEvent {
            call_id: record.call_id,
            thread_row_id: record.thread_row_id,
            event: OutgoingCallEvent::CallUpdated,
            event_timestamp,
            status: record.call_status,
            direction: record.call_direction,
        }
    }
}

/// Records every sync message instead of sending it
#[derive(Debug, Default)]
pub struct MockSyncMessageSender {
    sent: Mutex<Vec<SentSyncMessage>>,
}

impl MockSyncMessageSender {
    /// Everything sent so far, in order
    pub fn sent(&self) -> Vec<SentSyncMessage> {
        self.sent.lock().clone()
    }
}

impl SyncMessageSender for MockSyncMessageSender {
    fn send_call_event(
        &self,
        _tx: &Transaction<'_>,
        record: &CallRecord,
        event: OutgoingCallEvent,
        event_timestamp: i64,
    ) -> Result<()> {
        self.sent.lock().push(SentSyncMessage::CallEvent {
            call_id: record.call_id,
            thread_row_id: record.thread_row_id,
            event,
            event_timestamp,
            status: record.call_status,
            direction: record.call_direction,
        });
        Ok(())
    }

    fn send_call_log_event(
        &self,
        _tx: &Transaction<'_>,
        event: CallLogEventType,
        anchor: CallLogAnchor,
    ) -> Result<()> {
        self.sent
            .lock()
            .push(SentSyncMessage::CallLogEvent { event, anchor });
        Ok(())
    }
}

// ============================================================================
// FIXTURE
// ============================================================================

/// In-memory database plus the collaborators every manager needs
pub struct Fixture {
    pub db: Arc<Database>,
    pub threads: Arc<SqliteThreadStore>,
    pub interactions: Arc<SqliteInteractionStore>,
    pub sync: Arc<MockSyncMessageSender>,
    scheduler: CleanupScheduler,
    cleanup_receiver: Mutex<mpsc::UnboundedReceiver<CleanupRequest>>,
}

impl Fixture {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            db: Arc::new(Database::open(None).unwrap()),
            threads: Arc::new(SqliteThreadStore::new()),
            interactions: Arc::new(SqliteInteractionStore::new()),
            sync: Arc::new(MockSyncMessageSender::default()),
            scheduler: CleanupScheduler::new(sender),
            cleanup_receiver: Mutex::new(receiver),
        }
    }

    // ------------------------------------------------------------------
    // Managers
    // ------------------------------------------------------------------

    pub fn delete_manager(&self) -> CallRecordDeleteManager {
        CallRecordDeleteManager::new(
            self.interactions.clone(),
            self.sync.clone(),
            self.scheduler.clone(),
        )
    }

    pub fn individual_manager(&self) -> IndividualCallRecordManager {
        IndividualCallRecordManager::new(self.interactions.clone(), self.sync.clone())
    }

    pub fn group_manager(&self) -> GroupCallRecordManager {
        GroupCallRecordManager::new(self.interactions.clone(), self.sync.clone())
    }

    pub fn missed_call_manager(&self) -> CallRecordMissedCallManager {
        CallRecordMissedCallManager::new(self.sync.clone())
    }

    pub fn ring_update_handler(&self) -> GroupCallRecordRingUpdateHandler {
        GroupCallRecordRingUpdateHandler::new(self.threads.clone(), self.group_manager())
    }

    pub fn call_event_sync_manager(&self) -> IncomingCallEventSyncMessageManager {
        IncomingCallEventSyncMessageManager::new(
            self.threads.clone(),
            self.interactions.clone(),
            self.individual_manager(),
            self.group_manager(),
            self.delete_manager(),
        )
    }

    pub fn call_log_event_sync_manager(&self) -> IncomingCallLogEventSyncMessageManager {
        IncomingCallLogEventSyncMessageManager::new(
            self.threads.clone(),
            self.delete_manager(),
            self.missed_call_manager(),
        )
    }

    // ------------------------------------------------------------------
    // Threads and interactions
    // ------------------------------------------------------------------

    pub fn contact_thread(&self) -> i64 {
        self.contact_thread_with_id().0
    }

    pub fn contact_thread_with_id(&self) -> (i64, Uuid) {
        let service_id = Uuid::new_v4();
        let thread = self
            .db
            .write(|tx| self.threads.insert_contact_thread(tx, &service_id))
            .unwrap();
        (thread.id, service_id)
    }

    pub fn group_thread(&self) -> i64 {
        self.group_thread_with_id().0
    }

    pub fn group_thread_with_id(&self) -> (i64, Vec<u8>) {
        let group_id = Uuid::new_v4().as_bytes().to_vec();
        let thread = self
            .db
            .write(|tx| self.threads.insert_group_thread(tx, &group_id))
            .unwrap();
        (thread.id, group_id)
    }

    pub fn group_interaction(&self, thread_row_id: i64, timestamp: i64) -> i64 {
        self.db
            .write(|tx| {
                self.interactions
                    .insert_group_call_interaction(tx, thread_row_id, timestamp)
            })
            .unwrap()
            .id
    }

    pub fn individual_interaction(
        &self,
        thread_row_id: i64,
        call_type: IndividualCallInteractionType,
        timestamp: i64,
    ) -> InteractionRecord {
        self.db
            .write(|tx| {
                self.interactions.insert_individual_call_interaction(
                    tx,
                    thread_row_id,
                    call_type,
                    CallOfferType::Audio,
                    timestamp,
                )
            })
            .unwrap()
    }

    pub fn interaction(&self, interaction_row_id: i64) -> Option<InteractionRecord> {
        self.db
            .read(|conn| self.interactions.fetch(conn, interaction_row_id))
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Call records
    // ------------------------------------------------------------------

    /// Insert an audio call record and the interaction it belongs to
    pub fn insert_individual_record(
        &self,
        thread_row_id: i64,
        call_id: u64,
        direction: CallDirection,
        status: IndividualCallStatus,
        timestamp: i64,
    ) -> CallRecord {
        use IndividualCallInteractionType as T;

        let interaction_type = match (direction, status) {
            (_, IndividualCallStatus::IncomingMissed) => T::IncomingMissed,
            (CallDirection::Incoming, IndividualCallStatus::Pending) => T::IncomingIncomplete,
            (CallDirection::Incoming, IndividualCallStatus::Accepted) => T::Incoming,
            (CallDirection::Incoming, IndividualCallStatus::NotAccepted) => T::IncomingDeclined,
            (CallDirection::Outgoing, IndividualCallStatus::Pending) => T::OutgoingIncomplete,
            (CallDirection::Outgoing, IndividualCallStatus::Accepted) => T::Outgoing,
            (CallDirection::Outgoing, IndividualCallStatus::NotAccepted) => T::OutgoingMissed,
        };

        self.db
            .write(|tx| {
                let interaction = self.interactions.insert_individual_call_interaction(
                    tx,
                    thread_row_id,
                    interaction_type,
                    CallOfferType::Audio,
                    timestamp,
                )?;
                let mut record = CallRecord::new(
                    call_id,
                    interaction.id,
                    thread_row_id,
                    CallType::AudioCall,
                    direction,
                    CallStatus::Individual(status),
                    None,
                    timestamp,
                )?;
                CallRecordStore::new().insert(tx, &mut record)?;
                Ok(record)
            })
            .unwrap()
    }

    /// Insert a group call record and the interaction it belongs to
    pub fn insert_group_record(
        &self,
        thread_row_id: i64,
        call_id: u64,
        direction: CallDirection,
        status: GroupCallStatus,
        timestamp: i64,
    ) -> CallRecord {
        self.db
            .write(|tx| {
                let interaction =
                    self.interactions
                        .insert_group_call_interaction(tx, thread_row_id, timestamp)?;
                let mut record = CallRecord::new(
                    call_id,
                    interaction.id,
                    thread_row_id,
                    CallType::GroupCall,
                    direction,
                    CallStatus::Group(status),
                    None,
                    timestamp,
                )?;
                CallRecordStore::new().insert(tx, &mut record)?;
                Ok(record)
            })
            .unwrap()
    }

    pub fn record(&self, call_id: u64, thread_row_id: i64) -> Option<CallRecord> {
        self.db
            .read(|conn| CallRecordStore::new().fetch(conn, call_id, thread_row_id))
            .unwrap()
    }

    pub fn is_tombstoned(&self, call_id: u64, thread_row_id: i64) -> bool {
        self.db
            .read(|conn| DeletedCallRecordStore::new().contains(conn, call_id, thread_row_id))
            .unwrap()
    }

    // ------------------------------------------------------------------
    // Counts
    // ------------------------------------------------------------------

    pub fn record_count(&self) -> u64 {
        self.db.read(|conn| CallRecordStore::new().count(conn)).unwrap()
    }

    pub fn tombstone_count(&self) -> u64 {
        self.db
            .read(|conn| DeletedCallRecordStore::new().count(conn))
            .unwrap()
    }

    pub fn interaction_count(&self) -> u64 {
        self.db
            .read(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM interactions", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .unwrap()
    }

    /// Drain the cleanup queue and return how many requests were in it
    pub fn cleanup_requests(&self) -> usize {
        let mut receiver = self.cleanup_receiver.lock();
        let mut count = 0;
        while receiver.try_recv().is_ok() {
            count += 1;
        }
        count
    }
}
