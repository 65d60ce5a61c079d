//! # Umbra Call Records
//!
//! Call history for Umbra: one record per call, a status state machine
//! per call class, tombstones for deleted calls, and cross-device sync of
//! call events between an account's linked devices.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      UMBRA CALL RECORD MODULES                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌────────────┐   │
//! │  │ Ring updates │  │ Call event   │  │ Call log     │  │  Calling   │   │
//! │  │              │  │ sync (in)    │  │ sync (in)    │  │  layer     │   │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘  └─────┬──────┘   │
//! │         └─────────────────┴────────┬────────┴────────────────┘          │
//! │                                    ▼                                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Managers: individual, group, delete, missed calls              │   │
//! │  │  ──► SyncMessageSender (outgoing sync, embedder supplied)       │   │
//! │  └─────────────────────────────────┬───────────────────────────────┘   │
//! │                                    ▼                                    │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐  │
//! │  │ CallRecordStore │  │ DeletedCall     │  │ CallRecordQuerier       │  │
//! │  │ (transitions)   │  │ RecordStore     │  │ (cursors)               │  │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘  │
//! │                                    │                                    │
//! │                                    ▼                                    │
//! │                       SQLite (one transaction per event)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`calls`] - Call records, state machine, managers and sync handlers
//! - [`storage`] - SQLite database plus thread and interaction stores
//! - [`time`] - Timestamp helpers
//!
//! ## Transactions
//!
//! Nothing in this crate opens a transaction on its own. Every operation
//! takes the caller's `&Transaction` (writes) or `&Connection` (reads), so a
//! whole event is applied or rolled back as one unit:
//!
//! ```ignore
//! let (engine, cleanup) = CallRecordEngine::new(EngineConfig::default(), sender)?;
//! tokio::spawn(cleanup.run());
//!
//! engine.database().write(|tx| {
//!     engine.ring_update_handler().did_receive_ring_update(
//!         tx, &group_id, ring_id, RingUpdate::Requested, ringer,
//!     )
//! })?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod calls;
pub mod error;
pub mod storage;
/// Timestamp helpers.
pub mod time;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use calls::{
    CallDirection, CallRecord, CallStatus, CallType, CallUnreadStatus, GroupCallStatus,
    IndividualCallStatus, RingUpdate, SyncMessageSender,
};
pub use error::{Error, Result};

// ============================================================================
// ENGINE
// ============================================================================

use once_cell::sync::OnceCell;
use rusqlite::Transaction;
use std::sync::Arc;

use calls::{
    CallRecordDeleteManager, CallRecordMissedCallManager, CallRecordQuerier, CallRecordStore,
    CleanupScheduler, DeletedCallRecordCleanupManager, DeletedCallRecordStore,
    GroupCallRecordManager, GroupCallRecordRingUpdateHandler, IncomingCallEventSyncMessageManager,
    IncomingCallLogEventSyncMessageManager, IndividualCallRecordManager,
    DEFAULT_TOMBSTONE_RETENTION_MS,
};
use storage::{
    Database, DatabaseConfig, InteractionStore, SqliteInteractionStore, SqliteThreadStore,
    ThreadStore,
};

/// Global engine instance
static ENGINE_INSTANCE: OnceCell<Arc<CallRecordEngine>> = OnceCell::new();

/// Configuration for building a [`CallRecordEngine`]
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Database path (in-memory if None)
    pub database_path: Option<String>,
    /// How long tombstones are kept, in milliseconds
    pub tombstone_retention_ms: i64,
    /// Enable verbose logging
    pub verbose_logging: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            tombstone_retention_ms: DEFAULT_TOMBSTONE_RETENTION_MS,
            verbose_logging: false,
        }
    }
}

/// Every call record component, wired together once
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                        ENGINE LIFECYCLE                                 │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Build                                                               │
/// │     CallRecordEngine::new(config, sender)                               │
/// │       ──► open database, create schema                                  │
/// │       ──► wire stores, managers and sync handlers                       │
/// │       ──► returns the DeletedCallRecordCleanupManager                   │
/// │            │                                                            │
/// │            ▼                                                            │
/// │  2. Start cleanup                                                       │
/// │     tokio::spawn(cleanup.run())                                         │
/// │            │                                                            │
/// │            ▼                                                            │
/// │  3. Register (optional)                                                 │
/// │     CallRecordEngine::initialize(engine) ──► CallRecordEngine::instance │
/// │            │                                                            │
/// │            ▼                                                            │
/// │  4. Handle events                                                       │
/// │     engine.database().write(|tx| engine.<component>().<op>(tx, ..))    │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Clone)]
pub struct CallRecordEngine {
    config: EngineConfig,
    db: Arc<Database>,
    threads: Arc<dyn ThreadStore>,
    interactions: Arc<dyn InteractionStore>,
    store: CallRecordStore,
    deleted_store: DeletedCallRecordStore,
    querier: CallRecordQuerier,
    delete_manager: CallRecordDeleteManager,
    individual_manager: IndividualCallRecordManager,
    group_manager: GroupCallRecordManager,
    missed_call_manager: CallRecordMissedCallManager,
    ring_update_handler: GroupCallRecordRingUpdateHandler,
    call_event_sync_manager: IncomingCallEventSyncMessageManager,
    call_log_event_sync_manager: IncomingCallLogEventSyncMessageManager,
}

impl CallRecordEngine {
    /// Open the configured database and build the engine on the SQLite
    /// thread and interaction stores.
    ///
    /// The returned cleanup manager must be run (see
    /// [`DeletedCallRecordCleanupManager::run`]) for tombstones to expire.
    pub fn new(
        config: EngineConfig,
        sync: Arc<dyn SyncMessageSender>,
    ) -> Result<(Self, DeletedCallRecordCleanupManager)> {
        let db = Database::open_with_config(&DatabaseConfig {
            path: config.database_path.clone(),
        })?;

        Ok(Self::with_collaborators(
            config,
            Arc::new(db),
            Arc::new(SqliteThreadStore::new()),
            Arc::new(SqliteInteractionStore::new()),
            sync,
        ))
    }

    /// Build the engine on an already open database and caller-supplied
    /// collaborators.
    pub fn with_collaborators(
        config: EngineConfig,
        db: Arc<Database>,
        threads: Arc<dyn ThreadStore>,
        interactions: Arc<dyn InteractionStore>,
        sync: Arc<dyn SyncMessageSender>,
    ) -> (Self, DeletedCallRecordCleanupManager) {
        tracing::info!(
            "Building call record engine v{}",
            env!("CARGO_PKG_VERSION")
        );
        if config.verbose_logging {
            tracing::info!(
                "Call record engine config: database {:?}, tombstone retention {} ms",
                config.database_path,
                config.tombstone_retention_ms
            );
        }

        let (scheduler, cleanup): (CleanupScheduler, _) =
            DeletedCallRecordCleanupManager::new(db.clone(), config.tombstone_retention_ms);

        let delete_manager =
            CallRecordDeleteManager::new(interactions.clone(), sync.clone(), scheduler);
        let individual_manager = IndividualCallRecordManager::new(interactions.clone(), sync.clone());
        let group_manager = GroupCallRecordManager::new(interactions.clone(), sync.clone());
        let missed_call_manager = CallRecordMissedCallManager::new(sync);
        let ring_update_handler =
            GroupCallRecordRingUpdateHandler::new(threads.clone(), group_manager.clone());
        let call_event_sync_manager = IncomingCallEventSyncMessageManager::new(
            threads.clone(),
            interactions.clone(),
            individual_manager.clone(),
            group_manager.clone(),
            delete_manager.clone(),
        );
        let call_log_event_sync_manager = IncomingCallLogEventSyncMessageManager::new(
            threads.clone(),
            delete_manager.clone(),
            missed_call_manager.clone(),
        );

        let engine = Self {
            config,
            db,
            threads,
            interactions,
            store: CallRecordStore::new(),
            deleted_store: DeletedCallRecordStore::new(),
            querier: CallRecordQuerier::new(),
            delete_manager,
            individual_manager,
            group_manager,
            missed_call_manager,
            ring_update_handler,
            call_event_sync_manager,
            call_log_event_sync_manager,
        };
        (engine, cleanup)
    }

    /// Register `engine` as the process-wide instance.
    ///
    /// This should be called once at application startup.
    pub fn initialize(engine: CallRecordEngine) -> Result<Arc<CallRecordEngine>> {
        let engine = Arc::new(engine);
        ENGINE_INSTANCE
            .set(engine.clone())
            .map_err(|_| Error::AlreadyInitialized)?;

        tracing::info!("Call record engine initialized");
        Ok(engine)
    }

    /// Get the global engine instance
    ///
    /// Returns an error if the engine hasn't been initialized.
    pub fn instance() -> Result<Arc<CallRecordEngine>> {
        ENGINE_INSTANCE.get().cloned().ok_or(Error::NotInitialized)
    }

    /// Check if the engine is initialized
    pub fn is_initialized() -> bool {
        ENGINE_INSTANCE.get().is_some()
    }

    // ------------------------------------------------------------------------
    // Thread merge
    // ------------------------------------------------------------------------

    /// Move every call record, tombstone and call interaction of
    /// `from_thread_row_id` into `into_thread_row_id`, after which the
    /// source thread can be deleted.
    ///
    /// A call id deleted in either thread stays deleted in the merged one,
    /// and when both threads hold a record for the same call id the target's
    /// record wins. Dropped records lose their interaction too.
    ///
    /// Returns how many call records moved.
    pub fn merge_threads(
        &self,
        tx: &Transaction<'_>,
        from_thread_row_id: i64,
        into_thread_row_id: i64,
    ) -> Result<usize> {
        let conflicts =
            self.store
                .fetch_merge_conflicts(tx, from_thread_row_id, into_thread_row_id)?;
        for record in &conflicts {
            tracing::info!(
                "Dropping call {} from thread {} while merging thread {} into {}",
                record.call_id,
                record.thread_row_id,
                from_thread_row_id,
                into_thread_row_id
            );
            self.store.delete(tx, record)?;
            self.interactions
                .delete_interaction(tx, record.interaction_row_id)?;
        }

        self.interactions
            .update_with_merged_thread(tx, from_thread_row_id, into_thread_row_id)?;
        let records = self
            .store
            .update_with_merged_thread(tx, from_thread_row_id, into_thread_row_id)?;
        self.deleted_store
            .update_with_merged_thread(tx, from_thread_row_id, into_thread_row_id)?;
        Ok(records)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The shared database
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Thread store collaborator
    pub fn threads(&self) -> &Arc<dyn ThreadStore> {
        &self.threads
    }

    /// Interaction store collaborator
    pub fn interactions(&self) -> &Arc<dyn InteractionStore> {
        &self.interactions
    }

    /// Call record table
    pub fn call_record_store(&self) -> &CallRecordStore {
        &self.store
    }

    /// Tombstone table
    pub fn deleted_call_record_store(&self) -> &DeletedCallRecordStore {
        &self.deleted_store
    }

    /// Cursor queries over call records
    pub fn querier(&self) -> &CallRecordQuerier {
        &self.querier
    }

    /// Call deletion
    pub fn delete_manager(&self) -> &CallRecordDeleteManager {
        &self.delete_manager
    }

    /// One-to-one call records
    pub fn individual_call_record_manager(&self) -> &IndividualCallRecordManager {
        &self.individual_manager
    }

    /// Group call records
    pub fn group_call_record_manager(&self) -> &GroupCallRecordManager {
        &self.group_manager
    }

    /// Missed call counts and mark-as-read
    pub fn missed_call_manager(&self) -> &CallRecordMissedCallManager {
        &self.missed_call_manager
    }

    /// Group ring signaling
    pub fn ring_update_handler(&self) -> &GroupCallRecordRingUpdateHandler {
        &self.ring_update_handler
    }

    /// Inbound call event sync messages
    pub fn call_event_sync_manager(&self) -> &IncomingCallEventSyncMessageManager {
        &self.call_event_sync_manager
    }

    /// Inbound call log event sync messages
    pub fn call_log_event_sync_manager(&self) -> &IncomingCallLogEventSyncMessageManager {
        &self.call_log_event_sync_manager
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of the call record engine
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{FetchOrdering, IncomingCallEvent, IncomingCallEventSyncMessageParams, SyncConversation};
    use crate::testing::MockSyncMessageSender;
    use uuid::Uuid;

    fn engine() -> (CallRecordEngine, Arc<MockSyncMessageSender>) {
        let sync = Arc::new(MockSyncMessageSender::default());
        let (engine, _cleanup) = CallRecordEngine::new(EngineConfig::default(), sync.clone()).unwrap();
        (engine, sync)
    }

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert!(config.database_path.is_none());
        assert_eq!(config.tombstone_retention_ms, 8 * 60 * 60 * 1000);
        assert!(!config.verbose_logging);
    }

    #[test]
    fn test_global_instance_lifecycle() {
        assert!(matches!(CallRecordEngine::instance(), Err(Error::NotInitialized)));

        let (first, _) = engine();
        CallRecordEngine::initialize(first).unwrap();
        assert!(CallRecordEngine::is_initialized());
        assert!(CallRecordEngine::instance().is_ok());

        let (second, _) = engine();
        assert!(matches!(
            CallRecordEngine::initialize(second),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_ring_then_sync_through_engine() {
        let (engine, sync) = engine();
        let group_id = b"engine-group".to_vec();
        let db = engine.database().clone();

        let thread = db
            .write(|tx| engine.threads().insert_group_thread(tx, &group_id))
            .unwrap();

        db.write(|tx| {
            engine.ring_update_handler().did_receive_ring_update(
                tx,
                &group_id,
                77,
                RingUpdate::Requested,
                Uuid::new_v4(),
            )
        })
        .unwrap();

        let params = IncomingCallEventSyncMessageParams {
            conversation: SyncConversation::Group { group_id: group_id.clone() },
            call_id: 77,
            call_timestamp: 1,
            call_event: IncomingCallEvent::Accepted,
            call_direction: CallDirection::Incoming,
        };
        db.write(|tx| {
            engine
                .call_event_sync_manager()
                .create_or_update_record_for_incoming_sync_message(tx, &params, 2)
        })
        .unwrap();

        let record = db
            .read(|conn| engine.call_record_store().fetch(conn, 77, thread.id))
            .unwrap()
            .unwrap();
        assert_eq!(record.call_status, CallStatus::Group(GroupCallStatus::RingingAccepted));
        assert_eq!(record.call_began_timestamp, 1);
        assert!(sync.sent().is_empty());

        let all = db
            .read(|conn| {
                engine
                    .querier()
                    .fetch_cursor(conn, FetchOrdering::Descending, None, None)
                    .collect::<Result<Vec<_>>>()
            })
            .unwrap();
        assert_eq!(all, vec![record]);
    }

    #[test]
    fn test_merge_threads_then_delete_source() {
        let (engine, _sync) = engine();
        let db = engine.database().clone();
        let (from, into) = db
            .write(|tx| {
                let from = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                let into = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                Ok((from.id, into.id))
            })
            .unwrap();

        db.write(|tx| {
            let interaction = engine.interactions().insert_individual_call_interaction(
                tx,
                from,
                storage::IndividualCallInteractionType::Incoming,
                storage::CallOfferType::Audio,
                100,
            )?;
            engine
                .individual_call_record_manager()
                .create_or_update_record_for_interaction(tx, &interaction, 1, false)?;
            engine.delete_manager().mark_call_as_deleted(tx, 2, from)
        })
        .unwrap();

        assert!(matches!(
            db.write(|tx| engine.threads().delete_thread(tx, from)),
            Err(Error::ThreadHasCallRecords(_))
        ));

        let moved = db.write(|tx| engine.merge_threads(tx, from, into)).unwrap();
        assert_eq!(moved, 1);
        db.write(|tx| engine.threads().delete_thread(tx, from)).unwrap();

        let merged = db
            .read(|conn| engine.call_record_store().fetch(conn, 1, into))
            .unwrap();
        assert!(merged.is_some());
        assert!(db
            .read(|conn| engine.deleted_call_record_store().contains(conn, 2, into))
            .unwrap());
    }

    #[test]
    fn test_merge_threads_keeps_deleted_calls_deleted() {
        let (engine, _sync) = engine();
        let db = engine.database().clone();
        let (from, into) = db
            .write(|tx| {
                let from = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                let into = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                Ok((from.id, into.id))
            })
            .unwrap();

        // 9 lives in the source but was deleted in the target, 4 the other way round
        let interactions = db
            .write(|tx| {
                let mut interactions = Vec::new();
                for (thread, call_id) in [(from, 9), (into, 4)] {
                    let interaction = engine.interactions().insert_individual_call_interaction(
                        tx,
                        thread,
                        storage::IndividualCallInteractionType::Incoming,
                        storage::CallOfferType::Audio,
                        100,
                    )?;
                    engine
                        .individual_call_record_manager()
                        .create_or_update_record_for_interaction(tx, &interaction, call_id, false)?;
                    interactions.push(interaction.id);
                }
                engine.delete_manager().mark_call_as_deleted(tx, 9, into)?;
                engine.delete_manager().mark_call_as_deleted(tx, 4, from)?;
                Ok(interactions)
            })
            .unwrap();

        let moved = db.write(|tx| engine.merge_threads(tx, from, into)).unwrap();
        assert_eq!(moved, 0);

        let store = engine.call_record_store();
        let deleted = engine.deleted_call_record_store();
        for call_id in [9, 4] {
            assert!(db.read(|conn| store.fetch(conn, call_id, into)).unwrap().is_none());
            assert!(db.read(|conn| deleted.contains(conn, call_id, into)).unwrap());
        }
        for interaction_id in interactions {
            assert!(db
                .read(|conn| engine.interactions().fetch(conn, interaction_id))
                .unwrap()
                .is_none());
        }
        db.write(|tx| engine.threads().delete_thread(tx, from)).unwrap();
    }

    #[test]
    fn test_merge_threads_with_shared_call_id() {
        let (engine, _sync) = engine();
        let db = engine.database().clone();
        let (from, into) = db
            .write(|tx| {
                let from = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                let into = engine.threads().insert_contact_thread(tx, &Uuid::new_v4())?;
                Ok((from.id, into.id))
            })
            .unwrap();

        let (source, target) = db
            .write(|tx| {
                let mut ids = Vec::new();
                for (thread, call_id, timestamp) in [(from, 5, 100), (into, 5, 200), (from, 6, 300)] {
                    let interaction = engine.interactions().insert_individual_call_interaction(
                        tx,
                        thread,
                        storage::IndividualCallInteractionType::Incoming,
                        storage::CallOfferType::Audio,
                        timestamp,
                    )?;
                    engine
                        .individual_call_record_manager()
                        .create_or_update_record_for_interaction(tx, &interaction, call_id, false)?;
                    ids.push(interaction.id);
                }
                Ok((ids[0], ids[1]))
            })
            .unwrap();

        let moved = db.write(|tx| engine.merge_threads(tx, from, into)).unwrap();
        assert_eq!(moved, 1);

        let store = engine.call_record_store();
        let kept = db.read(|conn| store.fetch(conn, 5, into)).unwrap().unwrap();
        assert_eq!(kept.interaction_row_id, target);
        assert_eq!(kept.call_began_timestamp, 200);
        assert!(db.read(|conn| store.fetch(conn, 6, into)).unwrap().is_some());
        assert!(db
            .read(|conn| engine.interactions().fetch(conn, source))
            .unwrap()
            .is_none());
        db.write(|tx| engine.threads().delete_thread(tx, from)).unwrap();
    }
}
