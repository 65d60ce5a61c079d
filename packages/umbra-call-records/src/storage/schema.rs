//! # Database Schema
//!
//! SQL schema definitions for the call record database.
//!
//! ## Schema Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DATABASE SCHEMA                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐    ┌──────────────────────┐   ┌────────────────┐  │
//! │  │    threads      │    │     call_record      │   │  interactions  │  │
//! │  ├─────────────────┤    ├──────────────────────┤   ├────────────────┤  │
//! │  │ id              │◄───│ thread_row_id (RESTR)│   │ id             │  │
//! │  │ kind            │    │ interaction_row_id ──┼──►│ thread_row_id  │  │
//! │  │ service_id      │    │ call_id              │   │ kind           │  │
//! │  │ group_id        │    │ call_type            │   │ call_type      │  │
//! │  │ created_at      │    │ direction            │   │ offer_type     │  │
//! │  └─────────────────┘    │ status               │   │ timestamp      │  │
//! │          ▲              │ unread_status        │   │ read           │  │
//! │          │              │ timestamp            │   └────────────────┘  │
//! │          │              │ group_call_ringer_aci│     (CASCADE)         │
//! │          │              └──────────────────────┘                       │
//! │          │                                                              │
//! │          │              ┌──────────────────────┐                       │
//! │          └──────────────│ deleted_call_record  │                       │
//! │               (RESTR)   ├──────────────────────┤                       │
//! │                         │ call_id              │                       │
//! │                         │ thread_row_id        │                       │
//! │                         │ deleted_at_timestamp │                       │
//! │                         └──────────────────────┘                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Index names on `call_record` and `deleted_call_record` are shared with
//! the other clients and must not be renamed.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// SQL to create all tables
pub const CREATE_TABLES: &str = r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

-- Threads table
-- Minimal conversation rows: one per contact or group
CREATE TABLE IF NOT EXISTS threads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- 'contact' or 'group'
    kind TEXT NOT NULL CHECK (kind IN ('contact', 'group')),
    -- Contact service id (UUID string), NULL for groups
    service_id TEXT UNIQUE,
    -- Group id bytes, NULL for contacts
    group_id BLOB UNIQUE,
    created_at INTEGER NOT NULL
);

-- Interactions table
-- Chat-timeline entries for calls (exactly one per call record)
CREATE TABLE IF NOT EXISTS interactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_row_id INTEGER NOT NULL,
    -- 'individual_call' or 'group_call'
    kind TEXT NOT NULL CHECK (kind IN ('individual_call', 'group_call')),
    -- Individual call display type (NULL for group calls)
    call_type INTEGER,
    -- 0 = audio, 1 = video (NULL for group calls)
    offer_type INTEGER,
    -- When the call event happened (Unix timestamp ms)
    timestamp INTEGER NOT NULL,
    read INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_interactions_thread ON interactions(thread_row_id, id);

-- Call records table
-- One row per call visible to this account
CREATE TABLE IF NOT EXISTS call_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    -- Opaque u64 call id (decimal text, spans the full u64 range)
    call_id TEXT NOT NULL,
    interaction_row_id INTEGER NOT NULL UNIQUE
        REFERENCES interactions(id) ON DELETE CASCADE,
    thread_row_id INTEGER NOT NULL
        REFERENCES threads(id) ON DELETE RESTRICT,
    call_type INTEGER NOT NULL,
    direction INTEGER NOT NULL,
    status INTEGER NOT NULL,
    unread_status INTEGER NOT NULL,
    -- Earliest known call timestamp (Unix timestamp ms)
    timestamp INTEGER NOT NULL,
    -- Who rang the group (UUID string), group calls only
    group_call_ringer_aci TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS index_call_record_on_callId_and_threadId
    ON call_record(call_id, thread_row_id);
CREATE INDEX IF NOT EXISTS index_call_record_on_timestamp
    ON call_record(timestamp);
CREATE INDEX IF NOT EXISTS index_call_record_on_status_and_timestamp
    ON call_record(status, timestamp);
CREATE INDEX IF NOT EXISTS index_call_record_on_threadRowId_and_timestamp
    ON call_record(thread_row_id, timestamp);
CREATE INDEX IF NOT EXISTS index_call_record_on_threadRowId_and_status_and_timestamp
    ON call_record(thread_row_id, status, timestamp);
CREATE INDEX IF NOT EXISTS index_call_record_on_unread_status_and_timestamp
    ON call_record(unread_status, timestamp);
CREATE INDEX IF NOT EXISTS index_call_record_on_threadRowId_and_unread_status_and_timestamp
    ON call_record(thread_row_id, unread_status, timestamp);

-- Deleted call records table
-- Tombstones suppressing resurrection of deleted calls
CREATE TABLE IF NOT EXISTS deleted_call_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    call_id TEXT NOT NULL,
    thread_row_id INTEGER NOT NULL
        REFERENCES threads(id) ON DELETE RESTRICT,
    deleted_at_timestamp INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS index_deleted_call_record_on_threadRowId_and_callId
    ON deleted_call_record(thread_row_id, call_id);
CREATE INDEX IF NOT EXISTS index_deleted_call_record_on_deletedAtTimestamp
    ON deleted_call_record(deleted_at_timestamp);
"#;

/// SQL to drop all tables (for testing/reset)
pub const DROP_TABLES: &str = r#"
DROP TABLE IF EXISTS deleted_call_record;
DROP TABLE IF EXISTS call_record;
DROP TABLE IF EXISTS interactions;
DROP TABLE IF EXISTS threads;
DROP TABLE IF EXISTS schema_version;
"#;
