//! # Threads
//!
//! Minimal conversation rows. A call record always belongs to exactly one
//! thread: a contact thread keyed by the contact's service id, or a group
//! thread keyed by the group id.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind of conversation a thread represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadKind {
    /// One-to-one conversation
    Contact,
    /// Group conversation
    Group,
}

impl ThreadKind {
    /// Convert to database string
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadKind::Contact => "contact",
            ThreadKind::Group => "group",
        }
    }

    /// Parse from database string
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contact" => Some(ThreadKind::Contact),
            "group" => Some(ThreadKind::Group),
            _ => None,
        }
    }
}

/// A stored thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Row id
    pub id: i64,
    /// Contact or group
    pub kind: ThreadKind,
    /// Contact service id (contact threads only)
    pub service_id: Option<Uuid>,
    /// Group id (group threads only)
    pub group_id: Option<Vec<u8>>,
    /// When the thread was created (Unix timestamp ms)
    pub created_at: i64,
}

impl ThreadRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let kind: String = row.get(1)?;
        let kind = ThreadKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                Box::new(Error::StorageCorrupted(format!("unknown thread kind {}", kind))),
            )
        })?;

        let service_id: Option<String> = row.get(2)?;
        let service_id = service_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        Ok(ThreadRecord {
            id: row.get(0)?,
            kind,
            service_id,
            group_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

const THREAD_COLUMNS: &str = "id, kind, service_id, group_id, created_at";

/// Conversation lookups the call record engine depends on
pub trait ThreadStore: Send + Sync {
    /// Insert a contact thread for `service_id`
    fn insert_contact_thread(&self, tx: &Transaction<'_>, service_id: &Uuid) -> Result<ThreadRecord>;

    /// Insert a group thread for `group_id`
    fn insert_group_thread(&self, tx: &Transaction<'_>, group_id: &[u8]) -> Result<ThreadRecord>;

    /// Fetch a thread by row id
    fn fetch(&self, conn: &Connection, thread_row_id: i64) -> Result<Option<ThreadRecord>>;

    /// Fetch the contact thread for `service_id`, if one exists
    fn fetch_contact_thread(&self, conn: &Connection, service_id: &Uuid) -> Result<Option<ThreadRecord>>;

    /// Fetch the group thread for `group_id`, if one exists
    fn fetch_group_thread(&self, conn: &Connection, group_id: &[u8]) -> Result<Option<ThreadRecord>>;

    /// Delete a thread.
    ///
    /// Fails with [`Error::ThreadHasCallRecords`] while any call record or
    /// tombstone still references it.
    fn delete_thread(&self, tx: &Transaction<'_>, thread_row_id: i64) -> Result<()>;
}

/// SQLite-backed [`ThreadStore`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteThreadStore;

impl SqliteThreadStore {
    /// Create a new thread store
    pub fn new() -> Self {
        Self
    }

    fn insert(
        tx: &Transaction<'_>,
        kind: ThreadKind,
        service_id: Option<&Uuid>,
        group_id: Option<&[u8]>,
    ) -> Result<ThreadRecord> {
        let now = crate::time::now_timestamp_millis();
        tx.execute(
            "INSERT INTO threads (kind, service_id, group_id, created_at) VALUES (?, ?, ?, ?)",
            params![
                kind.as_str(),
                service_id.map(|id| id.to_string()),
                group_id,
                now
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to insert thread: {}", e)))?;

        Ok(ThreadRecord {
            id: tx.last_insert_rowid(),
            kind,
            service_id: service_id.copied(),
            group_id: group_id.map(|g| g.to_vec()),
            created_at: now,
        })
    }

    fn fetch_where(
        conn: &Connection,
        clause: &str,
        param: &dyn rusqlite::ToSql,
    ) -> Result<Option<ThreadRecord>> {
        conn.query_row(
            &format!("SELECT {} FROM threads WHERE {}", THREAD_COLUMNS, clause),
            &[param],
            ThreadRecord::from_row,
        )
        .optional()
        .map_err(|e| Error::DatabaseError(format!("Failed to fetch thread: {}", e)))
    }
}

impl ThreadStore for SqliteThreadStore {
    fn insert_contact_thread(&self, tx: &Transaction<'_>, service_id: &Uuid) -> Result<ThreadRecord> {
        Self::insert(tx, ThreadKind::Contact, Some(service_id), None)
    }

    fn insert_group_thread(&self, tx: &Transaction<'_>, group_id: &[u8]) -> Result<ThreadRecord> {
        Self::insert(tx, ThreadKind::Group, None, Some(group_id))
    }

    fn fetch(&self, conn: &Connection, thread_row_id: i64) -> Result<Option<ThreadRecord>> {
        Self::fetch_where(conn, "id = ?", &thread_row_id)
    }

    fn fetch_contact_thread(&self, conn: &Connection, service_id: &Uuid) -> Result<Option<ThreadRecord>> {
        Self::fetch_where(conn, "service_id = ?", &service_id.to_string())
    }

    fn fetch_group_thread(&self, conn: &Connection, group_id: &[u8]) -> Result<Option<ThreadRecord>> {
        Self::fetch_where(conn, "group_id = ?", &group_id)
    }

    fn delete_thread(&self, tx: &Transaction<'_>, thread_row_id: i64) -> Result<()> {
        let referencing: i64 = tx.query_row(
            "SELECT (SELECT COUNT(*) FROM call_record WHERE thread_row_id = ?1)
                  + (SELECT COUNT(*) FROM deleted_call_record WHERE thread_row_id = ?1)",
            params![thread_row_id],
            |row| row.get(0),
        )?;

        if referencing > 0 {
            tracing::error!(
                "Refusing to delete thread {}: {} call records still reference it",
                thread_row_id,
                referencing
            );
            return Err(Error::ThreadHasCallRecords(thread_row_id));
        }

        tx.execute(
            "DELETE FROM interactions WHERE thread_row_id = ?",
            params![thread_row_id],
        )?;
        let deleted = tx.execute("DELETE FROM threads WHERE id = ?", params![thread_row_id])?;
        if deleted == 0 {
            return Err(Error::ThreadNotFound(thread_row_id));
        }

        tracing::debug!("Deleted thread {}", thread_row_id);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
