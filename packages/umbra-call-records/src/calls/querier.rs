//! # Call Record Querier
//!
//! Lazy, ordered cursors over call records.
//!
//! ## Index Selection
//!
//! ```text
//! ┌───────────────┬───────────────┬──────────────────────────────────────────────────────┐
//! │ thread filter │ status filter │ index                                                │
//! ├───────────────┼───────────────┼──────────────────────────────────────────────────────┤
//! │      -        │      -        │ index_call_record_on_timestamp                       │
//! │      -        │   status      │ index_call_record_on_status_and_timestamp            │
//! │    thread     │      -        │ index_call_record_on_threadRowId_and_timestamp       │
//! │    thread     │   status      │ index_call_record_on_threadRowId_and_status_and_...  │
//! │      -        │   unread      │ index_call_record_on_unread_status_and_timestamp     │
//! │    thread     │   unread      │ index_call_record_on_threadRowId_and_unread_...      │
//! └───────────────┴───────────────┴──────────────────────────────────────────────────────┘
//! ```
//!
//! Cursors page through the index in batches using the last row's
//! (timestamp, id) as the key, so they never hold a statement open between
//! batches and never load the whole table. Equal timestamps are ordered by
//! row id.

use std::collections::VecDeque;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

use super::record::{CallRecord, CallStatus, CallUnreadStatus};
use crate::error::{Error, Result};

/// Rows fetched per round trip
const BATCH_SIZE: usize = 50;

/// Order and starting point of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOrdering {
    /// Newest first, everything
    Descending,
    /// Newest first, strictly before the timestamp
    DescendingBefore(i64),
    /// Oldest first, strictly after the timestamp
    AscendingAfter(i64),
}

impl FetchOrdering {
    fn is_ascending(&self) -> bool {
        matches!(self, FetchOrdering::AscendingAfter(_))
    }
}

/// Secondary filter on a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusFilter {
    None,
    Status(CallStatus),
    Unread,
}

/// Builds cursors over the call record table
#[derive(Debug, Clone, Copy, Default)]
pub struct CallRecordQuerier;

impl CallRecordQuerier {
    /// Create a new querier
    pub fn new() -> Self {
        Self
    }

    /// Cursor over records, optionally restricted to a thread and/or a status
    pub fn fetch_cursor<'c>(
        &self,
        conn: &'c Connection,
        ordering: FetchOrdering,
        thread_row_id: Option<i64>,
        call_status: Option<CallStatus>,
    ) -> CallRecordCursor<'c> {
        let status = match call_status {
            Some(status) => StatusFilter::Status(status),
            None => StatusFilter::None,
        };
        CallRecordCursor::new(conn, ordering, thread_row_id, status)
    }

    /// Cursor over unread records, optionally restricted to a thread
    pub fn fetch_unread_cursor<'c>(
        &self,
        conn: &'c Connection,
        ordering: FetchOrdering,
        thread_row_id: Option<i64>,
    ) -> CallRecordCursor<'c> {
        CallRecordCursor::new(conn, ordering, thread_row_id, StatusFilter::Unread)
    }
}

/// Forward-only sequence of call records.
///
/// Yields `Err` at most once, after which it is exhausted.
pub struct CallRecordCursor<'c> {
    conn: &'c Connection,
    ordering: FetchOrdering,
    thread_row_id: Option<i64>,
    status: StatusFilter,
    /// (timestamp, id) of the last row handed out
    last_key: Option<(i64, i64)>,
    buffer: VecDeque<CallRecord>,
    exhausted: bool,
}

impl<'c> CallRecordCursor<'c> {
    fn new(
        conn: &'c Connection,
        ordering: FetchOrdering,
        thread_row_id: Option<i64>,
        status: StatusFilter,
    ) -> Self {
        Self {
            conn,
            ordering,
            thread_row_id,
            status,
            last_key: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn index_name(&self) -> &'static str {
        match (self.thread_row_id.is_some(), self.status) {
            (false, StatusFilter::None) => "index_call_record_on_timestamp",
            (false, StatusFilter::Status(_)) => "index_call_record_on_status_and_timestamp",
            (false, StatusFilter::Unread) => "index_call_record_on_unread_status_and_timestamp",
            (true, StatusFilter::None) => "index_call_record_on_threadRowId_and_timestamp",
            (true, StatusFilter::Status(_)) => {
                "index_call_record_on_threadRowId_and_status_and_timestamp"
            }
            (true, StatusFilter::Unread) => {
                "index_call_record_on_threadRowId_and_unread_status_and_timestamp"
            }
        }
    }

    fn fetch_batch(&mut self) -> Result<()> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(thread_row_id) = self.thread_row_id {
            clauses.push("thread_row_id = ?");
            values.push(Value::Integer(thread_row_id));
        }
        match self.status {
            StatusFilter::None => {}
            StatusFilter::Status(status) => {
                clauses.push("status = ?");
                values.push(Value::Integer(status.raw_value()));
            }
            StatusFilter::Unread => {
                clauses.push("unread_status = ?");
                values.push(Value::Integer(CallUnreadStatus::Unread.raw_value()));
            }
        }

        let ascending = self.ordering.is_ascending();
        match (self.last_key, self.ordering) {
            (Some((timestamp, id)), _) => {
                clauses.push(if ascending {
                    "timestamp >= ? AND (timestamp > ? OR id > ?)"
                } else {
                    "timestamp <= ? AND (timestamp < ? OR id < ?)"
                });
                values.push(Value::Integer(timestamp));
                values.push(Value::Integer(timestamp));
                values.push(Value::Integer(id));
            }
            (None, FetchOrdering::Descending) => {}
            (None, FetchOrdering::DescendingBefore(timestamp)) => {
                clauses.push("timestamp < ?");
                values.push(Value::Integer(timestamp));
            }
            (None, FetchOrdering::AscendingAfter(timestamp)) => {
                clauses.push("timestamp > ?");
                values.push(Value::Integer(timestamp));
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let direction = if ascending { "ASC" } else { "DESC" };
        let sql = format!(
            "SELECT {} FROM call_record INDEXED BY {} {} ORDER BY timestamp {}, id {} LIMIT {}",
            CallRecord::COLUMNS,
            self.index_name(),
            where_clause,
            direction,
            direction,
            BATCH_SIZE
        );

        let conn = self.conn;
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare cursor query: {}", e)))?;
        let rows = stmt
            .query_map(params_from_iter(values), CallRecord::from_row)
            .map_err(|e| Error::DatabaseError(format!("Failed to query call records: {}", e)))?;

        let mut fetched = 0;
        for row in rows {
            let record = row
                .map_err(|e| Error::DatabaseError(format!("Failed to read call record: {}", e)))?;
            self.buffer.push_back(record);
            fetched += 1;
        }

        if fetched < BATCH_SIZE {
            self.exhausted = true;
        }
        Ok(())
    }
}

impl Iterator for CallRecordCursor<'_> {
    type Item = Result<CallRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_batch() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }

        let record = self.buffer.pop_front()?;
        if let Some(id) = record.id {
            self.last_key = Some((record.call_began_timestamp, id));
        }
        Some(Ok(record))
    }
}

// ============================================================================
// TESTS
// ============================================================================
