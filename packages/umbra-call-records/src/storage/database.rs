//! # Database
//!
//! SQLite database wrapper and unit-of-work helpers.
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │   Application   │  Opens one unit of work per event                 │
//! │  └────────┬────────┘                                                   │
//! │           │ db.write(|tx| ...)                                          │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │    Database     │  Owns the connection                              │
//! │  │   (this file)   │  - BEGIN / COMMIT / ROLLBACK                      │
//! │  │                 │  - Schema creation                                │
//! │  └────────┬────────┘                                                   │
//! │           │ &Transaction / &Connection                                  │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │  Call record    │  Stores, managers and sync handlers never        │
//! │  │  components     │  open transactions themselves                     │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only one writer runs at a time: the connection sits behind a mutex and a
//! write closure holds it until it commits or rolls back.

use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use std::sync::Arc;

use super::schema;
use crate::error::{Error, Result};

/// Database configuration
#[derive(Debug, Clone, Default)]
pub struct DatabaseConfig {
    /// Path to the database file (None for in-memory)
    pub path: Option<String>,
}

/// The main database handle
///
/// Wraps a SQLite connection and hands out transactions to the call
/// record components.
pub struct Database {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::DatabaseError(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        // Cascades and RESTRICT constraints depend on this
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| Error::DatabaseError(format!("Failed to enable foreign keys: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Open a database from configuration
    pub fn open_with_config(config: &DatabaseConfig) -> Result<Self> {
        Self::open(config.path.as_deref())
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::StorageCorrupted(format!(
                    "Database schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema version: {}", v);
            }
        }

        Ok(())
    }

    /// Run `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`; any `Err` rolls back every write made
    /// through the transaction.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        let value = f(&tx)?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit transaction: {}", e)))?;
        Ok(value)
    }

    /// Run `f` against a consistent read snapshot.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        // Dropping the transaction rolls it back; nothing was written anyway
        let value = f(&*tx)?;
        Ok(value)
    }

    /// Drop and recreate every table. Intended for tests and account reset.
    pub fn reset(&self) -> Result<()> {
        {
            let conn = self.conn.lock();
            conn.execute_batch(schema::DROP_TABLES)
                .map_err(|e| Error::DatabaseError(format!("Failed to drop tables: {}", e)))?;
        }
        tracing::warn!("Database reset, recreating schema");
        self.init_schema()
    }
}

// ============================================================================
// TESTS
// ============================================================================
