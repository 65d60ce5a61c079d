//! # Storage Module
//!
//! SQLite persistence for call records and the minimal conversation data
//! they hang off.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Database (this module)                                         │   │
//! │  │  ──────────────────────                                          │   │
//! │  │                                                                 │   │
//! │  │  • Connection ownership and schema versioning                  │   │
//! │  │  • write(|tx| ..) / read(|conn| ..) units of work              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Collaborator stores                                            │   │
//! │  │  ───────────────────                                             │   │
//! │  │                                                                 │   │
//! │  │  • ThreadStore       - contact and group conversations         │   │
//! │  │  • InteractionStore  - chat-timeline call entries              │   │
//! │  │                                                                 │   │
//! │  │  Both are traits so an embedding app can back them with its    │   │
//! │  │  own tables; the SQLite versions here are used by default.     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Call record tables are owned by `crate::calls`.                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod database;
mod interactions;
mod schema;
mod threads;

pub use database::{Database, DatabaseConfig};
pub use interactions::{
    CallOfferType, IndividualCallInteractionType, InteractionKind, InteractionRecord,
    InteractionStore, SqliteInteractionStore,
};
pub use threads::{SqliteThreadStore, ThreadKind, ThreadRecord, ThreadStore};
