//! Impost - a tag-based mail-index database
//!
//! This crate exposes an embedded native mail-index engine through a
//! high-level handle API:
//!
//! - **Database**: lifecycle (open, create, upgrade, compact, close) and
//!   message/config operations, with read-only vs read-write modes
//! - **Message**: handles to indexed messages, keyed by a stable
//!   content-derived message id, with tag pass-throughs
//! - **ConfigEntries**: cursor over per-database key/value configuration
//! - **Query**: thin pass-through search over the indexed messages
//! - **Locate**: database location resolution (explicit path, config
//!   file, or named profile under the config home)
//! - **Error**: the typed taxonomy every native engine status is
//!   translated into before it reaches a caller
//!
//! All operations are synchronous blocking calls into the engine. A
//! `Database` owns exactly one native connection; `Message`, `Query` and
//! the values they return borrow the database, so they cannot be used
//! after it is closed.

pub mod config;
pub mod database;
pub mod error;
pub mod locate;
pub mod message;
pub mod query;
pub mod schema;

pub use config::ConfigEntries;
pub use database::{compact, Database, DatabaseMode};
pub use error::{ImpostError, Result};
pub use locate::DatabaseLocation;
pub use message::Message;
pub use query::Query;
pub use schema::{Schema, SCHEMA_VERSION};
