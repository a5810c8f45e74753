//! # SmolDB Core
//!
//! An embedded, single-process, document-oriented storage engine.
//!
//! Each collection is backed by a slab-allocated data file of fixed-size
//! slots, a binary index file holding the primary and secondary indexes,
//! and a blob directory for oversized documents. A background worker
//! compacts collections when dead space exceeds a configurable ratio,
//! coordinating with the foreground through a small buffer of atomic
//! counters.
//!
//! ```rust,ignore
//! use smoldb_core::{Config, Database};
//! use serde_json::json;
//! use std::path::Path;
//!
//! let db = Database::open(Path::new("my_db"))?;
//! let users = db.collection("users")?;
//!
//! users.insert("user_1", json!({"name": "Alice", "role": "admin"}))?;
//! users.create_index("role")?;
//!
//! let admins = users.find(&role_filter)?;
//! db.close()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod collection;
mod config;
mod database;
mod dir;
mod error;
mod index;
mod shared;
mod slab;
mod stats;
mod store;
mod types;
mod worker;

pub use collection::{BatchOps, Collection, CollectionIter, CollectionStats};
pub use config::Config;
pub use database::{Database, DatabaseStats};
pub use error::{EngineError, EngineResult};
pub use index::{IndexManager, QueryPlan};
pub use shared::{
    GcStatusSnapshot, SharedCell, SharedState, CMD_NONE, CMD_SHUTDOWN, CMD_TRIGGER_GC,
    GC_COMPLETE, GC_IDLE, GC_RUNNING,
};
pub use stats::{EngineStats, EngineStatsSnapshot};
pub use store::{CompactionOutcome, StorageEngine, StorageStats, WriteBatch};
pub use types::DocumentLocation;
pub use worker::GcEvent;
