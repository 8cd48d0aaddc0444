//! # Coffer
//!
//! An embedded, typed key-value store. Values live in memory, one container
//! per entity type; changes are buffered, flushed to a per-container
//! write-ahead log, and periodically checkpointed into snapshots.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coffer::{Entity, Storage};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     email: String,
//! }
//!
//! impl Entity for User {
//!     type Key = String;
//!
//!     fn id(&self) -> String {
//!         self.name.clone()
//!     }
//! }
//!
//! fn main() -> coffer::Result<()> {
//!     let storage = Storage::open("./my_data")?;
//!
//!     // Register before restore so existing files are loaded
//!     let users = storage.register::<User>()?;
//!     storage.restore()?;
//!
//!     users.upsert(User {
//!         name: "alice".to_string(),
//!         email: "alice@example.com".to_string(),
//!     })?;
//!
//!     // Durable once flushed
//!     users.flush()?;
//!
//!     // Bound the log that the next restore has to replay
//!     storage.make_snapshot()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Durability
//!
//! - Mutations change memory and the container's undo buffer only.
//! - `flush` appends the net effect of the buffered changes to the WAL and
//!   clears the buffer once the records are on disk. Unflushed changes can
//!   be reverted with `rollback`.
//! - `make_snapshot` flushes, writes the full state atomically and empties
//!   the WAL.
//! - `restore` loads the snapshot and replays the WAL. An incomplete record
//!   at the end of the WAL (crash during an append) is dropped; any other
//!   malformed data is reported as [`Error::Corruption`].
//!
//! ## Encodings
//!
//! [`StorageConfig::codec`] selects how WAL records and snapshots are
//! written: checksummed bincode frames ([`Codec::Binary`], the default), JSON
//! lines ([`Codec::Json`]) or MessagePack ([`Codec::MessagePack`]).

pub mod logging;

// Re-export core types
pub use coffer_core::{BinaryCoder, Codec, Coder, Entity, Error, JsonCoder, MessagePackCoder, Result};

// WAL components
pub use coffer_wal::{Record, SyncMode, WalConfig, WalReader, WalWriter};

// Snapshot components
pub use coffer_snapshot::{Snapshot, SnapshotMeta};

// Storage components
pub use coffer_storage::{
    Action, Container, ContainerHandle, RestoreStats, Storage, StorageConfig, UndoBuffer,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
