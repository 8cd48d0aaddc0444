//! # Coffer WAL (Write-Ahead Log)
//!
//! Append-only log of forward mutations over one entity type, providing
//! durable, crash-recoverable storage for a container's committed changes.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of Coffer.**
//!
//! Users should depend on the main [`coffer`](https://crates.io/crates/coffer) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.

use serde::{Deserialize, Serialize};

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::WalReader;
pub use record::Record;
pub use writer::{WalWriter, TORN_EXTENSION};

/// File name of the log inside a container directory
pub const WAL_FILE: &str = "wal";

/// WAL configuration options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalConfig {
    /// Sync mode: sync, async, or none
    pub sync_mode: SyncMode,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            sync_mode: SyncMode::Sync,
        }
    }
}

/// Sync mode for WAL writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// Call fsync after every append or batch (strongest durability)
    Sync,
    /// Hand bytes to the OS on every append, fsync only on explicit sync or close
    Async,
    /// Never fsync (fastest, unsafe for power loss)
    None,
}
