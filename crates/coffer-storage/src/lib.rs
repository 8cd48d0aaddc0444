//! # Coffer Storage
//!
//! Typed containers, undo buffering and the storage registry.
//!
//! ## ⚠️ Internal Implementation Detail
//!
//! **This crate is an internal implementation detail of Coffer.**
//!
//! Users should depend on the main [`coffer`](https://crates.io/crates/coffer) crate
//! instead, which provides the stable public API. This crate's API may change
//! without notice between minor versions.
//!
//! ---
//!
//! A [`Storage`] owns one directory per registered entity type:
//!
//! ```text
//! <root>/
//! ├── User/
//! │   ├── wal         (forward records since the last snapshot)
//! │   └── snapshot    (full state as of the last snapshot)
//! └── Order/
//!     └── wal
//! ```

#![warn(missing_docs)]

pub mod container;
pub mod handle;
pub mod undo;

pub use container::{Container, RestoreStats};
pub use handle::ContainerHandle;
pub use undo::{Action, UndoBuffer};

use coffer_core::{Codec, Entity, Error, Result};
use coffer_snapshot::SnapshotMeta;
use coffer_wal::WalConfig;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Storage configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageConfig {
    /// Coder used for every WAL and snapshot file
    pub codec: Codec,
    /// WAL options shared by all containers
    pub wal: WalConfig,
}

/// The part of a container the registry can drive without knowing `T`
trait Persistent: Send + Sync {
    fn name(&self) -> &'static str;
    fn restore(&self) -> Result<RestoreStats>;
    fn flush(&self) -> Result<usize>;
    fn make_snapshot(&self) -> Result<SnapshotMeta>;
    fn as_any(&self) -> &dyn Any;
}

impl<T: Entity> Persistent for ContainerHandle<T> {
    fn name(&self) -> &'static str {
        ContainerHandle::name(self)
    }

    fn restore(&self) -> Result<RestoreStats> {
        ContainerHandle::restore(self)
    }

    fn flush(&self) -> Result<usize> {
        ContainerHandle::flush(self)
    }

    fn make_snapshot(&self) -> Result<SnapshotMeta> {
        ContainerHandle::make_snapshot(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Registry of containers sharing one root directory
pub struct Storage {
    root: PathBuf,
    config: StorageConfig,
    /// In registration order
    containers: RwLock<Vec<Box<dyn Persistent>>>,
}

impl Storage {
    /// Open storage at `root` with the default configuration
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(root, StorageConfig::default())
    }

    /// Open storage at `root`, creating the directory if needed.
    ///
    /// No container is loaded until it is registered and [`restore`](Self::restore)
    /// is called.
    pub fn open_with_config(root: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        tracing::info!(root = ?root, codec = ?config.codec, sync_mode = ?config.wal.sync_mode, "Storage opened");

        Ok(Self {
            root,
            config,
            containers: RwLock::new(Vec::new()),
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<Box<dyn Persistent>>>> {
        self.containers.read().map_err(|_| Error::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<Box<dyn Persistent>>>> {
        self.containers.write().map_err(|_| Error::LockPoisoned)
    }

    /// Register `T` so that it takes part in restore, flush and snapshot.
    ///
    /// Registering the same type again returns the existing handle. A
    /// different type whose name maps to the same directory is rejected.
    pub fn register<T: Entity>(&self) -> Result<ContainerHandle<T>> {
        let mut containers = self.write()?;

        if let Some(handle) = find::<T>(&containers)? {
            return Ok(handle);
        }

        let handle = ContainerHandle::<T>::open(&self.root, self.config.codec, self.config.wal);
        containers.push(Box::new(handle.clone()));

        tracing::debug!(container = T::name(), "Container registered");
        Ok(handle)
    }

    /// Handle to the container for `T`, registering it on first access.
    ///
    /// A container first registered after [`restore`](Self::restore) starts
    /// empty; restore again to load its files.
    pub fn container<T: Entity>(&self) -> Result<ContainerHandle<T>> {
        if let Some(handle) = find::<T>(&self.read()?)? {
            return Ok(handle);
        }
        self.register::<T>()
    }

    /// Restore every registered container, in registration order.
    ///
    /// Stops at the first container that fails; containers after it keep
    /// their in-memory state.
    pub fn restore(&self) -> Result<()> {
        let containers = self.read()?;

        let mut snapshot_entries = 0;
        let mut wal_records = 0;
        for container in containers.iter() {
            let stats = container.restore().map_err(|e| {
                tracing::error!(container = container.name(), error = %e, "Restore failed");
                e
            })?;
            snapshot_entries += stats.snapshot_entries;
            wal_records += stats.wal_records;
        }

        tracing::info!(
            containers = containers.len(),
            snapshot_entries,
            wal_records,
            "Storage restored"
        );
        Ok(())
    }

    /// Flush every registered container, returning the total record count
    pub fn flush(&self) -> Result<usize> {
        let containers = self.read()?;
        let mut records = 0;
        for container in containers.iter() {
            records += container.flush()?;
        }
        Ok(records)
    }

    /// Snapshot every registered container
    pub fn make_snapshot(&self) -> Result<()> {
        let containers = self.read()?;
        for container in containers.iter() {
            container.make_snapshot()?;
        }
        tracing::info!(containers = containers.len(), "Storage snapshot complete");
        Ok(())
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration in use
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Names of registered containers, in registration order
    pub fn registered(&self) -> Result<Vec<&'static str>> {
        Ok(self.read()?.iter().map(|c| c.name()).collect())
    }
}

fn find<T: Entity>(containers: &[Box<dyn Persistent>]) -> Result<Option<ContainerHandle<T>>> {
    for container in containers {
        if let Some(handle) = container.as_any().downcast_ref::<ContainerHandle<T>>() {
            return Ok(Some(handle.clone()));
        }
        if container.name() == T::name() {
            return Err(Error::InvalidOperation(format!(
                "Container name '{}' is already used by another type",
                T::name()
            )));
        }
    }
    Ok(None)
}
