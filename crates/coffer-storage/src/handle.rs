// Shared, lockable access to a container
//
// Every operation on one container runs under its mutex, so mutations,
// flushes, snapshots and restores of that container are serialized.
// Different containers never share a lock.

use crate::container::{Container, RestoreStats};
use coffer_core::{Codec, Coder, Entity, Error, Result};
use coffer_snapshot::SnapshotMeta;
use coffer_wal::WalConfig;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Shared<T: Entity, C: Coder> {
    container: Mutex<Container<T, C>>,
    snapshotting: AtomicBool,
}

/// Cloneable handle to a container shared between threads
pub struct ContainerHandle<T: Entity, C: Coder = Codec> {
    shared: Arc<Shared<T, C>>,
}

impl<T: Entity, C: Coder> Clone for ContainerHandle<T, C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Marks a snapshot as running until dropped
pub(crate) struct SnapshotGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SnapshotGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl<T: Entity, C: Coder> ContainerHandle<T, C> {
    /// Wrap a fresh container rooted at `root`
    pub fn open(root: impl AsRef<Path>, coder: C, wal_config: WalConfig) -> Self {
        Self::from_container(Container::open(root, coder, wal_config))
    }

    /// Wrap an existing container
    pub fn from_container(container: Container<T, C>) -> Self {
        Self {
            shared: Arc::new(Shared {
                container: Mutex::new(container),
                snapshotting: AtomicBool::new(false),
            }),
        }
    }

    /// Entity type name
    pub fn name(&self) -> &'static str {
        T::name()
    }

    /// Lock the container for a sequence of operations
    pub fn lock(&self) -> Result<MutexGuard<'_, Container<T, C>>> {
        self.shared.container.lock().map_err(|_| Error::LockPoisoned)
    }

    /// See [`Container::insert`]
    pub fn insert(&self, value: T) -> Result<()> {
        self.lock()?.insert(value)
    }

    /// See [`Container::upsert`]
    pub fn upsert(&self, value: T) -> Result<Option<T>> {
        Ok(self.lock()?.upsert(value))
    }

    /// See [`Container::remove`]
    pub fn remove(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.lock()?.remove(key))
    }

    /// Clone of the value stored under `key`
    pub fn get(&self, key: &T::Key) -> Result<Option<T>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Number of stored values
    pub fn count(&self) -> Result<usize> {
        Ok(self.lock()?.count())
    }

    /// See [`Container::flush`]
    pub fn flush(&self) -> Result<usize> {
        self.lock()?.flush()
    }

    /// See [`Container::rollback`]
    pub fn rollback(&self) -> Result<usize> {
        Ok(self.lock()?.rollback())
    }

    /// See [`Container::restore`]
    pub fn restore(&self) -> Result<RestoreStats> {
        self.lock()?.restore()
    }

    /// See [`Container::make_snapshot`].
    ///
    /// Fails with [`Error::SnapshotInProgress`] instead of queueing behind a
    /// snapshot of the same container that is already running.
    pub fn make_snapshot(&self) -> Result<SnapshotMeta> {
        let _guard = self.begin_snapshot()?;
        self.lock()?.make_snapshot()
    }

    pub(crate) fn begin_snapshot(&self) -> Result<SnapshotGuard<'_>> {
        let flag = &self.shared.snapshotting;
        if flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return Err(Error::SnapshotInProgress(T::name().to_string()));
        }
        Ok(SnapshotGuard { flag })
    }
}
