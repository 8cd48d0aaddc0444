//! Container - the authoritative in-memory map for one entity type
//!
//! `items` is the only structure readers ever consult. Every mutation
//! updates `items` and the undo buffer together; `flush` turns the buffer
//! into forward WAL records, and `restore` rebuilds `items` from the
//! snapshot plus the WAL written after it.
//!
//! On disk a container owns one directory, `<root>/<Entity::name()>/`,
//! holding the `wal` and `snapshot` files.

use crate::undo::UndoBuffer;
use coffer_core::{Codec, Coder, Entity, Error, Result};
use coffer_snapshot::{load_snapshot, snapshot_path, write_snapshot, SnapshotMeta};
use coffer_wal::{Record, WalConfig, WalReader, WalWriter, WAL_FILE};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What a restore found on disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Values loaded from the snapshot
    pub snapshot_entries: u64,
    /// WAL records replayed on top of the snapshot
    pub wal_records: u64,
    /// Whether an incomplete trailing WAL record was dropped
    pub torn_tail: bool,
}

/// In-memory store plus durability machinery for one entity type
pub struct Container<T: Entity, C: Coder = Codec> {
    name: &'static str,
    dir: PathBuf,
    coder: C,
    wal_config: WalConfig,
    items: BTreeMap<T::Key, T>,
    undo: UndoBuffer<T>,
    /// Opened on first flush
    wal: Option<WalWriter<T, C>>,
}

impl<T: Entity, C: Coder> Container<T, C> {
    /// Create an empty container rooted at `<root>/<T::name()>`.
    ///
    /// Nothing is read from or written to disk until `restore`, `flush` or
    /// `make_snapshot` is called.
    pub fn open(root: impl AsRef<Path>, coder: C, wal_config: WalConfig) -> Self {
        let name = T::name();
        Self {
            name,
            dir: root.as_ref().join(name),
            coder,
            wal_config,
            items: BTreeMap::new(),
            undo: UndoBuffer::new(),
            wal: None,
        }
    }

    /// Entity type name, also the directory name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Directory holding this container's files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the WAL file
    pub fn wal_path(&self) -> PathBuf {
        self.dir.join(WAL_FILE)
    }

    /// Path of the snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        snapshot_path(&self.dir)
    }

    /// Number of stored values
    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the container holds no values
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up a value by primary key
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.items.get(key)
    }

    /// Returns true if a value with this key is stored
    pub fn contains(&self, key: &T::Key) -> bool {
        self.items.contains_key(key)
    }

    /// Iterate values in key order
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Insert a value whose key must not be present yet.
    ///
    /// Fails with [`Error::AlreadyExists`] and leaves the container untouched
    /// if the key is taken.
    pub fn insert(&mut self, value: T) -> Result<()> {
        let key = value.id();
        if self.items.contains_key(&key) {
            return Err(Error::AlreadyExists);
        }

        self.undo.record(key.clone(), None);
        self.items.insert(key, value);
        Ok(())
    }

    /// Insert or replace a value, returning the one it replaced
    pub fn upsert(&mut self, value: T) -> Option<T> {
        let key = value.id();
        let previous = self.items.insert(key.clone(), value);
        self.undo.record(key, previous.clone());
        previous
    }

    /// Remove a value by key. Removing an absent key changes nothing.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let removed = self.items.remove(key)?;
        self.undo.record(key.clone(), Some(removed.clone()));
        Some(removed)
    }

    // Secondary access: there are no secondary indexes, every helper below
    // is a full scan over the stored values.

    /// First value (in key order) whose selected field equals `value`
    pub fn first_where<V, F>(&self, selector: F, value: &V) -> Option<&T>
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> &V,
    {
        self.items.values().find(|item| selector(item) == value)
    }

    /// All values whose selected field equals `value`
    pub fn select_where<V, F>(&self, selector: F, value: &V) -> Vec<&T>
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> &V,
    {
        self.items
            .values()
            .filter(|item| selector(item) == value)
            .collect()
    }

    /// Remove and return all values whose selected field equals `value`
    pub fn remove_where<V, F>(&mut self, selector: F, value: &V) -> Vec<T>
    where
        V: PartialEq + ?Sized,
        F: Fn(&T) -> &V,
    {
        let keys: Vec<T::Key> = self
            .items
            .iter()
            .filter(|(_, item)| selector(item) == value)
            .map(|(key, _)| key.clone())
            .collect();

        keys.iter().filter_map(|key| self.remove(key)).collect()
    }

    /// Pending compensating actions
    pub fn undo(&self) -> &UndoBuffer<T> {
        &self.undo
    }

    /// Returns true if there are changes not yet written to the WAL
    pub fn is_dirty(&self) -> bool {
        !self.undo.is_empty()
    }

    fn wal(&mut self) -> Result<&mut WalWriter<T, C>> {
        if self.wal.is_none() {
            let writer = WalWriter::open(self.wal_path(), self.coder.clone(), self.wal_config)?;
            self.wal = Some(writer);
        }
        self.wal
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation("WAL not opened".to_string()))
    }

    /// Append the net effect of every buffered mutation to the WAL.
    ///
    /// The buffer is cleared only once every record is durable. On error
    /// the WAL is left as it was before the call and the buffer is kept
    /// whole, so the changes can still be flushed later or rolled back.
    /// Returns the number of records appended.
    pub fn flush(&mut self) -> Result<usize> {
        if self.undo.is_empty() {
            return Ok(0);
        }

        let records = self.undo.forward_records(&self.items);
        if !records.is_empty() {
            self.wal()?.append_batch(&records)?;
        }

        tracing::debug!(
            container = self.name,
            dirty = self.undo.len(),
            records = records.len(),
            "Flushed undo buffer to WAL"
        );

        self.undo.clear();
        Ok(records.len())
    }

    /// Discard every change made since the last flush.
    ///
    /// Returns the number of keys reverted.
    pub fn rollback(&mut self) -> usize {
        self.undo.rollback(&mut self.items)
    }

    /// Flush, write a full snapshot, then empty the WAL it supersedes
    pub fn make_snapshot(&mut self) -> Result<SnapshotMeta> {
        self.flush()?;

        let meta = write_snapshot(&self.dir, &self.coder, self.name, self.items.values())?;

        if self.wal.is_some() || self.wal_path().exists() {
            self.wal()?.truncate()?;
        }

        tracing::debug!(container = self.name, entries = meta.entries, "Snapshot complete");
        Ok(meta)
    }

    /// Rebuild `items` from the snapshot and the WAL.
    ///
    /// Pending changes are dropped. An incomplete record at the end of the
    /// WAL is cut off and kept in `wal.torn`; malformed data anywhere else
    /// fails the restore and the files are left untouched. If the on-disk state cannot be read the
    /// container is left empty and the error returned.
    pub fn restore(&mut self) -> Result<RestoreStats> {
        self.wal = None;
        self.items.clear();
        self.undo.clear();

        match self.load() {
            Ok(stats) => {
                tracing::debug!(
                    container = self.name,
                    snapshot_entries = stats.snapshot_entries,
                    wal_records = stats.wal_records,
                    count = self.items.len(),
                    "Container restored"
                );
                Ok(stats)
            }
            Err(e) => {
                self.items.clear();
                Err(e)
            }
        }
    }

    fn load(&mut self) -> Result<RestoreStats> {
        let mut stats = RestoreStats::default();

        if let Some(snapshot) = load_snapshot::<T, C>(&self.dir, &self.coder, self.name)? {
            stats.snapshot_entries = snapshot.values.len() as u64;
            for value in snapshot.values {
                self.items.insert(value.id(), value);
            }
        }

        let mut reader = WalReader::<T, C>::open(self.wal_path(), self.coder.clone())?;
        while let Some(record) = reader.read_next()? {
            self.replay(record);
            stats.wal_records += 1;
        }

        if reader.has_torn_tail() {
            WalWriter::<T, C>::cut_torn_tail(self.wal_path(), reader.valid_len())?;
            stats.torn_tail = true;
        }

        Ok(stats)
    }

    /// Apply a forward record directly to `items`, bypassing the undo buffer.
    ///
    /// Deleting an unknown key is a no-op.
    pub(crate) fn replay(&mut self, record: Record<T>) {
        match record {
            Record::Upsert(value) => {
                self.items.insert(value.id(), value);
            }
            Record::Delete(key) => {
                self.items.remove(&key);
            }
        }
    }
}
