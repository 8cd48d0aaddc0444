// WAL writer module - handles appending records to the log
//
// Each record is encoded in memory first and handed to the file in one
// write. An append or batch that fails at any point, including the final
// sync, is cut back off the file, so a failed call leaves the log exactly
// as it was before the call.

use crate::record::Record;
use crate::{SyncMode, WalConfig};
use coffer_core::{Codec, Coder, Entity, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Extension of the file that keeps bytes cut off a torn log tail
pub const TORN_EXTENSION: &str = "torn";

/// Append-only writer for one container's log
pub struct WalWriter<T: Entity, C: Coder = Codec> {
    file: File,
    path: PathBuf,
    coder: C,
    sync_mode: SyncMode,
    /// Length of the file up to the end of the last complete record
    len: u64,
    appended: u64,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, C: Coder> WalWriter<T, C> {
    /// Open (or create) the log at `path` for appending
    pub fn open(path: impl AsRef<Path>, coder: C, config: WalConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            coder,
            sync_mode: config.sync_mode,
            len,
            appended: 0,
            _entity: PhantomData,
        })
    }

    /// Append a single record, syncing according to the sync mode.
    ///
    /// Returns the number of records appended by this writer so far.
    pub fn append(&mut self, record: &Record<T>) -> Result<u64> {
        self.append_batch(std::iter::once(record))
    }

    /// Append several records and sync once at the end.
    ///
    /// All or nothing: on error every record of the batch is cut off again
    /// and the error returned.
    pub fn append_batch<'a, I>(&mut self, records: I) -> Result<u64>
    where
        I: IntoIterator<Item = &'a Record<T>>,
    {
        let start_len = self.len;
        let start_appended = self.appended;

        let result = records
            .into_iter()
            .try_for_each(|record| self.write_record(record))
            .and_then(|()| self.after_write());

        if let Err(e) = result {
            self.rewind(start_len, start_appended);
            return Err(e);
        }
        Ok(self.appended)
    }

    fn write_record(&mut self, record: &Record<T>) -> Result<()> {
        let mut encoded = Vec::new();
        self.coder.write(record, &mut encoded)?;
        self.file.write_all(&encoded)?;

        self.len += encoded.len() as u64;
        self.appended += 1;
        Ok(())
    }

    fn after_write(&mut self) -> Result<()> {
        match self.sync_mode {
            SyncMode::Sync => self.sync(),
            SyncMode::Async | SyncMode::None => Ok(()),
        }
    }

    /// Best effort: drop everything written after `len`
    fn rewind(&mut self, len: u64, appended: u64) {
        self.len = len;
        self.appended = appended;

        let result = self.file.set_len(len).and_then(|()| match self.sync_mode {
            SyncMode::None => Ok(()),
            SyncMode::Sync | SyncMode::Async => self.file.sync_all(),
        });
        if let Err(e) = result {
            tracing::warn!(path = ?self.path, len, error = %e, "Failed to cut failed append off the WAL");
        }
    }

    /// Force everything written so far to stable storage
    pub fn sync(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Discard every record in the log
    pub fn truncate(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_all()?;
        self.len = 0;
        Ok(())
    }

    /// Shorten the log at `path` to `len` bytes.
    ///
    /// Used after replay found a torn record at the tail, so that new
    /// appends do not land behind garbage. The bytes cut off are appended
    /// to `<path>.torn` first, so nothing is lost if they were not torn
    /// after all.
    pub fn cut_torn_tail(path: impl AsRef<Path>, len: u64) -> Result<()> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut dropped = Vec::new();
        file.seek(SeekFrom::Start(len))?;
        file.read_to_end(&mut dropped)?;

        if !dropped.is_empty() {
            let mut torn = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path.with_extension(TORN_EXTENSION))?;
            torn.write_all(&dropped)?;
            torn.sync_all()?;

            tracing::warn!(
                path = ?path,
                valid_len = len,
                dropped = dropped.len(),
                "Moved torn WAL tail aside"
            );
        }

        file.set_len(len)?;
        file.sync_all()?;
        Ok(())
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns true if the log holds no records
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of records appended through this writer
    pub fn appended(&self) -> u64 {
        self.appended
    }
}

impl<T: Entity, C: Coder> Drop for WalWriter<T, C> {
    fn drop(&mut self) {
        if self.sync_mode != SyncMode::None {
            // Best effort sync on drop
            let _ = self.sync();
        }
    }
}
