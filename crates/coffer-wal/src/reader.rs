// WAL reader module - reads and replays log records
//
// The reader handles:
// 1. Sequential decoding of records in append order
// 2. Torn tails - an incomplete trailing record (crash during an append)
//    ends the stream instead of failing the replay
// 3. Corruption - malformed bytes anywhere else surface as an error

use crate::record::Record;
use coffer_core::{Codec, Coder, Entity, Error, Result};
use std::fs::File;
use std::io::{BufReader, Seek};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Sequential reader over one container's log
pub struct WalReader<T: Entity, C: Coder = Codec> {
    path: PathBuf,
    coder: C,
    /// `None` once the stream is exhausted, or if the log does not exist
    reader: Option<BufReader<File>>,
    /// Byte offset just past the last complete record
    valid_len: u64,
    torn_tail: bool,
    records_read: u64,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity, C: Coder> WalReader<T, C> {
    /// Open the log at `path`. A missing file reads as an empty log.
    pub fn open(path: impl AsRef<Path>, coder: C) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let reader = match File::open(&path) {
            Ok(file) => Some(BufReader::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(Error::Io(e)),
        };

        Ok(Self {
            path,
            coder,
            reader,
            valid_len: 0,
            torn_tail: false,
            records_read: 0,
            _entity: PhantomData,
        })
    }

    /// Read the next record from the WAL
    ///
    /// Returns `Ok(Some(record))` if a record was read successfully,
    /// `Ok(None)` at the end of the log (including a torn trailing record),
    /// or an error if the log is corrupted.
    pub fn read_next(&mut self) -> Result<Option<Record<T>>> {
        let reader = match &mut self.reader {
            Some(r) => r,
            None => return Ok(None),
        };

        match self.coder.next::<Record<T>>(reader) {
            Ok(Some(record)) => {
                self.valid_len = reader.stream_position()?;
                self.records_read += 1;
                Ok(Some(record))
            }
            Ok(None) => {
                self.reader = None;
                Ok(None)
            }
            Err(Error::InsufficientData) => {
                tracing::warn!(
                    path = ?self.path,
                    valid_len = self.valid_len,
                    "Dropping incomplete record at the end of the WAL"
                );
                self.torn_tail = true;
                self.reader = None;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Read all remaining records into a vector
    pub fn read_all(&mut self) -> Result<Vec<Record<T>>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }

    /// True if the log ended with an incomplete record
    pub fn has_torn_tail(&self) -> bool {
        self.torn_tail
    }

    /// Byte length of the log up to the end of the last complete record
    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    /// Number of records read so far
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Iterator implementation for WalReader
impl<T: Entity, C: Coder> Iterator for WalReader<T, C> {
    type Item = Result<Record<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_next() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
