//! # Coffer Snapshot
//!
//! Full-state snapshot files for Coffer containers.
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
//! A snapshot bounds how much WAL a restore has to replay. It is written
//! next to the container's log as a single file:
//!
//! ```text
//! [SnapshotMeta] [value 1] [value 2] ... [value N]     (N = meta.entries)
//! ```
//!
//! Every piece is encoded with the container's coder. The file is first
//! written to `snapshot.tmp`, synced, then renamed over `snapshot`, so a
//! reader only ever sees a complete previous or a complete new snapshot.

use coffer_core::format_version::{magic, snapshot_version, SNAPSHOT_FORMAT_VERSION};
use coffer_core::{Coder, Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Snapshot file name inside a container directory
pub const SNAPSHOT_FILE: &str = "snapshot";

/// Scratch file a snapshot is written to before being renamed into place
pub const SNAPSHOT_TMP_FILE: &str = "snapshot.tmp";

/// Snapshot header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    /// Must equal [`magic::SNAPSHOT`]
    pub magic: u32,
    /// Format version the file was written with
    pub version: u16,
    /// Name of the entity type stored in the file
    pub entity: String,
    /// Number of values following the header
    pub entries: u64,
    /// Timestamp when the snapshot was created (Unix milliseconds)
    pub created_at_ms: u64,
}

impl SnapshotMeta {
    fn new(entity: &str, entries: u64) -> Self {
        let created_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        Self {
            magic: magic::SNAPSHOT,
            version: SNAPSHOT_FORMAT_VERSION,
            entity: entity.to_string(),
            entries,
            created_at_ms,
        }
    }

    fn validate(&self, entity: &str) -> Result<()> {
        if self.magic != magic::SNAPSHOT {
            return Err(Error::Corruption(format!(
                "Bad snapshot magic: {:#010x}",
                self.magic
            )));
        }
        if !snapshot_version().can_read(self.version) {
            return Err(Error::Corruption(format!(
                "Unsupported snapshot version: {}",
                self.version
            )));
        }
        if self.entity != entity {
            return Err(Error::Corruption(format!(
                "Snapshot holds '{}' values, expected '{}'",
                self.entity, entity
            )));
        }
        Ok(())
    }
}

/// A snapshot loaded from disk
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Header
    pub meta: SnapshotMeta,
    /// Values in the order they were written
    pub values: Vec<T>,
}

/// Path of the snapshot file for a container directory
pub fn snapshot_path(dir: impl AsRef<Path>) -> PathBuf {
    dir.as_ref().join(SNAPSHOT_FILE)
}

/// Write `values` as the new snapshot of `dir`, atomically replacing any
/// previous one.
pub fn write_snapshot<'a, T, C, I>(
    dir: impl AsRef<Path>,
    coder: &C,
    entity: &str,
    values: I,
) -> Result<SnapshotMeta>
where
    T: Serialize + 'a,
    C: Coder,
    I: ExactSizeIterator<Item = &'a T>,
{
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(SNAPSHOT_TMP_FILE);
    let final_path = dir.join(SNAPSHOT_FILE);
    let meta = SnapshotMeta::new(entity, values.len() as u64);

    if let Err(e) = write_file(&tmp_path, coder, &meta, values) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, &final_path)?;
    sync_dir(dir)?;

    tracing::debug!(entity, entries = meta.entries, path = ?final_path, "Snapshot written");
    Ok(meta)
}

fn write_file<'a, T, C, I>(path: &Path, coder: &C, meta: &SnapshotMeta, values: I) -> Result<()>
where
    T: Serialize + 'a,
    C: Coder,
    I: Iterator<Item = &'a T>,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    coder.write(meta, &mut writer)?;
    for value in values {
        coder.write(value, &mut writer)?;
    }

    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Load the snapshot of `dir`, or `None` if it has never been snapshotted.
///
/// `entity` must match the name the snapshot was written with.
///
/// A snapshot only becomes visible once complete, so any short read here is
/// reported as corruption rather than tolerated like a torn WAL tail.
pub fn load_snapshot<T, C>(
    dir: impl AsRef<Path>,
    coder: &C,
    entity: &str,
) -> Result<Option<Snapshot<T>>>
where
    T: DeserializeOwned,
    C: Coder,
{
    let path = snapshot_path(dir);
    let file = match File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::Io(e)),
    };
    let mut reader = BufReader::new(file);

    let meta: SnapshotMeta = match coder.next(&mut reader) {
        Ok(Some(meta)) => meta,
        Ok(None) | Err(Error::InsufficientData) => {
            return Err(Error::Corruption(format!(
                "Snapshot {:?} has no complete header",
                path
            )))
        }
        Err(e) => return Err(e),
    };
    meta.validate(entity)?;

    let mut values = Vec::with_capacity(meta.entries.min(1 << 20) as usize);
    for read in 0..meta.entries {
        match coder.next::<T>(&mut reader) {
            Ok(Some(value)) => values.push(value),
            Ok(None) | Err(Error::InsufficientData) => {
                return Err(Error::Corruption(format!(
                    "Snapshot {:?} ended after {} of {} entries",
                    path, read, meta.entries
                )))
            }
            Err(e) => return Err(e),
        }
    }

    if !reader.fill_buf()?.is_empty() {
        return Err(Error::Corruption(format!(
            "Snapshot {:?} has trailing data after {} entries",
            path, meta.entries
        )));
    }

    Ok(Some(Snapshot { meta, values }))
}
