// Stream coders - turn serde values into bytes on a sink and back
//
// Every coder honours the same contract on the read side:
// - Ok(None)               the source ended cleanly before a record started
// - Err(InsufficientData)  the source ended inside a record (torn append)
// - Err(Corruption)        the bytes are there but malformed
//
// Binary frame format:
// [length: u32 LE] [crc32(length): u32 LE] [bincode payload] [crc32(payload): u32 LE]
//
// The header carries its own checksum so that a damaged length is reported
// as corruption instead of looking like a record cut short at the tail.

use crate::error::{Error, Result};
use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{BufRead, ErrorKind, Write};

/// Largest payload a single binary frame may carry (16 MB)
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Serialization capability shared by the WAL and snapshot files.
pub trait Coder: Clone + Send + Sync + 'static {
    /// Encode one value and append it to `sink`.
    ///
    /// The encoded bytes are handed to the sink in a single `write_all`.
    fn write<V: Serialize + ?Sized>(&self, value: &V, sink: &mut dyn Write) -> Result<()>;

    /// Decode the next value from `source`, or `None` at a clean end of stream.
    fn next<V: DeserializeOwned>(&self, source: &mut dyn BufRead) -> Result<Option<V>>;
}

/// Returns true when the source has no bytes left.
fn at_end(source: &mut dyn BufRead) -> Result<bool> {
    Ok(source.fill_buf()?.is_empty())
}

fn checksum(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

fn read_full(source: &mut dyn BufRead, buf: &mut [u8]) -> Result<()> {
    source.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            Error::InsufficientData
        } else {
            Error::Io(e)
        }
    })
}

/// Length-prefixed, checksummed bincode frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BinaryCoder;

impl Coder for BinaryCoder {
    fn write<V: Serialize + ?Sized>(&self, value: &V, sink: &mut dyn Write) -> Result<()> {
        let payload = bincode::serialize(value)
            .map_err(|e| Error::Serialization(format!("Failed to serialize payload: {}", e)))?;

        if payload.len() > MAX_FRAME_LEN {
            return Err(Error::Serialization(format!(
                "Record too large: {} bytes",
                payload.len()
            )));
        }

        let len_bytes = (payload.len() as u32).to_le_bytes();

        let mut frame = Vec::with_capacity(8 + payload.len() + 4);
        frame.extend_from_slice(&len_bytes);
        frame.extend_from_slice(&checksum(&len_bytes).to_le_bytes());
        frame.extend_from_slice(&payload);
        frame.extend_from_slice(&checksum(&payload).to_le_bytes());

        sink.write_all(&frame)?;
        Ok(())
    }

    fn next<V: DeserializeOwned>(&self, source: &mut dyn BufRead) -> Result<Option<V>> {
        if at_end(source)? {
            return Ok(None);
        }

        let mut header = [0u8; 8];
        read_full(source, &mut header)?;
        let (len_bytes, len_crc) = header.split_at(4);

        let expected_len_crc = u32::from_le_bytes([len_crc[0], len_crc[1], len_crc[2], len_crc[3]]);
        let actual_len_crc = checksum(len_bytes);
        if actual_len_crc != expected_len_crc {
            return Err(Error::Corruption(format!(
                "Frame header CRC mismatch: expected {}, got {}",
                expected_len_crc, actual_len_crc
            )));
        }

        let length = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]) as usize;
        if length > MAX_FRAME_LEN {
            return Err(Error::Corruption(format!(
                "Record length too large: {} bytes",
                length
            )));
        }

        let mut data = vec![0u8; length + 4];
        read_full(source, &mut data)?;

        let (payload, crc_bytes) = data.split_at(length);
        let expected_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let actual_crc = checksum(payload);
        if actual_crc != expected_crc {
            return Err(Error::Corruption(format!(
                "CRC mismatch: expected {}, got {}",
                expected_crc, actual_crc
            )));
        }

        bincode::deserialize(payload)
            .map(Some)
            .map_err(|e| Error::Corruption(format!("Failed to deserialize payload: {}", e)))
    }
}

/// One JSON document per line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonCoder;

impl Coder for JsonCoder {
    fn write<V: Serialize + ?Sized>(&self, value: &V, sink: &mut dyn Write) -> Result<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|e| Error::Serialization(format!("Failed to serialize JSON: {}", e)))?;
        line.push(b'\n');
        sink.write_all(&line)?;
        Ok(())
    }

    fn next<V: DeserializeOwned>(&self, source: &mut dyn BufRead) -> Result<Option<V>> {
        loop {
            let mut line = Vec::new();
            if source.read_until(b'\n', &mut line)? == 0 {
                return Ok(None);
            }
            // A line is only complete once its newline made it to disk
            if !line.ends_with(b"\n") {
                return Err(Error::InsufficientData);
            }

            let text = line.trim_ascii();
            if text.is_empty() {
                continue;
            }

            return serde_json::from_slice(text)
                .map(Some)
                .map_err(|e| Error::Corruption(format!("Invalid JSON record: {}", e)));
        }
    }
}

/// MessagePack with named struct fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessagePackCoder;

impl Coder for MessagePackCoder {
    fn write<V: Serialize + ?Sized>(&self, value: &V, sink: &mut dyn Write) -> Result<()> {
        let bytes = rmp_serde::to_vec_named(value)
            .map_err(|e| Error::Serialization(format!("Failed to serialize MessagePack: {}", e)))?;
        sink.write_all(&bytes)?;
        Ok(())
    }

    fn next<V: DeserializeOwned>(&self, source: &mut dyn BufRead) -> Result<Option<V>> {
        use rmp_serde::decode::Error as DecodeError;

        if at_end(source)? {
            return Ok(None);
        }

        match rmp_serde::from_read::<_, V>(&mut *source) {
            Ok(value) => Ok(Some(value)),
            Err(DecodeError::InvalidMarkerRead(e) | DecodeError::InvalidDataRead(e)) => {
                if e.kind() == ErrorKind::UnexpectedEof {
                    Err(Error::InsufficientData)
                } else {
                    Err(Error::Io(e))
                }
            }
            Err(e) => Err(Error::Corruption(format!("Invalid MessagePack record: {}", e))),
        }
    }
}

/// Runtime-selectable coder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Codec {
    /// [`BinaryCoder`]
    #[default]
    Binary,
    /// [`JsonCoder`]
    Json,
    /// [`MessagePackCoder`]
    MessagePack,
}

impl Coder for Codec {
    fn write<V: Serialize + ?Sized>(&self, value: &V, sink: &mut dyn Write) -> Result<()> {
        match self {
            Codec::Binary => BinaryCoder.write(value, sink),
            Codec::Json => JsonCoder.write(value, sink),
            Codec::MessagePack => MessagePackCoder.write(value, sink),
        }
    }

    fn next<V: DeserializeOwned>(&self, source: &mut dyn BufRead) -> Result<Option<V>> {
        match self {
            Codec::Binary => BinaryCoder.next(source),
            Codec::Json => JsonCoder.next(source),
            Codec::MessagePack => MessagePackCoder.next(source),
        }
    }
}
