//! Framed codec for snapshot files.
//!
//! Format:
//! ```text
//! [magic: "FKG1"][version: 1 byte][length: 4 bytes LE][data: N bytes JSON][crc32: 4 bytes LE]
//! ```

use std::io::{ErrorKind, Read, Write};

use crc32fast::Hasher;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{KgError, KgResult};

/// Current codec version.
pub const CODEC_VERSION: u8 = 1;

/// Magic bytes identifying snapshot files.
pub const MAGIC: [u8; 4] = *b"FKG1";

const MAX_ENTRY_SIZE: usize = 256 * 1024 * 1024;

fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Writes one framed value.
pub fn encode<T: Serialize>(value: &T, writer: &mut impl Write) -> KgResult<()> {
    let data = serde_json::to_vec(value).map_err(|e| KgError::internal(format!("serialization failed: {e}")))?;
    let len = u32::try_from(data.len())
        .ok()
        .filter(|&n| n as usize <= MAX_ENTRY_SIZE)
        .ok_or_else(|| KgError::internal(format!("snapshot of {} bytes is too large", data.len())))?;

    writer.write_all(&MAGIC)?;
    writer.write_all(&[CODEC_VERSION])?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&data)?;
    writer.write_all(&checksum(&data).to_le_bytes())?;
    Ok(())
}

/// Encodes into a fresh buffer.
pub fn to_bytes<T: Serialize>(value: &T) -> KgResult<Vec<u8>> {
    let mut out = Vec::new();
    encode(value, &mut out)?;
    Ok(out)
}

fn read_exact(reader: &mut impl Read, buf: &mut [u8], what: &str) -> KgResult<()> {
    reader.read_exact(buf).map_err(|e| {
        if e.kind() == ErrorKind::UnexpectedEof {
            KgError::malformed(format!("truncated {what}"))
        } else {
            KgError::Io(e)
        }
    })
}

/// Reads one framed value, verifying magic, version, length and checksum.
pub fn decode<T: DeserializeOwned>(reader: &mut impl Read) -> KgResult<T> {
    let mut magic = [0u8; 4];
    read_exact(reader, &mut magic, "header")?;
    if magic != MAGIC {
        return Err(KgError::malformed(format!(
            "invalid magic bytes: expected {MAGIC:?}, got {magic:?}"
        )));
    }

    let mut version = [0u8; 1];
    read_exact(reader, &mut version, "header")?;
    if version[0] != CODEC_VERSION {
        return Err(KgError::malformed(format!(
            "unsupported codec version: {} (expected {CODEC_VERSION})",
            version[0]
        )));
    }

    let mut len_bytes = [0u8; 4];
    read_exact(reader, &mut len_bytes, "header")?;
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_ENTRY_SIZE {
        return Err(KgError::malformed(format!(
            "entry size {len} exceeds maximum {MAX_ENTRY_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    read_exact(reader, &mut data, "payload")?;

    let mut crc_bytes = [0u8; 4];
    read_exact(reader, &mut crc_bytes, "checksum")?;
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = checksum(&data);
    if stored != computed {
        return Err(KgError::malformed(format!(
            "CRC mismatch: stored={stored:08x}, computed={computed:08x}"
        )));
    }

    serde_json::from_slice(&data).map_err(|e| KgError::malformed(format!("deserialization failed: {e}")))
}
