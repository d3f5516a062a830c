//! Little-endian field helpers shared by the artifact codecs
//!
//! Short reads are reported as format errors, since they mean the artifact
//! is truncated rather than that the disk failed.

use std::io::{self, Read, Write};

use crate::error::{StowawayError, StowawayResult};

fn read_array<const N: usize, R: Read>(reader: &mut R, what: &str) -> StowawayResult<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, what))?;
    Ok(buf)
}

/// Map an unexpected EOF to a format error naming the missing field
pub fn truncated(err: io::Error, what: &str) -> StowawayError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        StowawayError::Format(format!("truncated artifact while reading {}", what))
    } else {
        StowawayError::Io(format!("Failed to read {}: {}", what, err))
    }
}

pub fn read_u8<R: Read>(reader: &mut R, what: &str) -> StowawayResult<u8> {
    Ok(read_array::<1, _>(reader, what)?[0])
}

pub fn read_u32<R: Read>(reader: &mut R, what: &str) -> StowawayResult<u32> {
    Ok(u32::from_le_bytes(read_array(reader, what)?))
}

pub fn read_u64<R: Read>(reader: &mut R, what: &str) -> StowawayResult<u64> {
    Ok(u64::from_le_bytes(read_array(reader, what)?))
}

pub fn read_bytes<R: Read>(reader: &mut R, len: usize, what: &str) -> StowawayResult<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| truncated(e, what))?;
    Ok(buf)
}

pub fn write_u32<W: Write>(writer: &mut W, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn write_u64<W: Write>(writer: &mut W, value: u64) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}
