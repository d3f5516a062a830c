//! Single-file compression
//!
//! Compressed artifacts start with a fixed 24-byte header followed by the
//! algorithm's own payload:
//!
//! ```text
//! u8  flag             0x01
//! u8  algorithm        CompressionAlgorithm id
//! u8  valid bits       unused (padding) bits in the final payload byte
//! u8  reserved         0
//! u32 header size      24
//! u32 table size       bytes of symbol table following the header
//! u64 original size    uncompressed length
//! u32 crc32            CRC-32 of the uncompressed bytes
//! ```
//!
//! Integers are little-endian.

pub mod crc32;
mod huffman;

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::binio::{read_u32, read_u64, read_u8, write_u32, write_u64};
use crate::error::{StowawayError, StowawayResult};

pub use huffman::{HuffmanTree, MAX_SYMBOLS};

/// Leading byte of every compressed artifact
pub const COMPRESS_FLAG: u8 = 0x01;

/// Size of the fixed header
pub const HEADER_SIZE: u32 = 24;

/// Streaming chunk size; memory use does not grow with input size
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Supported codecs. The discriminant is the id written to byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionAlgorithm {
    Huffman = 0x02,
}

impl CompressionAlgorithm {
    pub const ALL: [CompressionAlgorithm; 1] = [CompressionAlgorithm::Huffman];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionAlgorithm::Huffman => "huffman",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CompressionAlgorithm::Huffman => "huff",
        }
    }

    /// Names accepted on the command line
    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|a| a.name()).collect()
    }

    /// Compress `src` into `dest_dir/<file name>.<ext>` and return that path
    pub fn compress_file(self, src: &Path, dest_dir: &Path) -> StowawayResult<PathBuf> {
        let file_name = src
            .file_name()
            .ok_or_else(|| StowawayError::Validation(format!("{} has no file name", src.display())))?;
        let mut name = file_name.to_os_string();
        name.push(".");
        name.push(self.extension());
        let dest = dest_dir.join(name);
        self.compress_to(src, &dest)?;
        Ok(dest)
    }

    /// Compress `src` into exactly `dest`
    pub fn compress_to(self, src: &Path, dest: &Path) -> StowawayResult<CompressedHeader> {
        match self {
            CompressionAlgorithm::Huffman => huffman::compress_file(src, dest),
        }
    }

    /// Decompress `src` into `dest`. Nothing is left at `dest` on failure.
    pub fn decompress_file(self, src: &Path, dest: &Path) -> StowawayResult<CompressedHeader> {
        match self {
            CompressionAlgorithm::Huffman => huffman::decompress_file(src, dest),
        }
    }

    pub fn compress_bytes(self, data: &[u8]) -> StowawayResult<Vec<u8>> {
        match self {
            CompressionAlgorithm::Huffman => huffman::compress_bytes(data),
        }
    }

    pub fn decompress_bytes(self, data: &[u8]) -> StowawayResult<Vec<u8>> {
        match self {
            CompressionAlgorithm::Huffman => huffman::decompress_bytes(data),
        }
    }
}

impl fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionAlgorithm {
    type Err = StowawayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                StowawayError::Validation(format!(
                    "Unknown compression type '{}'. Supported: {}",
                    s,
                    Self::supported_names().join(", ")
                ))
            })
    }
}

/// Fixed header of a compressed artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedHeader {
    pub algorithm: CompressionAlgorithm,
    /// Padding bits in the final payload byte (0 when the last byte is full)
    pub valid_bits: u8,
    pub header_size: u32,
    pub freq_table_size: u32,
    pub original_size: u64,
    pub crc32: u32,
}

impl CompressedHeader {
    pub fn new(algorithm: CompressionAlgorithm, freq_table_size: u32, original_size: u64) -> Self {
        Self {
            algorithm,
            valid_bits: 0,
            header_size: HEADER_SIZE,
            freq_table_size,
            original_size,
            crc32: 0,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        out.write_all(&[COMPRESS_FLAG, self.algorithm.id(), self.valid_bits, 0])?;
        write_u32(out, self.header_size)?;
        write_u32(out, self.freq_table_size)?;
        write_u64(out, self.original_size)?;
        write_u32(out, self.crc32)
    }

    /// Read and validate a header, requiring `expected` as the algorithm
    pub fn read_from<R: Read>(reader: &mut R, expected: CompressionAlgorithm) -> StowawayResult<Self> {
        let flag = read_u8(reader, "compression flag")?;
        if flag != COMPRESS_FLAG {
            return Err(StowawayError::Format(format!(
                "not a compressed artifact (flag byte {:#04x})",
                flag
            )));
        }
        let id = read_u8(reader, "compression algorithm")?;
        if id != expected.id() {
            return Err(StowawayError::Format(format!(
                "compressed with algorithm id {:#04x}, expected {} ({:#04x})",
                id,
                expected,
                expected.id()
            )));
        }
        let valid_bits = read_u8(reader, "valid bits")?;
        let _reserved = read_u8(reader, "reserved byte")?;
        let header_size = read_u32(reader, "header size")?;
        let freq_table_size = read_u32(reader, "frequency table size")?;
        let original_size = read_u64(reader, "original size")?;
        let crc32 = read_u32(reader, "crc32")?;

        if header_size != HEADER_SIZE {
            return Err(StowawayError::Format(format!(
                "unexpected header size {} (expected {})",
                header_size, HEADER_SIZE
            )));
        }
        if valid_bits > 7 {
            return Err(StowawayError::Format(format!(
                "invalid padding bit count {}",
                valid_bits
            )));
        }

        Ok(Self {
            algorithm: expected,
            valid_bits,
            header_size,
            freq_table_size,
            original_size,
            crc32,
        })
    }
}

/// Read just the header of a compressed artifact on disk
pub fn read_header(path: &Path) -> StowawayResult<CompressedHeader> {
    let mut file = std::fs::File::open(path)?;
    let mut prefix = [0u8; 2];
    file.read_exact(&mut prefix)
        .map_err(|e| crate::binio::truncated(e, "compression header"))?;
    let algorithm = CompressionAlgorithm::from_id(prefix[1]).ok_or_else(|| {
        StowawayError::Format(format!("unknown compression algorithm id {:#04x}", prefix[1]))
    })?;
    let mut reader = std::io::Cursor::new(prefix).chain(file);
    CompressedHeader::read_from(&mut reader, algorithm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_ids_are_distinct_from_archive() {
        assert_eq!(CompressionAlgorithm::Huffman.id(), 0x02);
        assert_ne!(
            CompressionAlgorithm::Huffman.id(),
            crate::archive::ArchiveAlgorithm::Basic.id()
        );
        assert_eq!(CompressionAlgorithm::from_id(0x02), Some(CompressionAlgorithm::Huffman));
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(
            "Huffman".parse::<CompressionAlgorithm>().unwrap(),
            CompressionAlgorithm::Huffman
        );
        assert!("gzip".parse::<CompressionAlgorithm>().unwrap_err().is_validation());
    }

    #[test]
    fn test_header_layout() {
        let mut header = CompressedHeader::new(CompressionAlgorithm::Huffman, 18, 13);
        header.valid_bits = 3;
        header.crc32 = 0xEC4A_C3D0;
        let mut raw = Vec::new();
        header.write_to(&mut raw).unwrap();

        assert_eq!(raw.len(), HEADER_SIZE as usize);
        assert_eq!(&raw[..4], &[0x01, 0x02, 3, 0]);
        assert_eq!(u32::from_le_bytes(raw[4..8].try_into().unwrap()), 24);
        assert_eq!(u32::from_le_bytes(raw[8..12].try_into().unwrap()), 18);
        assert_eq!(u64::from_le_bytes(raw[12..20].try_into().unwrap()), 13);
        assert_eq!(u32::from_le_bytes(raw[20..24].try_into().unwrap()), 0xEC4A_C3D0);

        let parsed =
            CompressedHeader::read_from(&mut raw.as_slice(), CompressionAlgorithm::Huffman).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn test_header_rejects_wrong_flag() {
        let raw = [0u8; 24];
        let err = CompressedHeader::read_from(&mut &raw[..], CompressionAlgorithm::Huffman)
            .unwrap_err();
        assert!(matches!(err, StowawayError::Format(_)));
    }
}
