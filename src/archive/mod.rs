//! Multi-file archive container
//!
//! Bundles an ordered list of files into one artifact with a metadata block
//! up front, so single members can be located by offset.
//!
//! # Format
//!
//! All integers are little-endian:
//!
//! ```text
//! u8  flag       0x01
//! u8  algorithm  ArchiveAlgorithm id
//! u32 file count
//! per file: u32 name length | name (UTF-8) | u64 size | u64 offset
//! file contents, in metadata order, at their offsets
//! ```
//!
//! Stored names are relative `/`-separated paths; unpacking joins them
//! beneath the caller's destination directory.

mod basic;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{StowawayError, StowawayResult};

pub use basic::{header_len, ArchiveIndex, FileMeta};

/// Leading byte of every archive
pub const ARCHIVE_FLAG: u8 = 0x01;

/// Supported archive layouts. The discriminant is the id written to byte 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveAlgorithm {
    Basic = 0x01,
}

impl ArchiveAlgorithm {
    pub const ALL: [ArchiveAlgorithm; 1] = [ArchiveAlgorithm::Basic];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.id() == id)
    }

    pub fn name(self) -> &'static str {
        match self {
            ArchiveAlgorithm::Basic => "basic",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveAlgorithm::Basic => "pak",
        }
    }

    /// Names accepted on the command line
    pub fn supported_names() -> Vec<&'static str> {
        Self::ALL.iter().map(|a| a.name()).collect()
    }

    /// Bundle `members` into a new archive inside `dest_dir`
    ///
    /// Returns the path of the created artifact. On failure nothing is left
    /// behind at that path.
    pub fn pack(self, members: &[ArchiveMember], dest_dir: &Path) -> StowawayResult<PathBuf> {
        match self {
            ArchiveAlgorithm::Basic => basic::pack(self, members, dest_dir),
        }
    }

    /// Extract every member of `src` beneath `dest_dir`
    ///
    /// Returns the paths written, in archive order.
    pub fn unpack(self, src: &Path, dest_dir: &Path) -> StowawayResult<Vec<PathBuf>> {
        match self {
            ArchiveAlgorithm::Basic => basic::unpack(self, src, dest_dir),
        }
    }

    /// Validate the header of `src` and return its metadata without extracting
    pub fn read_index(self, src: &Path) -> StowawayResult<ArchiveIndex> {
        match self {
            ArchiveAlgorithm::Basic => basic::read_index(self, src),
        }
    }
}

impl fmt::Display for ArchiveAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArchiveAlgorithm {
    type Err = StowawayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                StowawayError::Validation(format!(
                    "Unknown pack type '{}'. Supported: {}",
                    s,
                    Self::supported_names().join(", ")
                ))
            })
    }
}

/// One file to be archived
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// Where the content is read from
    pub path: PathBuf,
    /// Relative name recorded in the archive
    pub name: String,
}

impl ArchiveMember {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_ids() {
        assert_eq!(ArchiveAlgorithm::Basic.id(), 0x01);
        assert_eq!(ArchiveAlgorithm::from_id(0x01), Some(ArchiveAlgorithm::Basic));
        assert_eq!(ArchiveAlgorithm::from_id(0x02), None);
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("basic".parse::<ArchiveAlgorithm>().unwrap(), ArchiveAlgorithm::Basic);
        assert_eq!("BASIC".parse::<ArchiveAlgorithm>().unwrap(), ArchiveAlgorithm::Basic);
        let err = "tar".parse::<ArchiveAlgorithm>().unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("basic"));
    }
}
