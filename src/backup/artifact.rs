//! Artifact identification by leading bytes

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::archive::{ArchiveAlgorithm, ARCHIVE_FLAG};
use crate::compress::{CompressionAlgorithm, COMPRESS_FLAG};
use crate::crypto::{CipherAlgorithm, CIPHER_FLAG};
use crate::error::StowawayResult;

/// What a stored artifact is, judged from its first two bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// A mirrored directory tree
    Directory,
    Archive(ArchiveAlgorithm),
    Compressed(CompressionAlgorithm),
    Encrypted(CipherAlgorithm),
    /// Any other file
    Plain,
}

impl ArtifactKind {
    pub fn sniff(path: &Path) -> StowawayResult<Self> {
        if path.is_dir() {
            return Ok(Self::Directory);
        }
        let mut prefix = [0u8; 2];
        let mut file = File::open(path)?;
        let mut filled = 0;
        while filled < prefix.len() {
            let n = file.read(&mut prefix[filled..])?;
            if n == 0 {
                return Ok(Self::Plain);
            }
            filled += n;
        }
        Ok(Self::from_prefix(prefix))
    }

    pub fn from_prefix([flag, id]: [u8; 2]) -> Self {
        if flag == ARCHIVE_FLAG {
            if let Some(algorithm) = ArchiveAlgorithm::from_id(id) {
                return Self::Archive(algorithm);
            }
        }
        if flag == COMPRESS_FLAG {
            if let Some(algorithm) = CompressionAlgorithm::from_id(id) {
                return Self::Compressed(algorithm);
            }
        }
        if flag == CIPHER_FLAG {
            if let Some(algorithm) = CipherAlgorithm::from_id(id) {
                return Self::Encrypted(algorithm);
            }
        }
        Self::Plain
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => write!(f, "mirrored directory"),
            Self::Archive(a) => write!(f, "archive ({})", a),
            Self::Compressed(a) => write!(f, "compressed ({})", a),
            Self::Encrypted(a) => write!(f, "encrypted ({})", a),
            Self::Plain => write!(f, "plain file"),
        }
    }
}
