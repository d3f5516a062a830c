//! Per-call backup options

use std::collections::HashSet;
use std::path::PathBuf;

use crate::archive::ArchiveAlgorithm;
use crate::compress::CompressionAlgorithm;
use crate::config::settings::DEFAULT_COMPRESSION_LEVEL;
use crate::error::{StowawayError, StowawayResult};

/// Accepted compression levels
pub const COMPRESSION_LEVELS: std::ops::RangeInclusive<u8> = 1..=9;

/// What to back up and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOptions {
    /// Files or directories to back up
    pub sources: Vec<PathBuf>,
    /// Artifact directory, relative to the repository root unless absolute
    pub destination: PathBuf,
    /// Descend into subdirectories
    pub recursive: bool,
    pub follow_symlinks: bool,
    /// File name patterns a file must match (any of) to be selected
    pub include: Vec<String>,
    /// File or directory name patterns that are skipped
    pub exclude: Vec<String>,
    /// `None` copies the files as they are (mirror mode)
    pub pack: Option<ArchiveAlgorithm>,
    pub compression: Option<CompressionAlgorithm>,
    /// 1 (fast) to 9 (small). Huffman coding has a single level and only
    /// records it.
    pub compression_level: u8,
    pub encrypt: bool,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            destination: PathBuf::new(),
            recursive: true,
            follow_symlinks: false,
            include: Vec::new(),
            exclude: Vec::new(),
            pack: None,
            compression: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            encrypt: false,
        }
    }
}

impl BackupOptions {
    pub fn new<I, P>(sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            sources: sources.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_destination(mut self, destination: impl Into<PathBuf>) -> Self {
        self.destination = destination.into();
        self
    }

    pub fn with_pack(mut self, pack: ArchiveAlgorithm) -> Self {
        self.pack = Some(pack);
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_level(mut self, level: u8) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_encryption(mut self) -> Self {
        self.encrypt = true;
        self
    }

    pub fn is_mirror(&self) -> bool {
        self.pack.is_none()
    }

    /// Whether the mirror output of these sources is a single file
    fn mirrors_single_file(&self) -> bool {
        self.sources.len() == 1 && self.sources[0].is_file()
    }

    /// Check the options against each other and the file system
    pub fn validate(&self) -> StowawayResult<()> {
        if self.sources.is_empty() {
            return Err(StowawayError::Validation(
                "At least one source path is required".into(),
            ));
        }

        if !COMPRESSION_LEVELS.contains(&self.compression_level) {
            return Err(StowawayError::Validation(format!(
                "Compression level must be between {} and {}, got {}",
                COMPRESSION_LEVELS.start(),
                COMPRESSION_LEVELS.end(),
                self.compression_level
            )));
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.as_os_str().is_empty() {
                return Err(StowawayError::Validation("Source path is empty".into()));
            }
            if !source.exists() {
                return Err(StowawayError::file_not_found(source.display().to_string()));
            }
            let name = source_name(source)?;
            if !names.insert(name.clone()) {
                return Err(StowawayError::Validation(format!(
                    "Two sources are both named '{}'; back them up separately",
                    name
                )));
            }
        }

        if self.is_mirror()
            && (self.compression.is_some() || self.encrypt)
            && !self.mirrors_single_file()
        {
            return Err(StowawayError::Validation(
                "Compression and encryption need a single file; use --pack for directories or several sources"
                    .into(),
            ));
        }

        for pattern in self.include.iter().chain(&self.exclude) {
            if pattern.trim().is_empty() {
                return Err(StowawayError::Validation("Empty filter pattern".into()));
            }
        }

        Ok(())
    }
}

/// Final path component of a source root, as used in archive names
pub(crate) fn source_name(path: &std::path::Path) -> StowawayResult<String> {
    let resolved;
    let path = if path.file_name().is_none() {
        resolved = path.canonicalize()?;
        resolved.as_path()
    } else {
        path
    };
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            StowawayError::Validation(format!(
                "Source {} has no usable UTF-8 name",
                path.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let options = BackupOptions::new(["a"]);
        assert!(options.recursive);
        assert!(options.is_mirror());
        assert_eq!(options.compression_level, 6);
    }

    #[test]
    fn test_requires_sources() {
        let err = BackupOptions::default().validate().unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_missing_source_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = BackupOptions::new([temp.path().join("missing")])
            .validate()
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_level_range() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();

        for level in [0u8, 10] {
            let err = BackupOptions::new([&file]).with_level(level).validate().unwrap_err();
            assert!(err.is_validation());
        }
        for level in [1u8, 9] {
            BackupOptions::new([&file]).with_level(level).validate().unwrap();
        }
    }

    #[test]
    fn test_mirror_directory_cannot_be_compressed() {
        let temp = TempDir::new().unwrap();
        let err = BackupOptions::new([temp.path()])
            .with_compression(CompressionAlgorithm::Huffman)
            .validate()
            .unwrap_err();
        assert!(err.is_validation());

        BackupOptions::new([temp.path()])
            .with_pack(ArchiveAlgorithm::Basic)
            .with_compression(CompressionAlgorithm::Huffman)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_mirror_single_file_can_be_compressed() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        BackupOptions::new([&file])
            .with_compression(CompressionAlgorithm::Huffman)
            .validate()
            .unwrap();
    }

    #[test]
    fn test_duplicate_source_names() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("x/data")).unwrap();
        fs::create_dir_all(temp.path().join("y/data")).unwrap();
        let err = BackupOptions::new([temp.path().join("x/data"), temp.path().join("y/data")])
            .with_pack(ArchiveAlgorithm::Basic)
            .validate()
            .unwrap_err();
        assert!(err.is_validation());
    }
}
