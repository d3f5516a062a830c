//! Path management for Stowaway
//!
//! ## Path Resolution Order
//!
//! 1. `STOWAWAY_HOME` environment variable (if set)
//! 2. The platform config directory for "stowaway"
//!    (`~/.config/stowaway` on Linux, `%APPDATA%\stowaway\config` on Windows)

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::error::StowawayError;

/// Environment variable overriding the base directory
pub const HOME_ENV: &str = "STOWAWAY_HOME";

/// Manages all paths used by Stowaway
#[derive(Debug, Clone)]
pub struct StowawayPaths {
    base_dir: PathBuf,
}

impl StowawayPaths {
    /// Resolve the base directory from the environment or platform defaults
    ///
    /// # Errors
    ///
    /// Returns a config error if no home directory can be determined.
    pub fn new() -> Result<Self, StowawayError> {
        let base_dir = match std::env::var_os(HOME_ENV) {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => ProjectDirs::from("", "", "stowaway")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| {
                    StowawayError::Config("Could not determine a home directory".into())
                })?,
        };
        Ok(Self { base_dir })
    }

    /// Use a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn records_file(&self) -> PathBuf {
        self.base_dir.join("records.json")
    }

    /// Default repository root, used unless settings or `--repo` override it
    pub fn repository_dir(&self) -> PathBuf {
        self.base_dir.join("repository")
    }

    pub fn ensure_directories(&self) -> Result<(), StowawayError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| StowawayError::Io(format!("Failed to create base directory: {}", e)))
    }
}
