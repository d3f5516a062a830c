//! User settings for Stowaway
//!
//! Repository location, backup defaults, logging and encryption state.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::StowawayPaths;
use crate::archive::ArchiveAlgorithm;
use crate::compress::CompressionAlgorithm;
use crate::crypto::{EncryptedData, KeyDerivationParams};
use crate::error::StowawayError;
use crate::storage::file_io::{read_json, write_json_atomic};

/// Default compression level
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 6;

/// Encryption settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncryptionSettings {
    /// Encrypt new backups unless told otherwise
    #[serde(default)]
    pub enabled: bool,

    /// Argon2 costs (and the salt of the verification token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_params: Option<KeyDerivationParams>,

    /// A known string encrypted with the passphrase, to check it on entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<EncryptedData>,
}

/// User settings for Stowaway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Where relative backup destinations are anchored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_root: Option<PathBuf>,

    /// Packing used when `backup` is given no `--pack`
    #[serde(default)]
    pub default_pack: Option<ArchiveAlgorithm>,

    /// Compression used when `backup` is given no `--compress`
    #[serde(default)]
    pub default_compression: Option<CompressionAlgorithm>,

    #[serde(default = "default_compression_level")]
    pub compression_level: u8,

    /// tracing filter directive, e.g. "info" or "stowaway=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub encryption: EncryptionSettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_compression_level() -> u8 {
    DEFAULT_COMPRESSION_LEVEL
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            repository_root: None,
            default_pack: None,
            default_compression: None,
            compression_level: default_compression_level(),
            log_level: default_log_level(),
            encryption: EncryptionSettings::default(),
        }
    }
}

impl Settings {
    pub fn is_encryption_enabled(&self) -> bool {
        self.encryption.enabled
    }

    /// Repository root: the configured override, else the default under the
    /// base directory
    pub fn repository_root(&self, paths: &StowawayPaths) -> PathBuf {
        self.repository_root
            .clone()
            .unwrap_or_else(|| paths.repository_dir())
    }

    /// Load settings from disk, or defaults if the file doesn't exist
    pub fn load_or_create(paths: &StowawayPaths) -> Result<Self, StowawayError> {
        read_json(paths.settings_file()).map_err(|e| match e {
            StowawayError::Storage(msg) => StowawayError::Config(msg),
            other => other,
        })
    }

    pub fn save(&self, paths: &StowawayPaths) -> Result<(), StowawayError> {
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }
}
