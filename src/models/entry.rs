//! Backup record model
//!
//! A `BackupEntry` describes one completed backup: where the data came from,
//! where the artifact lives and which pipeline stages produced it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::EntryId;

/// Timestamp layout used for `backup_time`. Fixed width, so string order is
/// chronological order.
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Format a timestamp the way backup records store it
pub fn format_backup_time(at: DateTime<Utc>) -> String {
    at.format(BACKUP_TIME_FORMAT).to_string()
}

/// Fresh artifact base name, e.g. `backup-20250301-100000-123-1a2b3c4d`
pub fn new_artifact_stem() -> String {
    let now = Utc::now();
    format!(
        "backup-{}-{:03}-{}",
        now.format("%Y%m%d-%H%M%S"),
        now.timestamp_subsec_millis(),
        EntryId::new().short()
    )
}

/// Metadata for one backup operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupEntry {
    /// Generated unique key
    #[serde(default)]
    pub id: EntryId,

    /// Name of the (first) source file or directory
    pub file_name: String,

    /// Absolute path of the (first) source root
    pub source_path: PathBuf,

    /// Further source roots bundled into the same artifact
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_sources: Vec<PathBuf>,

    /// Directory holding the artifact
    #[serde(rename = "destination_dir")]
    pub dest_dir: PathBuf,

    /// File or directory name of the final artifact inside `dest_dir`
    pub artifact_name: String,

    /// When the backup finished, see [`BACKUP_TIME_FORMAT`]
    pub backup_time: String,

    /// `None` on records written without flags; recovery then sniffs the
    /// artifact header instead
    #[serde(rename = "is_encrypted", default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,

    #[serde(rename = "is_packed", default, skip_serializing_if = "Option::is_none")]
    pub packed: Option<bool>,

    #[serde(rename = "is_compressed", default, skip_serializing_if = "Option::is_none")]
    pub compressed: Option<bool>,

    /// CRC32 of the final artifact as 8 hex digits (single-file artifacts only)
    #[serde(default)]
    pub checksum: Option<String>,
}

impl BackupEntry {
    /// Full path of the stored artifact
    pub fn artifact_path(&self) -> PathBuf {
        self.dest_dir.join(&self.artifact_name)
    }

    /// All source roots covered by this backup, first one first
    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.source_path.as_path())
            .chain(self.additional_sources.iter().map(PathBuf::as_path))
    }

    /// Whether this record matches the legacy (name, time) identity
    pub fn same_key(&self, file_name: &str, backup_time: &str) -> bool {
        self.file_name == file_name && self.backup_time == backup_time
    }

    /// Short human summary of the enabled stages, e.g. "pack+compress"
    pub fn stages_label(&self) -> String {
        let mut stages = Vec::new();
        if self.packed == Some(true) {
            stages.push("pack");
        }
        if self.compressed == Some(true) {
            stages.push("compress");
        }
        if self.encrypted == Some(true) {
            stages.push("encrypt");
        }
        if stages.is_empty() {
            if self.packed.is_none() && self.compressed.is_none() && self.encrypted.is_none() {
                return "unknown".to_string();
            }
            return "mirror".to_string();
        }
        stages.join("+")
    }
}
