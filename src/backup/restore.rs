//! Recovery of backup artifacts
//!
//! Reverses the backup pipeline for one record:
//! locate, verify checksum, decrypt, decompress, then unpack or copy into the
//! restore directory. Intermediate files live in a staging directory inside
//! the restore directory and are removed as soon as the next stage has read
//! them. The stored artifact is never modified.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::artifact::ArtifactKind;
use crate::compress::crc32::checksum_file;
use crate::crypto::Encryptor;
use crate::error::{StowawayError, StowawayResult};
use crate::models::BackupEntry;

/// Steps a recovery passed through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    Located,
    Verified,
    Decrypted,
    Decompressed,
    Unpacked,
    Copied,
    Restored,
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Located => "located",
            Self::Verified => "verified",
            Self::Decrypted => "decrypted",
            Self::Decompressed => "decompressed",
            Self::Unpacked => "unpacked",
            Self::Copied => "copied",
            Self::Restored => "restored",
        };
        f.write_str(name)
    }
}

/// Result of a successful recovery
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub restore_dir: PathBuf,
    pub stages: Vec<RecoveryStage>,
    /// Files written beneath `restore_dir`
    pub restored: Vec<PathBuf>,
}

impl RecoveryReport {
    pub fn reached(&self, stage: RecoveryStage) -> bool {
        self.stages.contains(&stage)
    }

    pub fn summary(&self) -> String {
        let stages: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        format!(
            "Restored {} file(s) to {} ({})",
            self.restored.len(),
            self.restore_dir.display(),
            stages.join(" -> ")
        )
    }
}

/// Scratch directory for recovery intermediates, removed on drop
struct Staging {
    dir: PathBuf,
    created: bool,
}

impl Staging {
    fn new(restore_dir: &Path) -> Self {
        let tag = crate::models::EntryId::new().short();
        Self {
            dir: restore_dir.join(format!(".stowaway-staging-{}", tag)),
            created: false,
        }
    }

    fn file(&mut self, name: &str) -> StowawayResult<PathBuf> {
        if !self.created {
            fs::create_dir_all(&self.dir)?;
            self.created = true;
        }
        Ok(self.dir.join(name))
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.created {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                warn!(path = %self.dir.display(), error = %e, "Could not remove staging directory");
            }
        }
    }
}

/// The file or tree recovery is currently working from
struct Current {
    path: PathBuf,
    /// Produced by recovery rather than the stored artifact
    intermediate: bool,
}

impl Current {
    fn replace(&mut self, next: PathBuf) {
        let previous = std::mem::replace(&mut self.path, next);
        if self.intermediate {
            if let Err(e) = fs::remove_file(&previous) {
                warn!(path = %previous.display(), error = %e, "Could not remove intermediate");
            }
        }
        self.intermediate = true;
    }
}

/// Decide whether a stage applies: the record's flag when present, the
/// artifact's leading bytes otherwise
fn stage_applies(flag: Option<bool>, sniffed: bool) -> bool {
    flag.unwrap_or(sniffed)
}

/// Run recovery for `entry` into `restore_dir`
pub fn recover(
    entry: &BackupEntry,
    restore_dir: &Path,
    encryptor: Option<&dyn Encryptor>,
) -> StowawayResult<RecoveryReport> {
    let artifact = entry.artifact_path();
    if !artifact.exists() {
        return Err(StowawayError::artifact_not_found(artifact.display().to_string())
            .in_stage("locating artifact"));
    }

    let mut report = RecoveryReport {
        restore_dir: restore_dir.to_path_buf(),
        stages: vec![RecoveryStage::Located],
        restored: Vec::new(),
    };

    fs::create_dir_all(restore_dir).map_err(|e| {
        StowawayError::from(e).in_stage("preparing restore directory")
    })?;

    let mut staging = Staging::new(restore_dir);
    let mut current = Current {
        path: artifact.clone(),
        intermediate: false,
    };

    if let Some(expected) = &entry.checksum {
        if artifact.is_file() {
            verify_checksum(&artifact, expected).map_err(|e| e.in_stage("verifying checksum"))?;
            report.stages.push(RecoveryStage::Verified);
        }
    }

    let kind = sniff(&current.path, "decrypting")?;
    if stage_applies(entry.encrypted, matches!(kind, ArtifactKind::Encrypted(_))) {
        decrypt(&mut current, kind, encryptor, &mut staging).map_err(|e| e.in_stage("decrypting"))?;
        report.stages.push(RecoveryStage::Decrypted);
    }

    let kind = sniff(&current.path, "decompressing")?;
    if stage_applies(entry.compressed, matches!(kind, ArtifactKind::Compressed(_))) {
        decompress(&mut current, kind, &mut staging).map_err(|e| e.in_stage("decompressing"))?;
        report.stages.push(RecoveryStage::Decompressed);
    }

    let kind = sniff(&current.path, "unpacking")?;
    if stage_applies(entry.packed, matches!(kind, ArtifactKind::Archive(_))) {
        report.restored = unpack(&current, kind, restore_dir).map_err(|e| e.in_stage("unpacking"))?;
        report.stages.push(RecoveryStage::Unpacked);
    } else {
        report.restored =
            place(&current, entry, restore_dir).map_err(|e| e.in_stage("restoring files"))?;
        report.stages.push(RecoveryStage::Copied);
    }

    if current.intermediate && current.path.exists() {
        let _ = fs::remove_file(&current.path);
    }
    report.stages.push(RecoveryStage::Restored);

    info!(
        id = %entry.id,
        restore_dir = %restore_dir.display(),
        files = report.restored.len(),
        "Recovery complete"
    );
    Ok(report)
}

fn sniff(path: &Path, stage: &'static str) -> StowawayResult<ArtifactKind> {
    ArtifactKind::sniff(path).map_err(|e| e.in_stage(stage))
}

fn verify_checksum(artifact: &Path, expected_hex: &str) -> StowawayResult<()> {
    let expected = u32::from_str_radix(expected_hex.trim(), 16).map_err(|_| {
        StowawayError::Format(format!("recorded checksum '{}' is not hex", expected_hex))
    })?;
    let actual = checksum_file(artifact)?;
    if actual != expected {
        return Err(StowawayError::ChecksumMismatch {
            context: artifact.display().to_string(),
            expected,
            actual,
        });
    }
    debug!(artifact = %artifact.display(), "Checksum verified");
    Ok(())
}

fn decrypt(
    current: &mut Current,
    kind: ArtifactKind,
    encryptor: Option<&dyn Encryptor>,
    staging: &mut Staging,
) -> StowawayResult<()> {
    let ArtifactKind::Encrypted(algorithm) = kind else {
        return Err(StowawayError::Format(format!(
            "record says encrypted but the artifact is a {}",
            kind
        )));
    };
    let encryptor = encryptor.ok_or_else(|| {
        StowawayError::Validation("The backup is encrypted; a passphrase is required".into())
    })?;
    if encryptor.algorithm() != algorithm {
        return Err(StowawayError::Encryption(format!(
            "artifact was encrypted with {}, not {}",
            algorithm,
            encryptor.algorithm()
        )));
    }
    let out = staging.file("decrypted")?;
    encryptor.decrypt_file(&current.path, &out)?;
    current.replace(out);
    Ok(())
}

fn decompress(current: &mut Current, kind: ArtifactKind, staging: &mut Staging) -> StowawayResult<()> {
    let ArtifactKind::Compressed(algorithm) = kind else {
        return Err(StowawayError::Format(format!(
            "record says compressed but the artifact is a {}",
            kind
        )));
    };
    let out = staging.file("decompressed")?;
    algorithm.decompress_file(&current.path, &out)?;
    current.replace(out);
    Ok(())
}

fn unpack(current: &Current, kind: ArtifactKind, restore_dir: &Path) -> StowawayResult<Vec<PathBuf>> {
    let ArtifactKind::Archive(algorithm) = kind else {
        return Err(StowawayError::Format(format!(
            "record says packed but the artifact is a {}",
            kind
        )));
    };
    algorithm.unpack(&current.path, restore_dir)
}

/// Copy a mirror artifact (or the decoded single file) into `restore_dir`
fn place(current: &Current, entry: &BackupEntry, restore_dir: &Path) -> StowawayResult<Vec<PathBuf>> {
    if current.path.is_dir() {
        return copy_tree(&current.path, restore_dir);
    }
    let target = restore_dir.join(&entry.file_name);
    if current.intermediate {
        if fs::rename(&current.path, &target).is_err() {
            fs::copy(&current.path, &target)?;
        }
    } else {
        fs::copy(&current.path, &target)?;
    }
    Ok(vec![target])
}

fn copy_tree(src: &Path, dest: &Path) -> StowawayResult<Vec<PathBuf>> {
    let mut restored = Vec::new();
    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| StowawayError::Io(format!("Failed to read backup tree: {}", e)))?;
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
            restored.push(target);
        }
    }
    Ok(restored)
}
