//! Backup manager for Stowaway
//!
//! Runs the forward pipeline (select, pack or mirror, compress, encrypt,
//! record) and hands recovery to [`super::restore`]. The repository root
//! anchors relative destinations.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::options::BackupOptions;
use super::restore::{self, RecoveryReport};
use super::select::{select, Selection};
use crate::compress::crc32::checksum_file;
use crate::crypto::Encryptor;
use crate::error::{StowawayError, StowawayResult};
use crate::models::{format_backup_time, new_artifact_stem, BackupEntry, EntryId};
use crate::storage::RecordStore;

/// Result of a successful backup
#[derive(Debug, Clone)]
pub struct BackupOutcome {
    /// The record that was stored
    pub entry: BackupEntry,
    /// Full path of the final artifact
    pub artifact: PathBuf,
    pub files: usize,
    /// Total size of the selected files
    pub bytes: u64,
}

/// Owns the repository root and the record store
pub struct BackupManager {
    repository_root: PathBuf,
    records: RecordStore,
}

impl BackupManager {
    pub fn new(repository_root: impl Into<PathBuf>, records: RecordStore) -> Self {
        Self {
            repository_root: repository_root.into(),
            records,
        }
    }

    pub fn repository_root(&self) -> &Path {
        &self.repository_root
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Absolute destinations are kept; relative ones hang off the repository root
    pub fn resolve_destination(&self, destination: &Path) -> PathBuf {
        if destination.is_absolute() {
            destination.to_path_buf()
        } else {
            self.repository_root.join(destination)
        }
    }

    /// Back up the sources in `options` and record the result
    pub fn backup(
        &mut self,
        options: &BackupOptions,
        encryptor: Option<&dyn Encryptor>,
    ) -> StowawayResult<BackupOutcome> {
        options.validate()?;
        let encryptor = match (options.encrypt, encryptor) {
            (true, None) => {
                return Err(StowawayError::Validation(
                    "Encryption requested but no passphrase was provided".into(),
                ))
            }
            (true, Some(enc)) => Some(enc),
            (false, _) => None,
        };

        let selection = select(options)?;
        let dest_dir = self.resolve_destination(&options.destination);
        fs::create_dir_all(&dest_dir).map_err(|e| {
            StowawayError::Io(format!(
                "Failed to create destination {}: {}",
                dest_dir.display(),
                e
            ))
        })?;

        let mut stage = Stage::default();
        let artifact = match run_pipeline(&selection, options, encryptor, &dest_dir, &mut stage) {
            Ok(path) => path,
            Err(e) => {
                stage.discard();
                return Err(e);
            }
        };

        let entry = match self.record(&selection, options, &dest_dir, &artifact) {
            Ok(entry) => entry,
            Err(e) => {
                stage.discard();
                return Err(e);
            }
        };

        info!(
            id = %entry.id,
            artifact = %artifact.display(),
            files = selection.file_count(),
            stages = %entry.stages_label(),
            "Backup complete"
        );

        Ok(BackupOutcome {
            entry,
            artifact,
            files: selection.file_count(),
            bytes: selection.total_bytes(),
        })
    }

    fn record(
        &mut self,
        selection: &Selection,
        options: &BackupOptions,
        dest_dir: &Path,
        artifact: &Path,
    ) -> StowawayResult<BackupEntry> {
        let checksum = if artifact.is_file() {
            Some(format!("{:08x}", checksum_file(artifact)?))
        } else {
            None
        };

        let artifact_name = artifact
            .strip_prefix(dest_dir)
            .unwrap_or(artifact)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let mut roots = selection.roots.iter();
        let first = roots
            .next()
            .ok_or_else(|| StowawayError::Validation("No files to back up".into()))?;

        let entry = BackupEntry {
            id: EntryId::new(),
            file_name: first.name.clone(),
            source_path: first.path.clone(),
            additional_sources: roots.map(|r| r.path.clone()).collect(),
            dest_dir: dest_dir.to_path_buf(),
            artifact_name,
            backup_time: format_backup_time(Utc::now()),
            encrypted: Some(options.encrypt),
            packed: Some(options.pack.is_some()),
            compressed: Some(options.compression.is_some()),
            checksum,
        };
        self.records.add(entry.clone())?;
        Ok(entry)
    }

    /// Restore `entry` into `dest_dir`, or next to its original source
    pub fn recover(
        &self,
        entry: &BackupEntry,
        dest_dir: Option<&Path>,
        encryptor: Option<&dyn Encryptor>,
    ) -> StowawayResult<RecoveryReport> {
        let restore_dir = match dest_dir {
            Some(dir) => dir.to_path_buf(),
            None => entry
                .source_path
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| {
                    StowawayError::Validation(format!(
                        "Cannot derive a restore directory from {}; pass one explicitly",
                        entry.source_path.display()
                    ))
                })?,
        };
        restore::recover(entry, &restore_dir, encryptor)
    }
}

/// The artifact produced so far, removed again if a later step fails
#[derive(Default)]
struct Stage {
    current: Option<PathBuf>,
    /// Mirror directory holding `current`; kept on success
    container: Option<PathBuf>,
}

impl Stage {
    fn path(&self) -> StowawayResult<&Path> {
        self.current
            .as_deref()
            .ok_or_else(|| StowawayError::Validation("No files to back up".into()))
    }

    /// Make `next` the current artifact and delete the one it replaces
    fn advance(&mut self, next: PathBuf) {
        if let Some(previous) = self.current.replace(next) {
            remove_path(&previous);
        }
    }

    fn discard(&mut self) {
        for path in [self.current.take(), self.container.take()].into_iter().flatten() {
            if path.exists() {
                remove_path(&path);
            }
        }
    }
}

fn remove_path(path: &Path) {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Ok(()) => debug!(path = %path.display(), "Removed intermediate"),
        Err(e) => warn!(path = %path.display(), error = %e, "Could not remove intermediate"),
    }
}

fn run_pipeline(
    selection: &Selection,
    options: &BackupOptions,
    encryptor: Option<&dyn Encryptor>,
    dest_dir: &Path,
    stage: &mut Stage,
) -> StowawayResult<PathBuf> {
    match options.pack {
        Some(algorithm) => {
            let members = selection.archive_members()?;
            stage.advance(algorithm.pack(&members, dest_dir)?);
        }
        None => {
            let mirror_root = dest_dir.join(new_artifact_stem());
            stage.container = Some(mirror_root.clone());
            let single = mirror(selection, &mirror_root)?;
            stage.current = Some(single.unwrap_or(mirror_root));
        }
    }

    if let Some(algorithm) = options.compression {
        let current = stage.path()?.to_path_buf();
        let parent = current.parent().unwrap_or(dest_dir).to_path_buf();
        let compressed = algorithm.compress_file(&current, &parent)?;
        stage.advance(compressed);
    }

    if let Some(enc) = encryptor {
        let current = stage.path()?.to_path_buf();
        let encrypted = enc.encrypted_path(&current);
        enc.encrypt_file(&current, &encrypted)?;
        stage.advance(encrypted);
    }

    Ok(stage.path()?.to_path_buf())
}

/// Copy the selection beneath `mirror_root`, keeping each file's path
/// relative to its source root. Directory roots land in a folder named after
/// the root; file roots land directly in `mirror_root`.
///
/// Returns the copied file when the whole selection is one file root.
fn mirror(selection: &Selection, mirror_root: &Path) -> StowawayResult<Option<PathBuf>> {
    fs::create_dir_all(mirror_root)?;
    let mut created: HashSet<PathBuf> = HashSet::new();
    created.insert(mirror_root.to_path_buf());

    let mut last_copied = None;
    for root in &selection.roots {
        let base = if root.is_file {
            mirror_root.to_path_buf()
        } else {
            mirror_root.join(&root.name)
        };
        ensure_dir(&base, &mut created)?;
        for dir in &root.dirs {
            ensure_dir(&base.join(dir), &mut created)?;
        }
        for file in &root.files {
            let target = base.join(&file.relative);
            if let Some(parent) = target.parent() {
                ensure_dir(parent, &mut created)?;
            }
            fs::copy(&file.path, &target).map_err(|e| {
                StowawayError::Io(format!(
                    "Failed to copy {} to {}: {}",
                    file.path.display(),
                    target.display(),
                    e
                ))
            })?;
            last_copied = Some(target);
        }
    }

    debug!(
        root = %mirror_root.display(),
        dirs = created.len(),
        files = selection.file_count(),
        "Mirrored selection"
    );

    let single = selection.roots.len() == 1 && selection.roots[0].is_file;
    Ok(if single { last_copied } else { None })
}

fn ensure_dir(dir: &Path, created: &mut HashSet<PathBuf>) -> StowawayResult<()> {
    if created.insert(dir.to_path_buf()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}
