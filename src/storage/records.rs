//! Backup record store
//!
//! Keeps the ordered list of `BackupEntry` values in a single JSON array
//! file. Loading replaces the in-memory list; every mutation rewrites the
//! whole file atomically.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StowawayError, StowawayResult};
use crate::models::{BackupEntry, EntryId};

use super::file_io::{read_json, write_json_atomic};

/// Persistent list of backup records
///
/// Owned by a single caller. Nothing guards the backing file against a
/// second process mutating it between load and save.
#[derive(Debug)]
pub struct RecordStore {
    path: PathBuf,
    entries: Vec<BackupEntry>,
}

impl RecordStore {
    /// Empty store bound to `path`; call [`load`](Self::load) to read it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Vec::new(),
        }
    }

    /// Bind to `path` and load it. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> StowawayResult<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&mut self) -> StowawayResult<()> {
        self.entries = read_json(&self.path)?;
        debug!(path = %self.path.display(), count = self.entries.len(), "Loaded backup records");
        Ok(())
    }

    pub fn save(&self) -> StowawayResult<()> {
        write_json_atomic(&self.path, &self.entries)
    }

    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a record and persist
    pub fn add(&mut self, entry: BackupEntry) -> StowawayResult<()> {
        self.entries.push(entry);
        if let Err(e) = self.save() {
            self.entries.pop();
            return Err(e);
        }
        Ok(())
    }

    pub fn get(&self, id: EntryId) -> Option<&BackupEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Position of the record with this (name, time) key
    pub fn position(&self, file_name: &str, backup_time: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.same_key(file_name, backup_time))
    }

    /// Records whose file name is exactly `file_name`, in stored order
    pub fn find_by_name(&self, file_name: &str) -> Vec<&BackupEntry> {
        self.entries
            .iter()
            .filter(|e| e.file_name == file_name)
            .collect()
    }

    /// Case-insensitive substring match on file name and source path
    pub fn search(&self, text: &str) -> Vec<&BackupEntry> {
        let needle = text.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                e.file_name.to_lowercase().contains(&needle)
                    || e
                        .source_path
                        .to_string_lossy()
                        .to_lowercase()
                        .contains(&needle)
            })
            .collect()
    }

    /// Records with `start <= backup_time <= end`, compared as strings
    pub fn find_by_time_range(&self, start: &str, end: &str) -> Vec<&BackupEntry> {
        self.entries
            .iter()
            .filter(|e| e.backup_time.as_str() >= start && e.backup_time.as_str() <= end)
            .collect()
    }

    /// Look up by full id, or by a unique prefix of its hex form
    /// (`bak-1a2b3c4d`, `1a2b`, ...)
    pub fn find_by_id_prefix(&self, text: &str) -> StowawayResult<&BackupEntry> {
        if let Ok(id) = text.parse::<EntryId>() {
            if let Some(entry) = self.get(id) {
                return Ok(entry);
            }
        }

        let prefix = text
            .trim()
            .strip_prefix("bak-")
            .unwrap_or(text.trim())
            .to_lowercase()
            .replace('-', "");
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StowawayError::record_not_found(text));
        }

        let mut matches = self
            .entries
            .iter()
            .filter(|e| e.id.as_uuid().simple().to_string().starts_with(&prefix));
        match (matches.next(), matches.next()) {
            (Some(entry), None) => Ok(entry),
            (Some(_), Some(_)) => Err(StowawayError::Validation(format!(
                "'{}' matches more than one backup record; use a longer id",
                text
            ))),
            (None, _) => Err(StowawayError::record_not_found(text)),
        }
    }

    /// Resolve user input to one record: an id (prefix) first, then an exact
    /// file name. Among several backups of the same name the newest wins
    /// unless `backup_time` pins one.
    pub fn resolve(&self, query: &str, backup_time: Option<&str>) -> StowawayResult<&BackupEntry> {
        if let Some(time) = backup_time {
            return self
                .position(query, time)
                .map(|i| &self.entries[i])
                .ok_or_else(|| StowawayError::record_not_found(format!("{} @ {}", query, time)));
        }

        match self.find_by_id_prefix(query) {
            Ok(entry) => return Ok(entry),
            Err(e) if !e.is_not_found() => return Err(e),
            Err(_) => {}
        }

        self.find_by_name(query)
            .into_iter()
            .max_by(|a, b| a.backup_time.cmp(&b.backup_time))
            .ok_or_else(|| StowawayError::record_not_found(query))
    }

    /// Remove the record with the same (name, time) key as `entry`
    pub fn delete(&mut self, entry: &BackupEntry) -> StowawayResult<BackupEntry> {
        let index = self
            .position(&entry.file_name, &entry.backup_time)
            .ok_or_else(|| {
                StowawayError::record_not_found(format!(
                    "{} @ {}",
                    entry.file_name, entry.backup_time
                ))
            })?;
        self.delete_at(index)
    }

    pub fn delete_by_id(&mut self, id: EntryId) -> StowawayResult<BackupEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| StowawayError::record_not_found(id.to_string()))?;
        self.delete_at(index)
    }

    /// Remove the record at `index` and best-effort delete its artifact
    pub fn delete_at(&mut self, index: usize) -> StowawayResult<BackupEntry> {
        if index >= self.entries.len() {
            return Err(StowawayError::record_not_found(format!("index {}", index)));
        }
        let removed = self.entries.remove(index);
        if let Err(e) = self.save() {
            self.entries.insert(index, removed);
            return Err(e);
        }
        remove_artifact(&removed);
        Ok(removed)
    }

    /// Replace the record at `index`
    pub fn modify_at(&mut self, index: usize, entry: BackupEntry) -> StowawayResult<()> {
        let slot = self
            .entries
            .get_mut(index)
            .ok_or_else(|| StowawayError::record_not_found(format!("index {}", index)))?;
        let previous = std::mem::replace(slot, entry);
        if let Err(e) = self.save() {
            self.entries[index] = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Replace the record with the same (name, time) key as `old`
    pub fn modify(&mut self, old: &BackupEntry, new: BackupEntry) -> StowawayResult<()> {
        let index = self
            .position(&old.file_name, &old.backup_time)
            .ok_or_else(|| {
                StowawayError::record_not_found(format!("{} @ {}", old.file_name, old.backup_time))
            })?;
        self.modify_at(index, new)
    }
}

fn remove_artifact(entry: &BackupEntry) {
    let path = entry.artifact_path();
    let result = match fs::symlink_metadata(&path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path),
        Ok(_) => fs::remove_file(&path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Artifact already gone");
            Ok(())
        }
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => debug!(path = %path.display(), "Deleted backup artifact"),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not delete backup artifact");
            return;
        }
    }

    // A single-file mirror sits inside its own backup folder
    if let Some((folder, _)) = entry.artifact_name.split_once('/') {
        let folder = entry.dest_dir.join(folder);
        if fs::read_dir(&folder).map_or(false, |mut d| d.next().is_none()) {
            match fs::remove_dir(&folder) {
                Ok(()) => debug!(path = %folder.display(), "Deleted empty backup folder"),
                Err(e) => warn!(path = %folder.display(), error = %e, "Could not delete backup folder"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, time: &str, dest: &Path) -> BackupEntry {
        BackupEntry {
            id: EntryId::new(),
            file_name: name.to_string(),
            source_path: PathBuf::from("/src").join(name),
            additional_sources: Vec::new(),
            dest_dir: dest.to_path_buf(),
            artifact_name: format!("{}.huff", name),
            backup_time: time.to_string(),
            encrypted: Some(false),
            packed: Some(false),
            compressed: Some(true),
            checksum: None,
        }
    }

    fn seeded(temp: &TempDir) -> RecordStore {
        let mut store = RecordStore::new(temp.path().join("records.json"));
        store.add(entry("a.txt", "2025-03-01T10:00:00.000Z", temp.path())).unwrap();
        store.add(entry("Report.doc", "2025-03-02T10:00:00.000Z", temp.path())).unwrap();
        store.add(entry("a.txt", "2025-03-03T10:00:00.000Z", temp.path())).unwrap();
        store
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = RecordStore::open(temp.path().join("records.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_persistence_preserves_order() {
        let temp = TempDir::new().unwrap();
        let store = seeded(&temp);
        let reloaded = RecordStore::open(store.path()).unwrap();
        assert_eq!(reloaded.entries(), store.entries());

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.trim_start().starts_with('['));
    }

    #[test]
    fn test_find_by_name_is_exact() {
        let temp = TempDir::new().unwrap();
        let store = seeded(&temp);
        assert_eq!(store.find_by_name("a.txt").len(), 2);
        assert!(store.find_by_name("a.tx").is_empty());
        assert_eq!(store.search("REPORT").len(), 1);
        assert_eq!(store.search("a.t").len(), 2);
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let temp = TempDir::new().unwrap();
        let store = seeded(&temp);
        let hits = store.find_by_time_range("2025-03-01T10:00:00.000Z", "2025-03-02T10:00:00.000Z");
        assert_eq!(hits.len(), 2);
        assert!(store
            .find_by_time_range("2025-04-01T00:00:00.000Z", "2025-05-01T00:00:00.000Z")
            .is_empty());
    }

    #[test]
    fn test_lookup_by_id_prefix() {
        let temp = TempDir::new().unwrap();
        let store = seeded(&temp);
        let target = store.entries()[1].clone();
        assert_eq!(store.find_by_id_prefix(&target.id.to_string()).unwrap(), &target);
        assert_eq!(
            store.find_by_id_prefix(&target.id.as_uuid().to_string()).unwrap(),
            &target
        );
        assert!(store.find_by_id_prefix("zzzz").unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_prefers_newest_by_name() {
        let temp = TempDir::new().unwrap();
        let store = seeded(&temp);
        let latest = store.resolve("a.txt", None).unwrap();
        assert_eq!(latest.backup_time, "2025-03-03T10:00:00.000Z");
        let pinned = store.resolve("a.txt", Some("2025-03-01T10:00:00.000Z")).unwrap();
        assert_eq!(pinned.backup_time, "2025-03-01T10:00:00.000Z");
        assert!(store.resolve("nothing", None).unwrap_err().is_not_found());
    }

    #[test]
    fn test_delete_removes_record_and_artifact() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let victim = store.entries()[0].clone();
        fs::write(victim.artifact_path(), b"artifact").unwrap();

        store.delete(&victim).unwrap();
        assert!(store.position(&victim.file_name, &victim.backup_time).is_none());
        assert!(!victim.artifact_path().exists());
        assert_eq!(RecordStore::open(store.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_removes_directory_artifact() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let mut dir_entry = entry("tree", "2025-03-04T10:00:00.000Z", temp.path());
        dir_entry.artifact_name = "tree".into();
        fs::create_dir_all(temp.path().join("tree/sub")).unwrap();
        fs::write(temp.path().join("tree/sub/x"), b"x").unwrap();
        store.add(dir_entry.clone()).unwrap();

        store.delete_by_id(dir_entry.id).unwrap();
        assert!(!temp.path().join("tree").exists());
    }

    #[test]
    fn test_delete_removes_empty_mirror_folder() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let mut single = entry("f1.txt", "2025-03-04T10:00:00.000Z", temp.path());
        single.artifact_name = "backup-20250304-100000-000-1a2b3c4d/f1.txt.huff".into();
        let folder = temp.path().join("backup-20250304-100000-000-1a2b3c4d");
        fs::create_dir(&folder).unwrap();
        fs::write(single.artifact_path(), b"artifact").unwrap();
        store.add(single.clone()).unwrap();

        store.delete_by_id(single.id).unwrap();
        assert!(!single.artifact_path().exists());
        assert!(!folder.exists());
        assert!(temp.path().exists());
    }

    #[test]
    fn test_delete_keeps_non_empty_folder() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let mut single = entry("f1.txt", "2025-03-04T10:00:00.000Z", temp.path());
        single.artifact_name = "shared/f1.txt.huff".into();
        fs::create_dir(temp.path().join("shared")).unwrap();
        fs::write(single.artifact_path(), b"artifact").unwrap();
        fs::write(temp.path().join("shared/other"), b"keep").unwrap();
        store.add(single.clone()).unwrap();

        store.delete_by_id(single.id).unwrap();
        assert!(temp.path().join("shared/other").exists());
    }

    #[test]
    fn test_failed_save_rolls_back_add() {
        let temp = TempDir::new().unwrap();
        // a directory where the records file should be makes every save fail
        let path = temp.path().join("records.json");
        fs::create_dir(&path).unwrap();
        let mut store = RecordStore::new(&path);

        assert!(store.add(entry("a.txt", "2025-03-01T10:00:00.000Z", temp.path())).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_save_rolls_back_modify() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let old = store.entries()[1].clone();
        let mut new = old.clone();
        new.checksum = Some("deadbeef".into());

        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();
        assert!(store.modify_at(1, new).is_err());
        assert_eq!(store.entries()[1], old);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let ghost = entry("ghost", "2025-01-01T00:00:00.000Z", temp.path());
        assert!(store.delete(&ghost).unwrap_err().is_not_found());
        assert!(store.delete_at(99).unwrap_err().is_not_found());
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_delete_tolerates_missing_artifact() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        store.delete_at(1).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_modify() {
        let temp = TempDir::new().unwrap();
        let mut store = seeded(&temp);
        let old = store.entries()[1].clone();
        let mut new = old.clone();
        new.checksum = Some("deadbeef".into());
        store.modify(&old, new.clone()).unwrap();
        assert_eq!(store.entries()[1], new);

        let ghost = entry("ghost", "2025-01-01T00:00:00.000Z", temp.path());
        assert!(store.modify(&ghost, new.clone()).unwrap_err().is_not_found());
        assert!(store.modify_at(7, new).unwrap_err().is_not_found());
    }
}
