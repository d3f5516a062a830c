//! Source selection
//!
//! Walks each source root and collects the files to back up, plus the
//! directories between them so mirror mode can recreate the tree.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::options::{source_name, BackupOptions};
use crate::archive::ArchiveMember;
use crate::error::{StowawayError, StowawayResult};

/// A file chosen for backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    /// Where the content is read from
    pub path: PathBuf,
    /// Path relative to its source root (just the name for file roots)
    pub relative: PathBuf,
    pub size: u64,
}

/// One source root and what was selected beneath it
#[derive(Debug, Clone)]
pub struct SourceRoot {
    /// Absolute path of the root
    pub path: PathBuf,
    /// Final component of the root
    pub name: String,
    /// The root itself is a regular file
    pub is_file: bool,
    /// Directories below the root, parents before children
    pub dirs: Vec<PathBuf>,
    pub files: Vec<SelectedFile>,
}

impl SourceRoot {
    /// Name stored in an archive for `file`
    fn stored_name(&self, file: &SelectedFile) -> StowawayResult<String> {
        let relative = slash_path(&file.relative)?;
        if self.is_file {
            Ok(relative)
        } else {
            Ok(format!("{}/{}", self.name, relative))
        }
    }
}

/// Everything selected for one backup call
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub roots: Vec<SourceRoot>,
}

impl Selection {
    pub fn file_count(&self) -> usize {
        self.roots.iter().map(|r| r.files.len()).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.roots
            .iter()
            .flat_map(|r| r.files.iter())
            .map(|f| f.size)
            .sum()
    }

    /// Archive members in selection order
    pub fn archive_members(&self) -> StowawayResult<Vec<ArchiveMember>> {
        let mut members = Vec::with_capacity(self.file_count());
        for root in &self.roots {
            for file in &root.files {
                members.push(ArchiveMember::new(&file.path, root.stored_name(file)?));
            }
        }
        Ok(members)
    }
}

/// Relative path with `/` separators; fails on names that aren't UTF-8
fn slash_path(path: &Path) -> StowawayResult<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        if let Component::Normal(part) = component {
            let part = part.to_str().ok_or_else(|| {
                StowawayError::Validation(format!("{} is not valid UTF-8", path.display()))
            })?;
            parts.push(part);
        }
    }
    Ok(parts.join("/"))
}

/// Match `name` against a pattern: `*` and `?` wildcards when present,
/// otherwise substring match
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if pattern.contains('*') || pattern.contains('?') {
        wildcard_match(pattern.as_bytes(), name.as_bytes())
    } else {
        name.contains(pattern)
    }
}

fn wildcard_match(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && (pattern[p] == b'?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

struct Filters<'a> {
    include: &'a [String],
    exclude: &'a [String],
}

impl Filters<'_> {
    fn excluded(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        self.exclude.iter().any(|p| pattern_matches(p, &name))
    }

    fn included(&self, entry: &DirEntry) -> bool {
        if self.include.is_empty() {
            return true;
        }
        let name = entry.file_name().to_string_lossy();
        self.include.iter().any(|p| pattern_matches(p, &name))
    }
}

/// Enumerate the files `options` selects
///
/// An empty result is a validation error.
pub fn select(options: &BackupOptions) -> StowawayResult<Selection> {
    let filters = Filters {
        include: &options.include,
        exclude: &options.exclude,
    };
    let mut selection = Selection::default();
    for source in &options.sources {
        selection.roots.push(select_root(source, options, &filters)?);
    }

    if selection.file_count() == 0 {
        return Err(StowawayError::Validation("No files to back up".into()));
    }
    Ok(selection)
}

fn select_root(source: &Path, options: &BackupOptions, filters: &Filters) -> StowawayResult<SourceRoot> {
    let path = source.canonicalize().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StowawayError::file_not_found(source.display().to_string())
        } else {
            e.into()
        }
    })?;
    let name = source_name(&path)?;
    let meta = fs::metadata(&path)?;

    if meta.is_file() {
        return Ok(SourceRoot {
            files: vec![SelectedFile {
                path: path.clone(),
                relative: PathBuf::from(&name),
                size: meta.len(),
            }],
            path,
            name,
            is_file: true,
            dirs: Vec::new(),
        });
    }

    let mut root = SourceRoot {
        path: path.clone(),
        name,
        is_file: false,
        dirs: Vec::new(),
        files: Vec::new(),
    };

    let mut walker = WalkDir::new(&path)
        .follow_links(options.follow_symlinks)
        .min_depth(1)
        .sort_by_file_name();
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    let mut visited = HashSet::new();
    visited.insert(path.clone());

    let mut entries = walker.into_iter();
    while let Some(next) = entries.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) if e.loop_ancestor().is_some() => {
                warn!(path = ?e.path(), "Skipping symlink loop");
                continue;
            }
            Err(e) => {
                let broken_link = e
                    .io_error()
                    .map_or(false, |io| io.kind() == std::io::ErrorKind::NotFound);
                if broken_link {
                    warn!(path = ?e.path(), "Skipping unreadable entry");
                    continue;
                }
                return Err(StowawayError::Io(format!("Failed to walk {}: {}", path.display(), e)));
            }
        };

        let relative = entry
            .path()
            .strip_prefix(&path)
            .unwrap_or(entry.path())
            .to_path_buf();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if filters.excluded(&entry) {
                entries.skip_current_dir();
                continue;
            }
            if options.follow_symlinks {
                let canonical = fs::canonicalize(entry.path())?;
                if !visited.insert(canonical) {
                    debug!(path = %entry.path().display(), "Directory already visited");
                    entries.skip_current_dir();
                    continue;
                }
            }
            root.dirs.push(relative);
            continue;
        }

        if file_type.is_symlink() {
            debug!(path = %entry.path().display(), "Not following symlink");
            continue;
        }
        if !file_type.is_file() || filters.excluded(&entry) || !filters.included(&entry) {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).map_err(|e| {
            StowawayError::Io(format!("Failed to stat {}: {}", entry.path().display(), e))
        })?;
        root.files.push(SelectedFile {
            path: entry.path().to_path_buf(),
            relative,
            size,
        });
    }

    debug!(
        root = %root.path.display(),
        files = root.files.len(),
        dirs = root.dirs.len(),
        "Selected source"
    );
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("docs");
        fs::create_dir_all(root.join("sub/deeper")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::write(root.join("a.txt"), b"aaa").unwrap();
        fs::write(root.join("b.log"), b"bb").unwrap();
        fs::write(root.join("sub/c.txt"), b"c").unwrap();
        fs::write(root.join("sub/deeper/d.txt"), b"dddd").unwrap();
        fs::write(root.join(".git/config"), b"x").unwrap();
        temp
    }

    fn names(selection: &Selection) -> Vec<String> {
        selection
            .archive_members()
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect()
    }

    #[test]
    fn test_wildcards() {
        assert!(pattern_matches("*.txt", "a.txt"));
        assert!(!pattern_matches("*.txt", "a.txt.bak"));
        assert!(pattern_matches("a?c", "abc"));
        assert!(pattern_matches("*", ""));
        assert!(pattern_matches("node_modules", "node_modules"));
        assert!(pattern_matches("tmp", "my_tmp_dir"));
        assert!(!pattern_matches("a*b*c", "acb"));
    }

    #[test]
    fn test_recursive_selection() {
        let temp = tree();
        let options = BackupOptions::new([temp.path().join("docs")]);
        let selection = select(&options).unwrap();
        assert_eq!(
            names(&selection),
            vec![
                "docs/.git/config",
                "docs/a.txt",
                "docs/b.log",
                "docs/sub/c.txt",
                "docs/sub/deeper/d.txt"
            ]
        );
        assert_eq!(selection.total_bytes(), 1 + 3 + 2 + 1 + 4);
        let root = &selection.roots[0];
        assert!(root.dirs.contains(&PathBuf::from("sub")));
        assert!(root.dirs.contains(&PathBuf::from("sub/deeper")));
    }

    #[test]
    fn test_non_recursive_selection() {
        let temp = tree();
        let mut options = BackupOptions::new([temp.path().join("docs")]);
        options.recursive = false;
        let selection = select(&options).unwrap();
        assert_eq!(names(&selection), vec!["docs/a.txt", "docs/b.log"]);
    }

    #[test]
    fn test_include_and_exclude() {
        let temp = tree();
        let mut options = BackupOptions::new([temp.path().join("docs")]);
        options.include = vec!["*.txt".into()];
        options.exclude = vec!["deeper".into()];
        let selection = select(&options).unwrap();
        assert_eq!(names(&selection), vec!["docs/a.txt", "docs/sub/c.txt"]);
        assert!(!selection.roots[0].dirs.contains(&PathBuf::from("sub/deeper")));
    }

    #[test]
    fn test_single_file_root() {
        let temp = tree();
        let options = BackupOptions::new([temp.path().join("docs/a.txt")]);
        let selection = select(&options).unwrap();
        assert!(selection.roots[0].is_file);
        assert_eq!(names(&selection), vec!["a.txt"]);
    }

    #[test]
    fn test_empty_selection_is_validation_error() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("empty")).unwrap();
        let err = select(&BackupOptions::new([temp.path().join("empty")])).unwrap_err();
        assert!(err.is_validation());
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_is_skipped() {
        let temp = tree();
        let root = temp.path().join("docs");
        std::os::unix::fs::symlink(&root, root.join("sub/loop")).unwrap();

        let mut options = BackupOptions::new([&root]);
        let plain = select(&options).unwrap();
        assert_eq!(plain.file_count(), 5);

        options.follow_symlinks = true;
        let followed = select(&options).unwrap();
        assert_eq!(followed.file_count(), 5);
    }
}
