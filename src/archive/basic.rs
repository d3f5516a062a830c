//! The basic archive layout: header, metadata block, concatenated contents.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use super::{ArchiveAlgorithm, ArchiveMember, ARCHIVE_FLAG};
use crate::binio::{read_bytes, read_u32, read_u64, read_u8, write_u32, write_u64};
use crate::error::{StowawayError, StowawayResult};
use crate::models::entry::new_artifact_stem;

/// flag + algorithm + file count
const FIXED_HEADER_LEN: u64 = 1 + 1 + 4;

/// name length + size + offset, excluding the name itself
const META_FIXED_LEN: u64 = 4 + 8 + 8;

/// Upper bound on a stored name, to reject garbage before allocating
const MAX_NAME_LEN: u32 = 64 * 1024;

/// Metadata for one archived file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub name: String,
    pub size: u64,
    pub offset: u64,
}

/// Parsed header and metadata block of an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveIndex {
    pub algorithm: ArchiveAlgorithm,
    pub files: Vec<FileMeta>,
}

impl ArchiveIndex {
    /// Byte length of header plus metadata block
    pub fn content_start(&self) -> u64 {
        header_len(self.files.iter().map(|f| f.name.as_str()))
    }

    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }
}

/// Length of the header and metadata block for the given stored names
pub fn header_len<'a>(names: impl IntoIterator<Item = &'a str>) -> u64 {
    names
        .into_iter()
        .fold(FIXED_HEADER_LEN, |acc, name| acc + META_FIXED_LEN + name.len() as u64)
}

pub(super) fn pack(
    algorithm: ArchiveAlgorithm,
    members: &[ArchiveMember],
    dest_dir: &Path,
) -> StowawayResult<PathBuf> {
    if members.is_empty() {
        return Err(StowawayError::Validation("nothing to pack".into()));
    }

    // Collect sizes first so a missing file fails before any output exists
    let mut offset = header_len(members.iter().map(|m| m.name.as_str()));
    let mut metas = Vec::with_capacity(members.len());
    for member in members {
        let metadata = fs::metadata(&member.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StowawayError::file_not_found(member.path.display().to_string())
            } else {
                StowawayError::Io(format!("Failed to stat {}: {}", member.path.display(), e))
            }
        })?;
        if !metadata.is_file() {
            return Err(StowawayError::Validation(format!(
                "{} is not a regular file",
                member.path.display()
            )));
        }
        metas.push(FileMeta {
            name: member.name.clone(),
            size: metadata.len(),
            offset,
        });
        offset += metadata.len();
    }

    fs::create_dir_all(dest_dir).map_err(|e| {
        StowawayError::Io(format!("Failed to create {}: {}", dest_dir.display(), e))
    })?;
    let dest = dest_dir.join(format!("{}.{}", new_artifact_stem(), algorithm.extension()));

    if let Err(e) = write_archive(algorithm, members, &metas, &dest) {
        let _ = fs::remove_file(&dest);
        return Err(e);
    }

    info!(
        files = metas.len(),
        artifact = %dest.display(),
        "Packed files with {} packer",
        algorithm
    );
    Ok(dest)
}

fn write_archive(
    algorithm: ArchiveAlgorithm,
    members: &[ArchiveMember],
    metas: &[FileMeta],
    dest: &Path,
) -> StowawayResult<()> {
    let file = File::create(dest)
        .map_err(|e| StowawayError::Io(format!("Failed to create {}: {}", dest.display(), e)))?;
    let mut out = BufWriter::new(file);

    let count = u32::try_from(metas.len())
        .map_err(|_| StowawayError::Validation("too many files for one archive".into()))?;
    out.write_all(&[ARCHIVE_FLAG, algorithm.id()])?;
    write_u32(&mut out, count)?;

    for meta in metas {
        let name_len = u32::try_from(meta.name.len())
            .ok()
            .filter(|len| *len <= MAX_NAME_LEN)
            .ok_or_else(|| StowawayError::Validation(format!("name too long: {}", meta.name)))?;
        write_u32(&mut out, name_len)?;
        out.write_all(meta.name.as_bytes())?;
        write_u64(&mut out, meta.size)?;
        write_u64(&mut out, meta.offset)?;
    }

    for (member, meta) in members.iter().zip(metas) {
        let input = File::open(&member.path).map_err(|e| {
            StowawayError::Io(format!("Failed to open {}: {}", member.path.display(), e))
        })?;
        // The file may have changed since it was measured; never write more
        // or less than the metadata promised.
        let copied = io::copy(&mut BufReader::new(input).take(meta.size), &mut out)?;
        if copied != meta.size {
            return Err(StowawayError::Io(format!(
                "{} shrank while packing ({} of {} bytes)",
                member.path.display(),
                copied,
                meta.size
            )));
        }
        debug!(name = %meta.name, size = meta.size, offset = meta.offset, "Packed member");
    }

    out.flush()?;
    Ok(())
}

pub(super) fn read_index(algorithm: ArchiveAlgorithm, src: &Path) -> StowawayResult<ArchiveIndex> {
    let file = open_artifact(src)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    parse_index(algorithm, &mut reader, file_len, src)
}

fn parse_index<R: Read>(
    algorithm: ArchiveAlgorithm,
    reader: &mut R,
    file_len: u64,
    src: &Path,
) -> StowawayResult<ArchiveIndex> {
    let flag = read_u8(reader, "archive flag")?;
    if flag != ARCHIVE_FLAG {
        return Err(StowawayError::Format(format!(
            "{} is not a packed archive (flag byte {:#04x})",
            src.display(),
            flag
        )));
    }
    let id = read_u8(reader, "archive algorithm")?;
    if id != algorithm.id() {
        return Err(StowawayError::Format(format!(
            "{} was packed with algorithm id {:#04x}, expected {} ({:#04x})",
            src.display(),
            id,
            algorithm,
            algorithm.id()
        )));
    }

    let count = read_u32(reader, "file count")?;
    if u64::from(count) * META_FIXED_LEN > file_len {
        return Err(StowawayError::Format(format!(
            "{} claims {} files but is only {} bytes",
            src.display(),
            count,
            file_len
        )));
    }

    let mut files = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let name_len = read_u32(reader, "name length")?;
        if name_len > MAX_NAME_LEN {
            return Err(StowawayError::Format(format!(
                "stored name length {} exceeds limit",
                name_len
            )));
        }
        let raw = read_bytes(reader, name_len as usize, "file name")?;
        let name = String::from_utf8(raw)
            .map_err(|_| StowawayError::Format("stored file name is not UTF-8".into()))?;
        let size = read_u64(reader, "file size")?;
        let offset = read_u64(reader, "file offset")?;
        files.push(FileMeta { name, size, offset });
    }

    let index = ArchiveIndex { algorithm, files };
    validate_layout(&index, file_len)?;
    Ok(index)
}

/// Offsets must start after the metadata block, follow each other without
/// overlap and stay inside the file.
fn validate_layout(index: &ArchiveIndex, file_len: u64) -> StowawayResult<()> {
    let mut expected = index.content_start();
    for meta in &index.files {
        safe_relative_path(&meta.name)?;
        if meta.offset < expected {
            return Err(StowawayError::Format(format!(
                "member '{}' overlaps preceding data (offset {}, expected at least {})",
                meta.name, meta.offset, expected
            )));
        }
        expected = meta
            .offset
            .checked_add(meta.size)
            .filter(|end| *end <= file_len)
            .ok_or_else(|| {
                StowawayError::Format(format!("member '{}' extends past end of archive", meta.name))
            })?;
    }
    Ok(())
}

/// Turn a stored name into a relative path that cannot escape the
/// destination directory
fn safe_relative_path(name: &str) -> StowawayResult<PathBuf> {
    let path = Path::new(name);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(StowawayError::Format(format!(
                    "unsafe member name '{}'",
                    name
                )))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StowawayError::Format("empty member name".into()));
    }
    Ok(clean)
}

pub(super) fn unpack(
    algorithm: ArchiveAlgorithm,
    src: &Path,
    dest_dir: &Path,
) -> StowawayResult<Vec<PathBuf>> {
    let file = open_artifact(src)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    // The whole index is validated before the destination is touched
    let index = parse_index(algorithm, &mut reader, file_len, src)?;

    fs::create_dir_all(dest_dir).map_err(|e| {
        StowawayError::Io(format!("Failed to create {}: {}", dest_dir.display(), e))
    })?;

    let mut restored = Vec::with_capacity(index.files.len());
    for meta in &index.files {
        let out_path = dest_dir.join(safe_relative_path(&meta.name)?);
        extract_member(&mut reader, meta, &out_path)
            .map_err(|e| e.with_context(&format!("Failed to extract '{}'", meta.name)))?;
        debug!(name = %meta.name, size = meta.size, "Extracted member");
        restored.push(out_path);
    }

    info!(
        files = restored.len(),
        from = %src.display(),
        to = %dest_dir.display(),
        "Unpacked archive"
    );
    Ok(restored)
}

fn extract_member<R: Read + Seek>(
    reader: &mut R,
    meta: &FileMeta,
    out_path: &Path,
) -> StowawayResult<()> {
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    reader.seek(SeekFrom::Start(meta.offset))?;
    let mut out = BufWriter::new(File::create(out_path)?);
    let copied = io::copy(&mut reader.by_ref().take(meta.size), &mut out)?;
    out.flush()?;
    if copied != meta.size {
        return Err(StowawayError::Format(format!(
            "expected {} bytes, archive held {}",
            meta.size, copied
        )));
    }
    Ok(())
}

fn open_artifact(src: &Path) -> StowawayResult<File> {
    File::open(src).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            StowawayError::artifact_not_found(src.display().to_string())
        } else {
            StowawayError::Io(format!("Failed to open {}: {}", src.display(), e))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_two_file_layout() {
        let temp = TempDir::new().unwrap();
        let f1 = write(temp.path(), "f1", &[1u8; 10]);
        let f2 = write(temp.path(), "f2", &[2u8; 20]);
        let members = vec![ArchiveMember::new(&f1, "f1"), ArchiveMember::new(&f2, "f2")];

        let artifact = ArchiveAlgorithm::Basic
            .pack(&members, &temp.path().join("out"))
            .unwrap();

        let index = ArchiveAlgorithm::Basic.read_index(&artifact).unwrap();
        assert_eq!(index.files.len(), 2);
        let boundary = 6 + (20 + 2) * 2;
        assert_eq!(index.content_start(), boundary);
        assert_eq!(index.files[0].offset, boundary);
        assert_eq!(index.files[1].offset, index.files[0].offset + 10);
        assert_eq!(fs::metadata(&artifact).unwrap().len(), boundary + 30);

        let raw = fs::read(&artifact).unwrap();
        assert_eq!(raw[0], ARCHIVE_FLAG);
        assert_eq!(raw[1], ArchiveAlgorithm::Basic.id());
        assert_eq!(u32::from_le_bytes(raw[2..6].try_into().unwrap()), 2);
    }

    #[test]
    fn test_round_trip_nested_names() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let a = write(&src, "docs/a.txt", b"alpha");
        let b = write(&src, "docs/sub/b.bin", &[0u8, 255, 7, 7, 7]);
        let empty = write(&src, "docs/empty", b"");
        let members = vec![
            ArchiveMember::new(&a, "docs/a.txt"),
            ArchiveMember::new(&b, "docs/sub/b.bin"),
            ArchiveMember::new(&empty, "docs/empty"),
        ];

        let artifact = ArchiveAlgorithm::Basic.pack(&members, temp.path()).unwrap();
        let restore = temp.path().join("restore");
        let restored = ArchiveAlgorithm::Basic.unpack(&artifact, &restore).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(fs::read(restore.join("docs/a.txt")).unwrap(), b"alpha");
        assert_eq!(
            fs::read(restore.join("docs/sub/b.bin")).unwrap(),
            vec![0u8, 255, 7, 7, 7]
        );
        assert!(fs::read(restore.join("docs/empty")).unwrap().is_empty());
    }

    #[test]
    fn test_missing_input_leaves_no_artifact() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a", b"a");
        let members = vec![
            ArchiveMember::new(&a, "a"),
            ArchiveMember::new(temp.path().join("ghost"), "ghost"),
        ];
        let out = temp.path().join("out");

        let err = ArchiveAlgorithm::Basic.pack(&members, &out).unwrap_err();
        assert!(err.is_not_found());
        let leftovers = fs::read_dir(&out).map(|d| d.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_wrong_flag_does_not_touch_destination() {
        let temp = TempDir::new().unwrap();
        let bogus = write(temp.path(), "bogus.pak", &[0x00, 0x01, 0, 0, 0, 0]);
        let dest = temp.path().join("never");

        let err = ArchiveAlgorithm::Basic.unpack(&bogus, &dest).unwrap_err();
        assert!(matches!(err, StowawayError::Format(_)));
        assert!(!dest.exists());
    }

    #[test]
    fn test_wrong_algorithm_id_rejected() {
        let temp = TempDir::new().unwrap();
        let bogus = write(temp.path(), "bogus.pak", &[ARCHIVE_FLAG, 0x7f, 0, 0, 0, 0]);
        let err = ArchiveAlgorithm::Basic.read_index(&bogus).unwrap_err();
        assert!(err.to_string().contains("algorithm id"));
    }

    #[test]
    fn test_unsafe_names_rejected() {
        assert!(safe_relative_path("../etc/passwd").is_err());
        assert!(safe_relative_path("/etc/passwd").is_err());
        assert!(safe_relative_path("").is_err());
        assert_eq!(
            safe_relative_path("./a/b.txt").unwrap(),
            PathBuf::from("a").join("b.txt")
        );
    }

    #[test]
    fn test_short_member_keeps_format_kind() {
        let temp = TempDir::new().unwrap();
        let meta = FileMeta {
            name: "a.txt".into(),
            size: 5,
            offset: 0,
        };
        let out = temp.path().join("a.txt");
        let err = extract_member(&mut io::Cursor::new(vec![1u8, 2]), &meta, &out).unwrap_err();
        let err = err.with_context("Failed to extract 'a.txt'");
        assert!(matches!(err, StowawayError::Format(_)));
        assert!(err.to_string().contains("a.txt"));
    }

    #[test]
    fn test_truncated_archive_is_format_error() {
        let temp = TempDir::new().unwrap();
        let a = write(temp.path(), "a", &[9u8; 50]);
        let artifact = ArchiveAlgorithm::Basic
            .pack(&[ArchiveMember::new(&a, "a")], temp.path())
            .unwrap();
        let raw = fs::read(&artifact).unwrap();
        fs::write(&artifact, &raw[..raw.len() - 10]).unwrap();

        let err = ArchiveAlgorithm::Basic
            .unpack(&artifact, &temp.path().join("r"))
            .unwrap_err();
        assert!(matches!(err, StowawayError::Format(_)));
    }
}
