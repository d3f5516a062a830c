//! Artifact inspection output

use std::path::Path;

use walkdir::WalkDir;

use super::format_size;
use crate::backup::ArtifactKind;
use crate::error::StowawayResult;
use crate::{compress, crypto};

/// Describe an artifact from its headers, without decoding the payload
pub fn format_inspection(path: &Path) -> StowawayResult<String> {
    let kind = ArtifactKind::sniff(path)?;
    let mut output = String::new();
    output.push_str(&format!("Artifact: {}\n", path.display()));
    output.push_str(&format!("  Kind:           {}\n", kind));

    match kind {
        ArtifactKind::Archive(algorithm) => {
            let index = algorithm.read_index(path)?;
            output.push_str(&format!("  Files:          {}\n", index.files.len()));
            output.push_str(&format!("  Content size:   {}\n", format_size(index.total_size())));
            output.push_str(&format!("  Header size:    {}\n", index.content_start()));
            for file in &index.files {
                output.push_str(&format!(
                    "    {:>10}  @{:<10}  {}\n",
                    format_size(file.size),
                    file.offset,
                    file.name
                ));
            }
        }
        ArtifactKind::Compressed(_) => {
            let header = compress::read_header(path)?;
            let symbols = header.freq_table_size / 9;
            output.push_str(&format!("  Original size:  {}\n", format_size(header.original_size)));
            output.push_str(&format!("  Symbols:        {}\n", symbols));
            output.push_str(&format!("  Padding bits:   {}\n", header.valid_bits));
            output.push_str(&format!("  CRC32:          {:08x}\n", header.crc32));
        }
        ArtifactKind::Encrypted(_) => {
            let header = crypto::cipher::read_header(path)?;
            output.push_str(&format!("  Format version: {}\n", header.version));
            output.push_str("  Key derivation: Argon2id\n");
            output.push_str(&format!("    Memory Cost:  {} KiB\n", header.params.memory_cost));
            output.push_str(&format!("    Time Cost:    {} iterations\n", header.params.time_cost));
            output.push_str(&format!("    Parallelism:  {} threads\n", header.params.parallelism));
        }
        ArtifactKind::Directory => {
            let (files, bytes) = WalkDir::new(path)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_file())
                .fold((0usize, 0u64), |(n, total), e| {
                    (n + 1, total + e.metadata().map(|m| m.len()).unwrap_or(0))
                });
            output.push_str(&format!("  Files:          {}\n", files));
            output.push_str(&format!("  Total size:     {}\n", format_size(bytes)));
        }
        ArtifactKind::Plain => {
            let size = std::fs::metadata(path)?.len();
            output.push_str(&format!("  Size:           {}\n", format_size(size)));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveAlgorithm, ArchiveMember};
    use crate::compress::CompressionAlgorithm;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_archive() {
        let temp = TempDir::new().unwrap();
        let f1 = temp.path().join("f1.txt");
        fs::write(&f1, b"0123456789").unwrap();
        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();
        let artifact = ArchiveAlgorithm::Basic
            .pack(&[ArchiveMember::new(&f1, "f1.txt")], &out)
            .unwrap();

        let text = format_inspection(&artifact).unwrap();
        assert!(text.contains("archive (basic)"));
        assert!(text.contains("Files:          1"));
        assert!(text.contains("f1.txt"));
    }

    #[test]
    fn test_inspect_compressed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("hello.huff");
        fs::write(&path, CompressionAlgorithm::Huffman.compress_bytes(b"Hello, World!").unwrap()).unwrap();

        let text = format_inspection(&path).unwrap();
        assert!(text.contains("compressed (huffman)"));
        assert!(text.contains("Symbols:        10"));
        assert!(text.contains("CRC32:          ec4ac3d0"));
    }

    #[test]
    fn test_inspect_plain_and_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"plain text").unwrap();
        assert!(format_inspection(&path).unwrap().contains("plain file"));
        assert!(format_inspection(&temp.path().join("missing")).is_err());
    }
}
