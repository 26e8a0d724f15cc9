//! Extraction of subtitle files from an uploaded zip archive.

use std::io::{Cursor, Read};

use bytes::Bytes;
use tracing::debug;
use zip::ZipArchive;

use crate::core::error::LibraryError;

/// Limits applied while reading an archive.
#[derive(Debug, Clone, Copy)]
pub struct ArchiveLimits {
    /// Maximum number of file entries (directories excluded).
    pub max_entries: usize,
    /// Maximum decompressed size of any single entry.
    pub max_entry_size_bytes: u64,
}

/// A subtitle file found inside an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Path of the entry inside the archive.
    pub name: String,
    pub data: Bytes,
}

fn archive_error(reason: impl Into<String>) -> LibraryError {
    LibraryError::Archive {
        reason: reason.into(),
    }
}

/// Whether an entry is resource-fork or hidden-file noise.
fn is_noise(name: &str) -> bool {
    if name.starts_with("__MACOSX/") {
        return true;
    }
    let base = name.rsplit('/').next().unwrap_or(name);
    base.starts_with('.')
}

fn is_subtitle(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".srt")
}

/// Read every `.srt` entry from a zip archive, in archive order.
///
/// Directories, `__MACOSX/` entries, dot-files and non-subtitle files are
/// ignored. The whole archive is rejected if it holds more files than
/// allowed or any entry decompresses beyond the per-entry limit.
pub fn read_archive(data: &[u8], limits: ArchiveLimits) -> Result<Vec<ArchiveEntry>, LibraryError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| archive_error(format!("not a readable zip archive: {}", e)))?;

    let mut entries = Vec::new();
    let mut files = 0usize;

    for index in 0..archive.len() {
        let file = archive
            .by_index(index)
            .map_err(|e| archive_error(format!("entry {} is unreadable: {}", index, e)))?;
        if file.is_dir() {
            continue;
        }

        files += 1;
        if files > limits.max_entries {
            return Err(archive_error(format!(
                "archive holds more than {} files",
                limits.max_entries
            )));
        }

        let name = file.name().to_string();
        if is_noise(&name) || !is_subtitle(&name) {
            debug!(entry = %name, "ignoring non-subtitle archive entry");
            continue;
        }

        // The declared size can lie, so the read itself is bounded.
        let mut buf = Vec::new();
        file.take(limits.max_entry_size_bytes + 1)
            .read_to_end(&mut buf)
            .map_err(|e| archive_error(format!("failed to read entry '{}': {}", name, e)))?;
        if buf.len() as u64 > limits.max_entry_size_bytes {
            return Err(archive_error(format!(
                "entry '{}' exceeds {} bytes",
                name, limits.max_entry_size_bytes
            )));
        }

        entries.push(ArchiveEntry {
            name,
            data: Bytes::from(buf),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const LIMITS: ArchiveLimits = ArchiveLimits {
        max_entries: 10,
        max_entry_size_bytes: 1024,
    };

    fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in files {
            if name.ends_with('/') {
                writer
                    .add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(body.as_bytes()).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_reads_only_subtitles() {
        let zip = build_zip(&[
            ("subs/", ""),
            ("subs/Show.S01E01.srt", "one"),
            ("subs/Show.S01E02.SRT", "two"),
            ("subs/notes.txt", "ignore"),
            ("__MACOSX/subs/._Show.S01E01.srt", "junk"),
            ("subs/.hidden.srt", "junk"),
        ]);
        let entries = read_archive(&zip, LIMITS).unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["subs/Show.S01E01.srt", "subs/Show.S01E02.SRT"]);
        assert_eq!(entries[0].data, Bytes::from_static(b"one"));
    }

    #[test]
    fn test_too_many_entries() {
        let names: Vec<String> = (1..=3).map(|i| format!("{}.srt", i)).collect();
        let files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x")).collect();
        let zip = build_zip(&files);
        let limits = ArchiveLimits {
            max_entries: 2,
            ..LIMITS
        };
        assert!(matches!(
            read_archive(&zip, limits),
            Err(LibraryError::Archive { .. })
        ));
    }

    #[test]
    fn test_oversized_entry() {
        let big = "a".repeat(2048);
        let zip = build_zip(&[("1.srt", big.as_str())]);
        assert!(matches!(
            read_archive(&zip, LIMITS),
            Err(LibraryError::Archive { .. })
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            read_archive(b"definitely not a zip", LIMITS),
            Err(LibraryError::Archive { .. })
        ));
    }
}
