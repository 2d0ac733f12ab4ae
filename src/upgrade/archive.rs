//! Zip package validation and extraction.

use crate::core::error::{IoResultExt, Result, UpdateError};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use zip::ZipArchive;

const EXTRACT_CHUNK_SIZE: usize = 128 * 1024;

/// Totals for a finished extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

fn open(archive_path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(archive_path).fs_context("open", archive_path)?;
    ZipArchive::new(file).map_err(|e| UpdateError::corrupt(archive_path, e.to_string()))
}

/// Opens the package and checks it has at least one entry.
///
/// Returns the number of entries.
pub fn validate_archive(archive_path: &Path) -> Result<usize> {
    let archive = open(archive_path)?;
    if archive.is_empty() {
        return Err(UpdateError::corrupt(archive_path, "archive has no entries"));
    }
    Ok(archive.len())
}

/// Extracts every entry of the zip at `archive_path` under `dest`.
///
/// Directory entries become empty directories; file entries are streamed in
/// fixed-size chunks. After each chunk `on_progress` receives the fraction of
/// file bytes written so far; when the archive declares no file bytes at all
/// only the final `1.0` is reported. Entries that would land outside `dest`
/// are rejected.
///
/// # Errors
///
/// - [`UpdateError::CorruptArchive`] if the archive cannot be opened, has no
///   entries, contains an unsafe path, or fails to decompress
/// - [`UpdateError::FileSystem`] if the destination cannot be written
/// - [`UpdateError::Cancelled`] if `cancel` fires between chunks
pub fn extract_archive<F>(
    archive_path: &Path,
    dest: &Path,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<ExtractSummary>
where
    F: FnMut(f64),
{
    let mut archive = open(archive_path)?;
    if archive.is_empty() {
        return Err(UpdateError::corrupt(archive_path, "archive has no entries"));
    }

    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let entry = archive
            .by_index(index)
            .map_err(|e| UpdateError::corrupt(archive_path, e.to_string()))?;
        if !entry.is_dir() {
            total += entry.size();
        }
    }
    debug!("Extracting {} entries ({} bytes)", archive.len(), total);

    let mut summary = ExtractSummary::default();
    let mut buffer = vec![0u8; EXTRACT_CHUNK_SIZE];

    for index in 0..archive.len() {
        if cancel.is_cancelled() {
            return Err(UpdateError::Cancelled);
        }

        let mut entry = archive
            .by_index(index)
            .map_err(|e| UpdateError::corrupt(archive_path, e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(UpdateError::corrupt(
                archive_path,
                format!("entry '{}' escapes the extraction directory", entry.name()),
            ));
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target).fs_context("create directory", &target)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).fs_context("create directory", parent)?;
        }
        let mut output = File::create(&target).fs_context("create", &target)?;

        loop {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }
            let read = entry
                .read(&mut buffer)
                .map_err(|e| UpdateError::corrupt(archive_path, e.to_string()))?;
            if read == 0 {
                break;
            }
            output.write_all(&buffer[..read]).fs_context("write", &target)?;
            summary.bytes += read as u64;
            if total > 0 {
                on_progress((summary.bytes as f64 / total as f64).min(1.0));
            }
        }
        summary.files += 1;
    }

    on_progress(1.0);
    info!(
        "Extracted {} files and {} directories to {}",
        summary.files,
        summary.directories,
        dest.display()
    );
    Ok(summary)
}

#[cfg(test)]
pub(crate) fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}
