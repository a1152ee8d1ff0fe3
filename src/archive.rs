use std::fs::{self, File};
use std::io;
use std::path::Path;
use thiserror::Error;
use zip::ZipArchive;

/// Per-entry compression ratio above which an archive is rejected as a
/// likely decompression bomb.
pub const BOMB_RATIO_THRESHOLD: f64 = 100.0;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },
    #[error("suspicious compression ratio for {name}: {ratio:.1}:1")]
    SuspiciousRatio { name: String, ratio: f64 },
    #[error("total extracted size too large: {size} bytes (limit {limit})")]
    ExtractedTooLarge { size: u64, limit: u64 },
    #[error("invalid zip archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Validate an untrusted archive before anything is extracted: overall file
/// size, per-entry compression ratio, and total declared extracted size.
pub fn validate_archive(path: &Path, max_size: u64, max_extracted: u64) -> Result<(), ArchiveError> {
    let size = fs::metadata(path)?.len();
    if size > max_size {
        return Err(ArchiveError::TooLarge {
            size,
            limit: max_size,
        });
    }

    let mut archive = ZipArchive::new(File::open(path)?)?;
    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        if entry.compressed_size() > 0 {
            let ratio = entry.size() as f64 / entry.compressed_size() as f64;
            if ratio > BOMB_RATIO_THRESHOLD {
                return Err(ArchiveError::SuspiciousRatio {
                    name: entry.name().to_string(),
                    ratio,
                });
            }
        }
        total += entry.size();
        if total > max_extracted {
            return Err(ArchiveError::ExtractedTooLarge {
                size: total,
                limit: max_extracted,
            });
        }
    }
    Ok(())
}

/// Extract a validated archive into `dest`. Entries with traversal-shaped
/// names or above the per-file size cap are skipped with a warning rather
/// than failing the extraction.
pub fn extract_archive(path: &Path, dest: &Path, max_single_file: u64) -> Result<(), ArchiveError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    fs::create_dir_all(dest)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if name.contains("..") || name.starts_with('/') {
            tracing::warn!(%name, "skipping potentially malicious archive path");
            continue;
        }
        if entry.size() > max_single_file {
            tracing::warn!(%name, size = entry.size(), "skipping oversized archive entry");
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!(%name, "skipping archive entry with unresolvable path");
            continue;
        };

        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}
