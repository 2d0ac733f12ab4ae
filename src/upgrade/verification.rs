//! Integrity checks for a downloaded package.
//!
//! Two checks run before extraction: the file size must match the size the
//! release advertised, and, when the release publishes a checksum file, the
//! SHA-256 of the package must match its entry there.

use crate::core::error::{IoResultExt, Result, UpdateError};
use crate::upgrade::release::{AssetMetadata, ReleaseMetadata, is_checksum_name};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Computes and compares SHA-256 checksums.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Lower-case hex SHA-256 of the file at `path`, read in chunks.
    pub fn compute_sha256(path: &Path) -> Result<String> {
        let mut file = File::open(path).fs_context("open", path)?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let read = file.read(&mut buffer).fs_context("read", path)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Fails with [`UpdateError::CorruptArchive`] if the checksums differ.
    ///
    /// The comparison ignores case and an optional `sha256:` prefix.
    pub fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
        let actual = Self::compute_sha256(path)?;
        let expected = expected.trim();
        let expected = expected.strip_prefix("sha256:").unwrap_or(expected);

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdateError::corrupt(
                path,
                format!("checksum mismatch (expected {expected}, actual {actual})"),
            ));
        }
        info!("Checksum verified for {}", path.display());
        Ok(())
    }

    /// Finds the entry for `asset_name` in a `sha256sum`-style listing.
    ///
    /// Accepts `<hash>  <name>`, `<hash> *<name>`, and a bare `<hash>` (for
    /// per-asset `.sha256` files).
    #[must_use]
    pub fn find_expected_checksum(listing: &str, asset_name: &str) -> Option<String> {
        let mut bare = None;
        for line in listing.lines() {
            let mut parts = line.split_whitespace();
            let Some(hash) = parts.next() else { continue };
            match parts.next() {
                Some(name) => {
                    let name = name.trim_start_matches('*');
                    let name = name.rsplit('/').next().unwrap_or(name);
                    if name.eq_ignore_ascii_case(asset_name) {
                        return Some(hash.to_string());
                    }
                }
                None if bare.is_none() => bare = Some(hash.to_string()),
                None => {}
            }
        }
        bare
    }
}

/// Size check against what the release advertised. A size of zero means unknown.
pub fn verify_size(path: &Path, expected_bytes: u64) -> Result<()> {
    if expected_bytes == 0 {
        return Ok(());
    }
    let actual = std::fs::metadata(path).fs_context("inspect", path)?.len();
    if actual != expected_bytes {
        return Err(UpdateError::corrupt(
            path,
            format!("size mismatch (expected {expected_bytes} bytes, got {actual})"),
        ));
    }
    Ok(())
}

/// The checksum asset that covers `asset_name`, if the release has one.
///
/// Prefers `<asset>.sha256`, then a shared listing (`checksums.txt`,
/// `SHA256SUMS`, or any other `*.sha256`).
#[must_use]
pub fn find_checksum_asset<'a>(
    release: &'a ReleaseMetadata,
    asset_name: &str,
) -> Option<&'a AssetMetadata> {
    let dedicated = format!("{asset_name}.sha256").to_lowercase();
    let candidates = || release.assets.iter().filter(|a| !a.download_url.trim().is_empty());

    candidates().find(|a| a.name.to_lowercase() == dedicated).or_else(|| {
        candidates().find(|a| is_checksum_name(&a.name))
    })
}
