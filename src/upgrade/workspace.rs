//! Per-run scratch space: the backup snapshot, the downloaded package and the
//! extracted tree all live under one uniquely named directory.

use crate::core::error::{IoResultExt, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const BACKUP_DIR: &str = "backup";
const EXTRACT_DIR: &str = "extracted";
const DEFAULT_PACKAGE_NAME: &str = "update.zip";

/// Workspace directories are named `updraft-<uuid>`.
pub const WORKSPACE_PREFIX: &str = "updraft-";

/// A private temporary directory for one update run.
///
/// The directory name carries a random UUID, so concurrent runs never share a
/// workspace. It is removed by [`Workspace::cleanup`], or on drop if the run
/// unwinds without reaching cleanup.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    removed: bool,
}

impl Workspace {
    /// Creates `<parent>/updraft-<uuid>`.
    pub fn create(parent: &Path) -> Result<Self> {
        let root = parent.join(format!("{WORKSPACE_PREFIX}{}", uuid::Uuid::new_v4().simple()));
        fs::create_dir_all(&root).fs_context("create workspace", &root)?;
        debug!("Created workspace {}", root.display());
        Ok(Self {
            root,
            removed: false,
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    #[must_use]
    pub fn extract_dir(&self) -> PathBuf {
        self.root.join(EXTRACT_DIR)
    }

    /// Where the package named `asset_name` is downloaded to.
    ///
    /// Only the final path component of the asset name is used.
    #[must_use]
    pub fn package_path(&self, asset_name: &str) -> PathBuf {
        let file_name = Path::new(asset_name)
            .file_name()
            .filter(|n| !n.is_empty())
            .map_or_else(|| DEFAULT_PACKAGE_NAME.into(), |n| n.to_os_string());
        self.root.join(file_name)
    }

    /// Removes and recreates `dir`, leaving it empty.
    pub fn ensure_empty(dir: &Path) -> Result<()> {
        if dir.exists() {
            fs::remove_dir_all(dir).fs_context("remove", dir)?;
        }
        fs::create_dir_all(dir).fs_context("create directory", dir)
    }

    /// Deletes the workspace. Failures are logged and returned as a message.
    pub fn cleanup(mut self) -> Option<String> {
        self.remove()
    }

    fn remove(&mut self) -> Option<String> {
        if self.removed {
            return None;
        }
        self.removed = true;
        match fs::remove_dir_all(&self.root) {
            Ok(()) => {
                debug!("Removed workspace {}", self.root.display());
                None
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                let message =
                    format!("Failed to remove workspace '{}': {e}", self.root.display());
                warn!("{}", message);
                Some(message)
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspaces_are_unique_and_removed() {
        let parent = TempDir::new().unwrap();
        let first = Workspace::create(parent.path()).unwrap();
        let second = Workspace::create(parent.path()).unwrap();
        assert_ne!(first.root(), second.root());
        let name = first.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(WORKSPACE_PREFIX), "unexpected name {name}");
        assert_eq!(name.len(), WORKSPACE_PREFIX.len() + 32);

        fs::create_dir_all(first.backup_dir().join("nested")).unwrap();
        let root = first.root().to_path_buf();
        assert!(first.cleanup().is_none());
        assert!(!root.exists());

        let root = second.root().to_path_buf();
        drop(second);
        assert!(!root.exists());
    }

    #[test]
    fn test_package_path_uses_file_name_only() {
        let parent = TempDir::new().unwrap();
        let ws = Workspace::create(parent.path()).unwrap();
        assert_eq!(ws.package_path("app-1.1.0.zip"), ws.root().join("app-1.1.0.zip"));
        assert_eq!(ws.package_path("../../etc/app.zip"), ws.root().join("app.zip"));
        assert_eq!(ws.package_path(""), ws.root().join(DEFAULT_PACKAGE_NAME));
    }

    #[test]
    fn test_ensure_empty_recreates_directory() {
        let parent = TempDir::new().unwrap();
        let dir = parent.path().join("extracted");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("stale.txt"), "x").unwrap();

        Workspace::ensure_empty(&dir).unwrap();
        assert!(dir.is_dir());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }
}
