//! Exclusion-aware tree operations used by backup, apply, restore and purge.
//!
//! All name comparisons are case-insensitive, matching how installers are laid
//! out on Windows. Per-entry deletion failures during [`clean_root`] and
//! [`purge_obsolete`] are collected as warnings instead of aborting the
//! operation, since files can be held open by the OS.
//!
//! The walking operations take a [`CancellationToken`] and check it before
//! every entry, so a cancelled run stops mid-tree instead of finishing the walk.

use crate::core::error::{IoResultExt, Result, UpdateError};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// File and directory names that a tree operation must not touch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Exclusions {
    files: HashSet<String>,
    dirs: HashSet<String>,
}

impl Exclusions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_files<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.files.extend(names.into_iter().map(|n| n.as_ref().to_lowercase()));
        self
    }

    #[must_use]
    pub fn with_dirs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dirs.extend(names.into_iter().map(|n| n.as_ref().to_lowercase()));
        self
    }

    /// Both sets of `self` plus both sets of `other`.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            files: self.files.union(&other.files).cloned().collect(),
            dirs: self.dirs.union(&other.dirs).cloned().collect(),
        }
    }

    #[must_use]
    pub fn excludes_file(&self, name: &OsStr) -> bool {
        self.files.contains(&name.to_string_lossy().to_lowercase())
    }

    #[must_use]
    pub fn excludes_dir(&self, name: &OsStr) -> bool {
        self.dirs.contains(&name.to_string_lossy().to_lowercase())
    }

    /// Whether the relative directory path `relative`, or any directory above
    /// it, is excluded. With `root_only` only the first component counts.
    fn path_in_excluded_dir(&self, relative: &Path, root_only: bool) -> bool {
        let mut dirs = relative.components().filter_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });
        if root_only {
            dirs.next().is_some_and(|first| self.excludes_dir(first))
        } else {
            dirs.any(|name| self.excludes_dir(name))
        }
    }
}

/// How [`purge_obsolete`] treats protected names below the install root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgePolicy {
    /// Protect excluded file and directory names at any depth (`true`), or
    /// only at the install root (`false`).
    pub protect_nested_names: bool,
}

impl Default for PurgePolicy {
    fn default() -> Self {
        Self {
            protect_nested_names: true,
        }
    }
}

/// Outcome of a best-effort operation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Files and directories removed
    pub removed: usize,
    /// Per-entry failures that were skipped
    pub warnings: Vec<String>,
}

impl SyncReport {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(message);
    }
}

/// Recursively copies `src` into `dst`, overwriting existing files.
///
/// Files whose name is excluded and directories whose name is excluded are
/// skipped at every nesting level. Symlinks are not followed. Returns the number
/// of files copied.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    exclusions: &Exclusions,
    cancel: &CancellationToken,
) -> Result<usize> {
    if !src.is_dir() {
        return Err(UpdateError::fs(
            "read directory",
            src,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source directory does not exist"),
        ));
    }
    fs::create_dir_all(dst).fs_context("create directory", dst)?;

    let mut copied = 0;
    for entry in fs::read_dir(src).fs_context("read directory", src)? {
        ensure_active(cancel)?;
        let entry = entry.fs_context("read directory", src)?;
        let file_type = entry.file_type().fs_context("inspect", &entry.path())?;
        let name = entry.file_name();
        let src_path = entry.path();
        let dst_path = dst.join(&name);

        if file_type.is_dir() {
            if exclusions.excludes_dir(&name) {
                debug!("Skipping excluded directory {}", src_path.display());
                continue;
            }
            copied += copy_tree(&src_path, &dst_path, exclusions, cancel)?;
        } else if file_type.is_file() {
            if exclusions.excludes_file(&name) {
                debug!("Skipping excluded file {}", src_path.display());
                continue;
            }
            fs::copy(&src_path, &dst_path).fs_context("copy", &src_path)?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Deletes every top-level entry of `dir` whose name is not excluded.
///
/// Directories are removed recursively. Failures are recorded and skipped.
pub fn clean_root(dir: &Path, exclusions: &Exclusions) -> SyncReport {
    let mut report = SyncReport::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.warn(format!("Failed to list '{}': {e}", dir.display()));
            return report;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let path = entry.path();
        let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());

        let result = if is_dir {
            if exclusions.excludes_dir(&name) {
                continue;
            }
            fs::remove_dir_all(&path)
        } else {
            if exclusions.excludes_file(&name) {
                continue;
            }
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => {
                debug!("Removed {}", path.display());
                report.removed += 1;
            }
            Err(e) => report.warn(format!(
                "Failed to remove {} '{}': {e}",
                if is_dir { "directory" } else { "file" },
                name.to_string_lossy()
            )),
        }
    }

    report
}

/// Copies the extracted package tree at `from` onto `install_dir`.
///
/// Like [`copy_tree`], but walks the whole source tree and skips anything whose
/// relative path passes through an excluded directory name, however deeply the
/// package nests it. Returns the number of files written.
pub fn apply_tree(
    from: &Path,
    install_dir: &Path,
    exclusions: &Exclusions,
    cancel: &CancellationToken,
) -> Result<usize> {
    let mut applied = 0;
    let walker = WalkDir::new(from).min_depth(1).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir() && exclusions.excludes_dir(entry.file_name()))
    });

    for entry in walker {
        ensure_active(cancel)?;
        let entry = entry.map_err(|e| walk_error(from, e))?;
        let relative = relative_to(from, entry.path());
        let target = install_dir.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).fs_context("create directory", &target)?;
        } else if entry.file_type().is_file() {
            if exclusions.excludes_file(entry.file_name()) {
                debug!("Not overwriting protected file {}", relative.display());
                continue;
            }
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).fs_context("create directory", parent)?;
            }
            fs::copy(entry.path(), &target).fs_context("copy", entry.path())?;
            applied += 1;
        }
    }

    Ok(applied)
}

/// Removes files from `install_dir` that the new tree at `new_tree` does not
/// contain, then removes directories left empty, deepest first.
///
/// Excluded names are never removed; `policy` decides whether that protection
/// extends below the install root. Deletion failures are recorded and skipped;
/// cancellation is not.
pub fn purge_obsolete(
    new_tree: &Path,
    install_dir: &Path,
    exclusions: &Exclusions,
    policy: PurgePolicy,
    cancel: &CancellationToken,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let root_only = !policy.protect_nested_names;

    let mut wanted = HashSet::new();
    for entry in WalkDir::new(new_tree).min_depth(1) {
        let entry = entry.map_err(|e| walk_error(new_tree, e))?;
        if entry.file_type().is_file() {
            wanted.insert(path_key(relative_to(new_tree, entry.path())));
        }
    }

    let is_protected_dir = |relative: &Path| exclusions.path_in_excluded_dir(relative, root_only);

    let mut directories = Vec::new();
    let walker = WalkDir::new(install_dir).min_depth(1).into_iter().filter_entry(|entry| {
        !(entry.file_type().is_dir() && is_protected_dir(relative_to(install_dir, entry.path())))
    });

    for entry in walker {
        ensure_active(cancel)?;
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.warn(format!("Failed to scan '{}': {e}", install_dir.display()));
                continue;
            }
        };
        let relative = relative_to(install_dir, entry.path()).to_path_buf();

        if entry.file_type().is_dir() {
            directories.push(relative);
            continue;
        }

        let at_root = relative.components().count() == 1;
        let name_protected = (at_root || !root_only) && exclusions.excludes_file(entry.file_name());
        if name_protected || wanted.contains(&path_key(&relative)) {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                debug!("Purged obsolete file {}", relative.display());
                report.removed += 1;
            }
            Err(e) => report.warn(format!("Failed to purge '{}': {e}", relative.display())),
        }
    }

    directories.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
    for relative in directories {
        let path = install_dir.join(&relative);
        let is_empty = fs::read_dir(&path).is_ok_and(|mut entries| entries.next().is_none());
        if is_empty {
            match fs::remove_dir(&path) {
                Ok(()) => {
                    debug!("Removed empty directory {}", relative.display());
                    report.removed += 1;
                }
                Err(e) => debug!("Could not remove directory {}: {}", relative.display(), e),
            }
        }
    }

    Ok(report)
}

/// `Err(Cancelled)` once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(UpdateError::Cancelled);
    }
    Ok(())
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// Case-insensitive, separator-independent key for a relative path.
fn path_key(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .collect::<Vec<_>>()
        .join("/")
}

fn walk_error(root: &Path, error: walkdir::Error) -> UpdateError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
    UpdateError::fs("walk", &path, source)
}
