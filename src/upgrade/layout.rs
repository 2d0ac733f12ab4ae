//! Where things are on disk, computed once per invocation.
//!
//! The updater ships in its own subdirectory of the installation it maintains:
//!
//! ```text
//! <install dir>/
//! ├── Widget.exe
//! ├── config.json
//! └── updater/
//!     ├── updraft.exe
//!     └── updraft.toml
//! ```
//!
//! so the install directory is the parent of the updater's directory unless the
//! caller says otherwise. Every sync step receives its exclusion set from here.

use crate::config::{CONFIG_FILE_NAME, ProtectConfig};
use crate::core::error::{IoResultExt, Result};
use crate::upgrade::sync::Exclusions;
use std::path::{Path, PathBuf};

/// Files the updater owns, wherever they appear.
pub const UPDATER_FILES: &[&str] = &[CONFIG_FILE_NAME, "updraft", "updraft.exe", "updraft.pdb"];

/// Application files that survive an update even though packages never ship them.
pub const PRESERVED_FILES: &[&str] = &["config.json", "appsettings.json", "syncstats.json"];

/// Directories that hold operator data rather than application files.
pub const PRESERVED_DIRS: &[&str] = &["backup", "backups", "downloads"];

/// The install directory and the updater's identity inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    install_dir: PathBuf,
    updater_exe_name: Option<String>,
    updater_dir_name: Option<String>,
}

impl InstallLayout {
    /// Layout for the running updater.
    ///
    /// `install_dir` overrides the default of "parent of the updater's directory".
    pub fn detect(install_dir: Option<&Path>) -> Result<Self> {
        let exe = std::env::current_exe().fs_context("locate", Path::new("current executable"))?;
        let exe = exe.canonicalize().unwrap_or(exe);
        let updater_dir = exe.parent().unwrap_or_else(|| Path::new("."));

        let install_dir = match install_dir {
            Some(dir) => dir.to_path_buf(),
            None => updater_dir.parent().unwrap_or(updater_dir).to_path_buf(),
        };
        Ok(Self::new(install_dir, &exe))
    }

    /// Layout for an updater binary at `updater_exe` maintaining `install_dir`.
    #[must_use]
    pub fn new(install_dir: impl Into<PathBuf>, updater_exe: &Path) -> Self {
        let name_of = |p: Option<&Path>| {
            p.and_then(Path::file_name)
                .map(|n| n.to_string_lossy().into_owned())
                .filter(|n| !n.is_empty())
        };
        Self {
            install_dir: install_dir.into(),
            updater_exe_name: name_of(Some(updater_exe)),
            updater_dir_name: name_of(updater_exe.parent()),
        }
    }

    #[must_use]
    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    #[must_use]
    pub fn updater_exe_name(&self) -> Option<&str> {
        self.updater_exe_name.as_deref()
    }

    #[must_use]
    pub fn updater_dir_name(&self) -> Option<&str> {
        self.updater_dir_name.as_deref()
    }

    /// Names the updater must never back up over, overwrite or restore over:
    /// its own binaries and config, and its own directory.
    #[must_use]
    pub fn updater_exclusions(&self) -> Exclusions {
        Exclusions::new()
            .with_files(UPDATER_FILES.iter().copied())
            .with_files(self.updater_exe_name.iter())
            .with_dirs(self.updater_dir_name.iter())
    }

    /// Everything clean and purge leave alone: the updater's own names, the
    /// preserved application files and data directories, and `extra`.
    #[must_use]
    pub fn protected_exclusions(&self, extra: &ProtectConfig) -> Exclusions {
        self.updater_exclusions().union(
            &Exclusions::new()
                .with_files(PRESERVED_FILES.iter().copied())
                .with_files(&extra.files)
                .with_dirs(PRESERVED_DIRS.iter().copied())
                .with_dirs(&extra.dirs),
        )
    }
}
