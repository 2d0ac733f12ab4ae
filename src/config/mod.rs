//! Configuration for the updater.
//!
//! The updater reads `updraft.toml` from its own directory (or from `--config`).
//! A missing file is not an error: every field has a default, and the CLI can
//! override the repository and target fields individually.
//!
//! ```toml
//! [repository]
//! owner = "acme"
//! name = "widget"
//! asset_filter = ".zip"          # case-insensitive substring of the asset name
//! # api_url = "https://api.github.com"
//!
//! [target]
//! process_name = "Widget"        # without extension
//! executable = "Widget.exe"
//!
//! [protect]
//! files = ["license.key"]        # never deleted or overwritten by the update
//! dirs = ["data"]
//!
//! [update]
//! verify_checksum = true
//! protect_nested_names = true
//! launch_after_update = false
//! ```
//!
//! An [`UpdaterConfig`] is a plain value: the orchestrator receives it by
//! reference at the start of every operation and never stores it.

use crate::upgrade::config::UpdateSettings;
use crate::upgrade::release::DEFAULT_API_URL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the updater configuration.
pub const CONFIG_FILE_NAME: &str = "updraft.toml";

/// Complete updater configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub protect: ProtectConfig,
    #[serde(default)]
    pub update: UpdateSettings,
}

/// Where releases come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    /// Case-insensitive substring selecting the package among release assets.
    #[serde(default = "default_asset_filter")]
    pub asset_filter: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: String::new(),
            name: String::new(),
            asset_filter: default_asset_filter(),
            api_url: default_api_url(),
        }
    }
}

fn default_asset_filter() -> String {
    ".zip".to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

/// The application being updated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Process name to stop before replacing files, without extension.
    #[serde(default)]
    pub process_name: String,
    /// Executable file name relative to the install directory.
    #[serde(default)]
    pub executable: String,
}

/// Extra names added to the protected set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectConfig {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub dirs: Vec<String>,
}

/// `updraft.toml` in the directory of the running binary.
pub fn default_config_path() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate the updraft executable")?;
    let dir = exe
        .parent()
        .context("The updraft executable has no parent directory")?;
    Ok(dir.join(CONFIG_FILE_NAME))
}

impl UpdaterConfig {
    /// Loads `path`, or returns the defaults when it does not exist.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Loads and parses a TOML config file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Checks that the fields a release check needs are present.
    ///
    /// Returns a message suitable for a failed check result.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.repository.owner.trim().is_empty() || self.repository.name.trim().is_empty() {
            return Err("Repository owner and name must be configured".to_string());
        }
        if self.repository.asset_filter.trim().is_empty() {
            return Err("Asset filter must not be empty".to_string());
        }
        Ok(())
    }
}
