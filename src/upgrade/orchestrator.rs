//! The update pipeline.
//!
//! [`UpdateOrchestrator`] sequences version resolution, release lookup, backup,
//! cleaning, download, extraction, apply and purge. It is the only place where
//! errors are turned into outcomes: every component below it returns
//! [`Result`], and a single handler here decides whether the install directory
//! has to be restored from the backup.
//!
//! ```text
//! Idle -> Checking -> Failed | UpToDate | UpdateAvailable
//!      -> Preparing -> BackingUp -> Cleaning -> Downloading -> Extracting
//!      -> Applying -> Purging -> Succeeded
//!
//! any failure after Cleaning started -> RollingBack -> Failed
//! ```

use crate::config::UpdaterConfig;
use crate::core::error::{Result, UpdateError};
use crate::upgrade::archive::{extract_archive, validate_archive};
use crate::upgrade::layout::InstallLayout;
use crate::upgrade::process;
use crate::upgrade::release::ReleaseClient;
use crate::upgrade::report::{Progress, UpdateReporter, UpdateState, format_bytes};
use crate::upgrade::sync::{
    PurgePolicy, apply_tree, clean_root, copy_tree, ensure_active, purge_obsolete,
};
use crate::upgrade::verification::{ChecksumVerifier, find_checksum_asset, verify_size};
use crate::upgrade::version::{Version, parse_tag, resolve_local_version};
use crate::upgrade::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where each step lands on the 0-100 progress scale.
mod milestones {
    pub const BACKUP: f64 = 5.0;
    pub const CLEAN: f64 = 10.0;
    pub const DOWNLOAD: (f64, f64) = (15.0, 75.0);
    pub const EXTRACT: (f64, f64) = (78.0, 90.0);
    pub const APPLY: f64 = 92.0;
    pub const PURGE: f64 = 98.0;
    pub const DONE: f64 = 100.0;
}

/// Maps `fraction` of a step onto its `(start, end)` sub-range.
fn within(range: (f64, f64), fraction: f64) -> f64 {
    let (start, end) = range;
    start + (end - start) * fraction.clamp(0.0, 1.0)
}

/// Result of an update check. Produced fresh on every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub succeeded: bool,
    pub message: String,
    pub local_version: Version,
    pub remote_version: Version,
    pub download_url: Option<String>,
    pub asset_name: Option<String>,
    /// Advertised package size; zero when the release did not say.
    pub expected_size_bytes: u64,
    /// URL of the checksum file covering the package, when the release has one.
    pub checksum_url: Option<String>,
}

impl CheckResult {
    fn failed(local_version: Version, message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
            local_version,
            remote_version: Version::ZERO,
            download_url: None,
            asset_name: None,
            expected_size_bytes: 0,
            checksum_url: None,
        }
    }

    /// A newer release exists and the check itself succeeded.
    #[must_use]
    pub fn update_available(&self) -> bool {
        self.succeeded && self.remote_version > self.local_version
    }
}

/// Result of [`UpdateOrchestrator::perform_update`].
///
/// Versions are always the best known ones, even when the run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub succeeded: bool,
    pub old_version: Version,
    pub new_version: Version,
}

/// Runs update checks and updates against one install directory.
///
/// Calls must not overlap for the same install directory. Configuration is
/// passed to every call, so changes between a check and an update take effect
/// on the next call.
pub struct UpdateOrchestrator {
    layout: InstallLayout,
    reporter: Arc<dyn UpdateReporter>,
    workspace_parent: PathBuf,
}

impl UpdateOrchestrator {
    /// Workspaces are created under the system temp directory.
    pub fn new(layout: InstallLayout, reporter: Arc<dyn UpdateReporter>) -> Self {
        Self {
            layout,
            reporter,
            workspace_parent: std::env::temp_dir(),
        }
    }

    /// Creates per-run workspaces under `parent` instead of the temp directory.
    #[must_use]
    pub fn with_workspace_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.workspace_parent = parent.into();
        self
    }

    #[must_use]
    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    fn log(&self, message: &str) {
        info!("{}", message);
        self.reporter.log(message);
    }

    fn status(&self, message: &str) {
        self.reporter.status(message);
    }

    fn milestone(&self, percent: f64, detail: &str) {
        self.reporter.progress(Progress::new(percent, Some(detail.to_string())));
    }

    fn enter(&self, state: UpdateState) {
        debug!("Update state: {}", state);
        self.reporter.state(state);
    }

    /// Compares the installed version with the latest release.
    ///
    /// Never fails: configuration problems, transport errors, a missing asset
    /// and an unparsable tag all produce a result with `succeeded == false`.
    pub async fn check_for_updates(&self, config: &UpdaterConfig) -> CheckResult {
        self.enter(UpdateState::Checking);
        self.status("Checking for updates...");

        let local = resolve_local_version(self.layout.install_dir(), &config.target.executable);
        self.log(&format!("Installed version: {local}"));

        let result = match config.validate() {
            Err(message) => CheckResult::failed(local, message),
            Ok(()) => match self.fetch_check(config, local).await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Update check failed: {}", e);
                    CheckResult::failed(local, format!("Update check failed: {e}"))
                }
            },
        };

        let state = if !result.succeeded {
            UpdateState::Failed
        } else if result.update_available() {
            UpdateState::UpdateAvailable
        } else {
            UpdateState::UpToDate
        };
        self.reporter.log(&result.message);
        self.status(&result.message);
        self.enter(state);
        result
    }

    async fn fetch_check(&self, config: &UpdaterConfig, local: Version) -> Result<CheckResult> {
        let repo = &config.repository;
        let client = ReleaseClient::new(&repo.api_url)?;
        let release = client.fetch_latest_release(&repo.owner, &repo.name).await?;

        if release.tag.trim().is_empty() {
            return Err(UpdateError::not_found(format!(
                "latest release of {}/{} has no tag",
                repo.owner, repo.name
            )));
        }
        let remote = parse_tag(&release.tag).ok_or_else(|| UpdateError::VersionParse {
            tag: release.tag.clone(),
        })?;

        let asset = release.find_asset(&repo.asset_filter).ok_or_else(|| {
            UpdateError::not_found(format!(
                "no asset matching '{}' in release {}",
                repo.asset_filter, release.tag
            ))
        })?;
        let checksum_url =
            find_checksum_asset(&release, &asset.name).map(|a| a.download_url.clone());

        let message = if remote > local {
            format!("Update available: {local} -> {remote}")
        } else {
            format!("Already up to date ({local})")
        };

        Ok(CheckResult {
            succeeded: true,
            message,
            local_version: local,
            remote_version: remote,
            download_url: Some(asset.download_url.clone()),
            asset_name: Some(asset.name.clone()),
            expected_size_bytes: asset.size_bytes,
            checksum_url,
        })
    }

    /// Checks for an update and installs it.
    ///
    /// Nothing on disk changes unless the check finds a newer release. Once the
    /// install root has been cleaned, any failure or cancellation restores it
    /// from the backup taken just before. The per-run workspace is always removed.
    pub async fn perform_update(
        &self,
        config: &UpdaterConfig,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let check = self.check_for_updates(config).await;
        let mut outcome = UpdateOutcome {
            succeeded: false,
            old_version: check.local_version,
            new_version: check.remote_version,
        };
        if !check.update_available() {
            return outcome;
        }

        self.enter(UpdateState::Preparing);
        let workspace = match Workspace::create(&self.workspace_parent) {
            Ok(workspace) => workspace,
            Err(e) => {
                self.fail(&e);
                return outcome;
            }
        };

        let result = match self.prepare(config, &workspace, cancel).await {
            Ok(()) => match self.replace(config, &check, &workspace, cancel).await {
                Ok(()) => Ok(()),
                Err(e) => {
                    self.fail(&e);
                    self.roll_back(&workspace);
                    Err(e)
                }
            },
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        };

        if let Some(warning) = workspace.cleanup() {
            self.reporter.log(&warning);
        }

        match result {
            Ok(()) => {
                outcome.succeeded = true;
                self.milestone(milestones::DONE, "completed");
                let message = format!(
                    "Updated from {} to {}",
                    outcome.old_version, outcome.new_version
                );
                self.log(&message);
                self.status(&message);
                self.enter(UpdateState::Succeeded);

                if config.update.launch_after_update {
                    self.launch_target_app(config);
                }
            }
            Err(_) => self.enter(UpdateState::Failed),
        }
        outcome
    }

    /// Steps that leave the install directory untouched: stopping the target
    /// and taking the backup.
    async fn prepare(
        &self,
        config: &UpdaterConfig,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<()> {
        ensure_active(cancel)?;
        let stopped = process::stop_by_name(&config.target.process_name).await;
        if stopped > 0 {
            self.log(&format!(
                "Stopped {stopped} instance(s) of {}",
                config.target.process_name
            ));
        }

        ensure_active(cancel)?;
        self.enter(UpdateState::BackingUp);
        self.status("Backing up current installation...");
        let copied = copy_tree(
            self.layout.install_dir(),
            &workspace.backup_dir(),
            &self.layout.updater_exclusions(),
            cancel,
        )?;
        self.log(&format!("Backed up {copied} files"));
        self.milestone(milestones::BACKUP, "backup complete");
        Ok(())
    }

    /// Steps that modify the install directory. A failure here is rolled back.
    async fn replace(
        &self,
        config: &UpdaterConfig,
        check: &CheckResult,
        workspace: &Workspace,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let install_dir = self.layout.install_dir();
        let protected = self.layout.protected_exclusions(&config.protect);

        ensure_active(cancel)?;
        self.enter(UpdateState::Cleaning);
        self.status("Removing current files...");
        let cleaned = clean_root(install_dir, &protected);
        for warning in &cleaned.warnings {
            self.reporter.log(warning);
        }
        self.milestone(milestones::CLEAN, "install directory cleaned");

        ensure_active(cancel)?;
        self.enter(UpdateState::Downloading);
        let (Some(url), Some(asset_name)) = (&check.download_url, &check.asset_name) else {
            return Err(UpdateError::not_found("download URL for the matched asset"));
        };
        self.status(&format!("Downloading {asset_name}..."));
        let client = ReleaseClient::new(&config.repository.api_url)?;
        let package = workspace.package_path(asset_name);
        let reporter = &self.reporter;
        let downloaded = client
            .download_asset(url, &package, cancel, |written, total| match total {
                Some(total) if total > 0 => reporter.progress(Progress::new(
                    within(milestones::DOWNLOAD, written as f64 / total as f64),
                    Some(format!("{} / {}", format_bytes(written), format_bytes(total))),
                )),
                _ => reporter.progress(Progress::indeterminate(format!(
                    "{} downloaded",
                    format_bytes(written)
                ))),
            })
            .await?;
        self.log(&format!("Downloaded {}", format_bytes(downloaded)));

        verify_size(&package, check.expected_size_bytes)?;
        validate_archive(&package)?;
        if config.update.verify_checksum {
            self.verify_package(&client, check, asset_name, &package).await?;
        }

        ensure_active(cancel)?;
        self.enter(UpdateState::Extracting);
        self.status("Extracting package...");
        let extract_dir = workspace.extract_dir();
        Workspace::ensure_empty(&extract_dir)?;
        let summary = extract_archive(&package, &extract_dir, cancel, |fraction| {
            reporter.progress(Progress::new(
                within(milestones::EXTRACT, fraction),
                Some("extracting".to_string()),
            ));
        })?;
        self.log(&format!("Extracted {} files", summary.files));

        ensure_active(cancel)?;
        self.enter(UpdateState::Applying);
        self.status("Installing new files...");
        let applied =
            apply_tree(&extract_dir, install_dir, &self.layout.updater_exclusions(), cancel)?;
        self.log(&format!("Installed {applied} files"));
        self.milestone(milestones::APPLY, "files applied");

        ensure_active(cancel)?;
        self.enter(UpdateState::Purging);
        self.status("Removing obsolete files...");
        let policy = PurgePolicy {
            protect_nested_names: config.update.protect_nested_names,
        };
        let purged = purge_obsolete(&extract_dir, install_dir, &protected, policy, cancel)?;
        for warning in &purged.warnings {
            self.reporter.log(warning);
        }
        if purged.removed > 0 {
            self.log(&format!("Removed {} obsolete entries", purged.removed));
        }
        self.milestone(milestones::PURGE, "obsolete files removed");
        Ok(())
    }

    async fn verify_package(
        &self,
        client: &ReleaseClient,
        check: &CheckResult,
        asset_name: &str,
        package: &Path,
    ) -> Result<()> {
        let Some(checksum_url) = &check.checksum_url else {
            warn!("Release publishes no checksum for {}, skipping verification", asset_name);
            self.reporter.log("No checksum published, skipping verification");
            return Ok(());
        };

        let listing = client.fetch_text(checksum_url).await?;
        match ChecksumVerifier::find_expected_checksum(&listing, asset_name) {
            Some(expected) => {
                ChecksumVerifier::verify_checksum(package, &expected)?;
                self.log("Checksum verified");
            }
            None => warn!("Checksum file has no entry for {}", asset_name),
        }
        Ok(())
    }

    fn fail(&self, error: &UpdateError) {
        error!("Update failed: {}", error);
        let message = match error {
            UpdateError::Cancelled => "Update cancelled".to_string(),
            other => format!("Update failed: {other}"),
        };
        self.reporter.log(&message);
        self.status(&message);
    }

    /// Restores the install directory from the backup. Errors are logged only.
    ///
    /// Runs to completion even when the update itself was cancelled.
    fn roll_back(&self, workspace: &Workspace) {
        self.enter(UpdateState::RollingBack);
        self.status("Restoring previous installation...");

        let install_dir = self.layout.install_dir();
        let updater_owned = self.layout.updater_exclusions();

        let cleaned = clean_root(install_dir, &updater_owned);
        for warning in &cleaned.warnings {
            self.reporter.log(warning);
        }
        let restore = CancellationToken::new();
        match copy_tree(&workspace.backup_dir(), install_dir, &updater_owned, &restore) {
            Ok(restored) => self.log(&format!("Restored {restored} files from backup")),
            Err(e) => {
                error!("Restore failed: {}", e);
                self.reporter.log(&format!("Restore failed: {e}"));
            }
        }
    }

    /// Starts the target application. Failures are logged, never returned.
    pub fn launch_target_app(&self, config: &UpdaterConfig) -> bool {
        let launched = process::launch_target(self.layout.install_dir(), &config.target.executable);
        if launched {
            self.log(&format!("Started {}", config.target.executable));
        } else {
            self.reporter.log(&format!("Could not start {}", config.target.executable));
        }
        launched
    }
}
