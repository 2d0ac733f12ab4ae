//! Update engine for applications installed next to updraft.
//!
//! This module detects whether a newer release of the target application is
//! published on GitHub and, if so, replaces the local installation while
//! preserving operator-designated files, rolling back on failure.
//!
//! # Architecture Overview
//!
//! Leaves first:
//!
//! - **[`version`]**: installed version resolution and release tag parsing
//! - **[`release`]**: latest-release lookup and streamed asset downloads
//! - **[`archive`]**: package validation and chunked extraction
//! - **[`sync`]**: exclusion-aware copy, clean, apply and purge of directory trees
//! - **[`process`]**: stopping the target before replacement, launching it afterwards
//! - **[`orchestrator`]**: the state machine sequencing all of the above
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Check
//!    ├── Resolve installed version (version.txt, then embedded file versions)
//!    └── Fetch latest release, parse its tag, match the package asset
//!
//! 2. Prepare
//!    ├── Create a private workspace under the temp directory
//!    ├── Stop the target process
//!    └── Back up the install directory (updater files excluded)
//!
//! 3. Replace                       (any failure -> restore from backup)
//!    ├── Clean the install root, keeping the protected set
//!    ├── Download, verify size and checksum, validate the archive
//!    ├── Extract into the workspace
//!    ├── Apply the new tree
//!    └── Purge files the new tree no longer contains
//!
//! 4. Cleanup
//!    └── Remove the workspace, success or not
//! ```
//!
//! # Protection Tiers
//!
//! Two exclusion sets come from [`InstallLayout`]:
//!
//! - **updater-owned** names (updraft's binaries, config and directory) are
//!   skipped by backup, apply and restore
//! - the **protected** set adds preserved application files, data directories
//!   and `[protect]` entries from the config, and is honored by clean and purge
//!
//! Backup therefore captures everything restore might need to put back, while
//! clean and purge leave operator data alone.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use updraft::config::UpdaterConfig;
//! use updraft::upgrade::{InstallLayout, NullReporter, UpdateOrchestrator};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = UpdaterConfig::load_from("updraft.toml".as_ref()).await?;
//! let layout = InstallLayout::detect(None)?;
//! let orchestrator = UpdateOrchestrator::new(layout, Arc::new(NullReporter));
//!
//! let outcome = orchestrator.perform_update(&config, &CancellationToken::new()).await;
//! println!("{} -> {}: {}", outcome.old_version, outcome.new_version, outcome.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod archive;
/// The `[update]` table of the configuration file.
pub mod config;
pub mod layout;
pub mod orchestrator;
pub mod process;
pub mod release;
pub mod report;
pub mod sync;
/// Package size and checksum verification.
pub mod verification;
pub mod version;
pub mod workspace;


pub use layout::InstallLayout;
pub use orchestrator::{CheckResult, UpdateOrchestrator, UpdateOutcome};
pub use release::{AssetMetadata, ReleaseClient, ReleaseMetadata};
pub use report::{NullReporter, Progress, UpdateReporter, UpdateState, format_bytes};
pub use sync::{Exclusions, PurgePolicy, SyncReport};
pub use verification::ChecksumVerifier;
pub use version::Version;
