//! updraft - a self-updating installer for applications published as GitHub releases.
//!
//! updraft lives in a subdirectory of the application it maintains. It compares
//! the installed version with the latest release and, when a newer one exists,
//! replaces the installation: the target process is stopped, the install
//! directory is backed up, cleaned and refilled from the release package, and
//! files the new release no longer ships are purged. Operator data survives
//! every step, and any failure restores the backup.
//!
//! # Modules
//!
//! - [`upgrade`] - the update engine: versions, releases, archives, tree sync,
//!   process control and the orchestrating state machine
//! - [`config`] - `updraft.toml` loading
//! - [`core`] - error taxonomy and user-facing error formatting
//! - [`cli`] - the `updraft` command line
//! - [`utils`] - terminal progress display
//!
//! # Library Use
//!
//! The engine does not depend on the CLI. A different front end implements
//! [`upgrade::UpdateReporter`] and drives [`upgrade::UpdateOrchestrator`]
//! directly; see the [`upgrade`] module for an example.

pub mod cli;
pub mod config;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
