//! Integration test suite for updraft
//!
//! End-to-end runs of the update engine against mock release servers, and
//! smoke tests of the `updraft` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **update_flow**: full update runs, rollback after failures, progress reporting
//! - **cli**: the `updraft` binary's commands and exit codes

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli;
mod update_flow;
