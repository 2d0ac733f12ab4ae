//! Core types shared by every part of the updater.
//!
//! At the moment this is the error taxonomy: [`UpdateError`] for the pipeline
//! components and [`ErrorContext`] for what the CLI finally prints.

pub mod error;

pub use error::{ErrorContext, ErrorKind, Result, UpdateError, user_friendly_error};
