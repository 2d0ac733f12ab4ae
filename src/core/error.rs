//! Error types for the update pipeline.
//!
//! Every component of the updater reports failures through [`UpdateError`], a
//! closed taxonomy that the orchestrator can reason about:
//!
//! - [`UpdateError::Network`] - unreachable host, non-2xx response, timeout, malformed body
//! - [`UpdateError::NotFound`] - no release or no asset matching the configured filter
//! - [`UpdateError::VersionParse`] - a remote tag that cannot be read as a version
//! - [`UpdateError::CorruptArchive`] - empty, unreadable or tampered package
//! - [`UpdateError::FileSystem`] - permission or lock failures while copying/deleting
//! - [`UpdateError::Cancelled`] - the caller aborted the run
//!
//! The CLI layer works with `anyhow` and converts whatever reaches `main` into an
//! [`ErrorContext`] through [`user_friendly_error`], which attaches a suggestion
//! where one is known.

use colored::Colorize;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result alias used by the update components.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;

/// The error type for every stage of an update run.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport failure, non-success status, or a body that could not be decoded.
    #[error("Network error for {url}: {message}")]
    Network {
        /// The URL that was being requested
        url: String,
        /// What went wrong
        message: String,
        /// Underlying HTTP client error, when there is one
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The release or asset being looked for does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// Description of the missing item
        what: String,
    },

    /// A remote tag that is not a version.
    #[error("Invalid version tag: '{tag}'")]
    VersionParse {
        /// The tag as published
        tag: String,
    },

    /// The downloaded package cannot be used.
    #[error("Corrupt archive {}: {reason}", path.display())]
    CorruptArchive {
        /// Location of the package on disk
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// A file operation failed.
    #[error("Failed to {operation} {}", path.display())]
    FileSystem {
        /// The operation, phrased as a verb ("copy", "remove", ...)
        operation: String,
        /// The path that was being operated on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The run was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Fieldless discriminant of [`UpdateError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    NotFound,
    VersionParse,
    CorruptArchive,
    FileSystem,
    Cancelled,
}

impl UpdateError {
    /// Returns the category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::VersionParse { .. } => ErrorKind::VersionParse,
            Self::CorruptArchive { .. } => ErrorKind::CorruptArchive,
            Self::FileSystem { .. } => ErrorKind::FileSystem,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
            source: None,
        }
    }

    pub(crate) fn http(url: impl Into<String>, source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            "request timed out".to_string()
        } else if source.is_connect() {
            "could not connect".to_string()
        } else {
            source.to_string()
        };
        Self::Network {
            url: url.into(),
            message,
            source: Some(source),
        }
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub(crate) fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub(crate) fn fs(operation: &str, path: &Path, source: std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.to_string(),
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Extension trait attaching a path and an operation to `io::Result`.
pub(crate) trait IoResultExt<T> {
    fn fs_context(self, operation: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn fs_context(self, operation: &str, path: &Path) -> Result<T> {
        self.map_err(|e| UpdateError::fs(operation, path, e))
    }
}

/// A user-facing error with optional details and a suggested fix.
#[derive(Debug)]
pub struct ErrorContext {
    /// The error message
    pub message: String,
    /// Optional suggestion for how to resolve the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Converts any error reaching the CLI boundary into a displayable context.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        let ctx = ErrorContext::new(update_error.to_string());
        return match update_error.kind() {
            ErrorKind::Network => ctx
                .with_suggestion("Check your internet connection and the configured api_url"),
            ErrorKind::NotFound => ctx.with_suggestion(
                "Verify repository.owner, repository.name and repository.asset_filter in updraft.toml",
            ),
            ErrorKind::VersionParse => ctx
                .with_details("Release tags must look like v1.2.3 or 1.2.3.4"),
            ErrorKind::FileSystem => ctx.with_suggestion(
                "Close the target application and check permissions on the install directory",
            ),
            ErrorKind::CorruptArchive | ErrorKind::Cancelled => ctx,
        };
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(error.to_string()).with_suggestion(
            "Try running with elevated permissions (sudo/Administrator) or check file ownership",
        );
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(error.to_string())
            .with_details(toml_error.to_string())
            .with_suggestion("Check updraft.toml for syntax errors");
    }

    let mut ctx = ErrorContext::new(error.to_string());
    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if !chain.is_empty() {
        ctx = ctx.with_details(chain.join(": "));
    }
    ctx
}
