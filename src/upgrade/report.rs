//! Progress sinks the orchestrator reports through.
//!
//! A presentation layer implements [`UpdateReporter`] to receive log lines,
//! status messages, progress and state transitions. Reports can arrive from
//! whatever task performs the I/O, so implementations must be `Send + Sync`.

use std::fmt;

/// The stages of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateState {
    Idle,
    Checking,
    Failed,
    UpToDate,
    UpdateAvailable,
    Preparing,
    BackingUp,
    Cleaning,
    Downloading,
    Extracting,
    Applying,
    Purging,
    Succeeded,
    RollingBack,
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Failed => "failed",
            Self::UpToDate => "up to date",
            Self::UpdateAvailable => "update available",
            Self::Preparing => "preparing",
            Self::BackingUp => "backing up",
            Self::Cleaning => "cleaning",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Applying => "applying",
            Self::Purging => "purging",
            Self::Succeeded => "succeeded",
            Self::RollingBack => "rolling back",
        };
        f.write_str(label)
    }
}

/// A progress report. `percent` below zero means the total is unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub percent: f64,
    pub detail: Option<String>,
}

impl Progress {
    #[must_use]
    pub fn new(percent: f64, detail: Option<String>) -> Self {
        Self { percent, detail }
    }

    #[must_use]
    pub fn indeterminate(detail: impl Into<String>) -> Self {
        Self {
            percent: -1.0,
            detail: Some(detail.into()),
        }
    }

    #[must_use]
    pub fn is_indeterminate(&self) -> bool {
        self.percent < 0.0
    }
}

/// Receives everything an update run has to say.
pub trait UpdateReporter: Send + Sync {
    /// A line for the operator's log.
    fn log(&self, message: &str);

    /// The current one-line status.
    fn status(&self, message: &str);

    /// Overall progress of the run.
    fn progress(&self, progress: Progress);

    /// The orchestrator moved to `state`.
    fn state(&self, _state: UpdateState) {}
}

/// A reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl UpdateReporter for NullReporter {
    fn log(&self, _message: &str) {}
    fn status(&self, _message: &str) {}
    fn progress(&self, _progress: Progress) {}
}

/// Formats a byte count with binary units, e.g. `1.5 MB`.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let rounded = format!("{value:.2}");
    let trimmed = rounded.trim_end_matches('0').trim_end_matches('.');
    format!("{trimmed} {}", UNITS[unit])
}
