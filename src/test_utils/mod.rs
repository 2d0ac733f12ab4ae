//! Test utilities for updraft.
//!
//! Shared by unit tests and the integration suite: logging setup, a reporter
//! that records everything it is told, and helpers for laying out install
//! directories.

use crate::upgrade::{Progress, UpdateReporter, UpdateState};
use std::path::Path;
use std::sync::{Mutex, Once};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, tests run silent.
///
/// ```bash
/// RUST_LOG=updraft=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// An [`UpdateReporter`] that keeps every report for later assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    logs: Mutex<Vec<String>>,
    statuses: Mutex<Vec<String>>,
    progress: Mutex<Vec<Progress>>,
    states: Mutex<Vec<UpdateState>>,
}

impl RecordingReporter {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn progress_reports(&self) -> Vec<Progress> {
        self.progress.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<UpdateState> {
        self.states.lock().unwrap().clone()
    }
}

impl UpdateReporter for RecordingReporter {
    fn log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }

    fn status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn progress(&self, progress: Progress) {
        self.progress.lock().unwrap().push(progress);
    }

    fn state(&self, state: UpdateState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Writes `content` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: impl AsRef<[u8]>) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

/// Every file under `root` as `(relative path with '/', contents)`, sorted.
pub fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<(String, Vec<u8>)> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            let relative = e.path().strip_prefix(root).unwrap_or(e.path());
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            (key, std::fs::read(e.path()).unwrap())
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_reporter_keeps_every_report() {
        let recorder = RecordingReporter::default();
        let sink: &dyn UpdateReporter = &recorder;
        sink.log("step");
        sink.status("Downloading");
        sink.progress(Progress::indeterminate("1 KB downloaded"));
        sink.state(UpdateState::Downloading);

        // Forwarding through the concrete type reaches the same sinks.
        recorder.progress(Progress::new(50.0, None));

        assert_eq!(recorder.logs(), vec!["step"]);
        assert_eq!(recorder.statuses(), vec!["Downloading"]);
        assert_eq!(recorder.progress_reports().len(), 2);
        assert!(recorder.progress_reports()[0].is_indeterminate());
        assert_eq!(recorder.states(), vec![UpdateState::Downloading]);
    }
}
