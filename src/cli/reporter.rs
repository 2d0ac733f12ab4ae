use super::CliConfig;
use crate::upgrade::{Progress, UpdateReporter, UpdateState};
use crate::utils::progress::ProgressBar;
use colored::Colorize;
use tracing::debug;

/// Renders engine reports on the terminal.
///
/// Status lines become the bar message (or plain lines with `--no-progress`),
/// log lines are echoed with a timestamp under `--verbose`, and `--quiet`
/// suppresses everything but the final error.
pub struct CliReporter {
    bar: ProgressBar,
    quiet: bool,
    verbose: bool,
}

impl CliReporter {
    pub fn new(config: &CliConfig) -> Self {
        Self {
            bar: ProgressBar::new(!config.no_progress && !config.quiet),
            quiet: config.quiet,
            verbose: config.verbose,
        }
    }

    /// Prints a line of command output above the bar.
    pub fn say(&self, line: impl AsRef<str>) {
        if !self.quiet {
            self.bar.println(line);
        }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl UpdateReporter for CliReporter {
    fn log(&self, message: &str) {
        if self.verbose {
            let stamp = chrono::Local::now().format("%H:%M:%S");
            self.bar.println(format!("{} {}", format!("[{stamp}]").dimmed(), message));
        }
    }

    fn status(&self, message: &str) {
        if self.quiet {
            return;
        }
        if self.bar.is_hidden() {
            eprintln!("{}", message.cyan());
        } else {
            self.bar.set_message(message.to_string());
        }
    }

    fn progress(&self, progress: Progress) {
        match (progress.is_indeterminate(), progress.detail.as_deref()) {
            (true, detail) => self.bar.set_indeterminate(detail.unwrap_or_default()),
            (false, detail) => self.bar.set_percent(progress.percent, detail),
        }
    }

    fn state(&self, state: UpdateState) {
        debug!("-> {}", state);
        if state == UpdateState::RollingBack {
            self.say(format!("{}", "Rolling back to the previous installation".yellow()));
        }
    }
}
