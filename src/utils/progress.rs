//! Terminal progress display.
//!
//! A thin wrapper over `indicatif` that switches between a percentage bar and a
//! spinner, since a download without `Content-Length` has no percentage to show.
//! A hidden bar accepts every call and draws nothing, so callers never branch
//! on whether progress output is enabled.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const SCALE: u64 = 100;

/// A progress bar over 0-100 that can fall back to a spinner.
pub struct ProgressBar {
    inner: IndicatifBar,
    spinning: AtomicBool,
}

impl ProgressBar {
    /// A visible bar drawn to stderr, or a hidden one when `enabled` is false.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        let inner = if enabled {
            let bar = IndicatifBar::new(SCALE);
            bar.set_style(default_style());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner,
            spinning: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.inner.is_hidden()
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Shows `percent` of 100, switching back from spinner mode if needed.
    pub fn set_percent(&self, percent: f64, detail: Option<&str>) {
        if self.spinning.swap(false, Ordering::Relaxed) {
            self.inner.disable_steady_tick();
            self.inner.set_style(default_style());
        }
        self.inner.set_position(percent.clamp(0.0, 100.0).round() as u64);
        if let Some(detail) = detail {
            self.inner.set_prefix(detail.to_string());
        }
    }

    /// Shows a spinner with `detail` in place of a percentage.
    pub fn set_indeterminate(&self, detail: &str) {
        if !self.spinning.swap(true, Ordering::Relaxed) {
            self.inner.set_style(spinner_style());
            self.inner.enable_steady_tick(Duration::from_millis(100));
        }
        self.inner.set_prefix(detail.to_string());
    }

    /// Prints a line above the bar without garbling it.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.inner.is_hidden() {
            eprintln!("{}", line.as_ref());
        } else {
            self.inner.println(line.as_ref());
        }
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

fn default_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{bar:40.cyan/blue} {pos:>3}% {prefix:.dim} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {prefix:.dim} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
