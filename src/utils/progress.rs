//! Progress indicators for the console front-ends.
//!
//! Thin wrapper over `indicatif` with updraft's styling. Bars are hidden
//! when `UPDRAFT_NO_PROGRESS` is set or when the caller asks for a hidden
//! bar (`--no-progress`), so scripted runs get clean output.
//!
//! ```rust,no_run
//! use updraft::utils::progress::ProgressBar;
//!
//! let bar = ProgressBar::new(100);
//! bar.set_message("Extracting update");
//! bar.set_position(40);
//! bar.finish_with_message("Update complete");
//! ```

use crate::constants::NO_PROGRESS_ENV;
use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A progress bar with consistent styling.
///
/// Cloning shares the underlying bar.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Percentage-style bar of `len` units.
    pub fn new(len: u64) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new(len);
            bar.set_style(percent_style());
            bar
        };
        Self {
            inner: bar,
        }
    }

    /// Byte-count bar for downloads. A spinner when the size is unknown.
    pub fn for_download(total: Option<u64>) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }
        let bar = match total {
            Some(total) => {
                let bar = IndicatifBar::new(total);
                bar.set_style(download_style());
                bar
            }
            None => {
                let bar = IndicatifBar::new_spinner();
                bar.set_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        };
        Self {
            inner: bar,
        }
    }

    /// A bar that draws nothing.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    pub fn set_length(&self, len: u64) {
        self.inner.set_length(len);
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Stops the bar, leaving it at its current position.
    pub fn abandon_with_message(&self, msg: impl Into<String>) {
        self.inner.abandon_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Hides the bar while `f` writes to the terminal.
    pub fn suspend<F: FnOnce() -> R, R>(&self, f: F) -> R {
        self.inner.suspend(f)
    }
}

fn percent_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .map_or_else(|_| IndicatifStyle::default_bar(), |style| style.progress_chars("━╸━"))
}

fn download_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {bytes_per_sec} ({eta}) {msg}")
        .map_or_else(|_| IndicatifStyle::default_bar(), |style| style.progress_chars("━╸━"))
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {bytes} {msg}")
        .map_or_else(|_| IndicatifStyle::default_spinner(), |style| {
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
        })
}
