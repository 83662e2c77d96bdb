//! Progress sinks: how the bootstrapper talks to whoever is watching.
//!
//! The state machine never formats output itself. It reports state changes,
//! percentages and failures to a [`ProgressSink`], and asks the sink whether
//! to keep retrying when another process holds a file open. Front-ends pick
//! a sink:
//!
//! - [`ConsoleSink`]: an `indicatif` bar plus interactive lock prompts
//! - [`LogSink`]: log lines only, never blocks on input
//! - [`ChannelSink`]: [`BootstrapEvent`] messages for a UI-owned event loop

use super::BootstrapState;
use super::lock::LockHolder;
use crate::core::UpdateError;
use crate::utils::progress::ProgressBar;
use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

/// Receiver of bootstrap progress.
pub trait ProgressSink: Send + Sync {
    fn state_changed(&self, _state: BootstrapState) {}

    /// `percent` is in `0..=100`; `detail` names the file or patch in flight.
    fn progress(&self, percent: u8, detail: &str);

    /// Asks whether to retry after `holder` was found holding `path`.
    ///
    /// Returning `false` aborts the extraction with the lock error.
    fn confirm_lock_release(&self, _path: &Path, _holder: &LockHolder) -> bool {
        true
    }

    /// Reports a fatal error before the process terminates.
    fn report_error(&self, _error: &UpdateError) {}
}

/// Messages emitted by [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapEvent {
    State(BootstrapState),
    Progress { percent: u8, detail: String },
    LockHeld { path: String, holder: LockHolder },
    Error(String),
}

/// Forwards everything as [`BootstrapEvent`]s.
///
/// Lock prompts are answered with "retry"; the receiver learns about the
/// holder from [`BootstrapEvent::LockHeld`].
pub struct ChannelSink {
    events: UnboundedSender<BootstrapEvent>,
}

impl ChannelSink {
    pub fn new(events: UnboundedSender<BootstrapEvent>) -> Self {
        Self {
            events,
        }
    }
}

impl ProgressSink for ChannelSink {
    fn state_changed(&self, state: BootstrapState) {
        let _ = self.events.send(BootstrapEvent::State(state));
    }

    fn progress(&self, percent: u8, detail: &str) {
        let _ = self.events.send(BootstrapEvent::Progress {
            percent,
            detail: detail.to_string(),
        });
    }

    fn confirm_lock_release(&self, path: &Path, holder: &LockHolder) -> bool {
        let _ = self.events.send(BootstrapEvent::LockHeld {
            path: path.display().to_string(),
            holder: holder.clone(),
        });
        true
    }

    fn report_error(&self, error: &UpdateError) {
        let _ = self.events.send(BootstrapEvent::Error(error.to_string()));
    }
}

/// Log-only sink for unattended runs.
#[derive(Debug, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn state_changed(&self, state: BootstrapState) {
        info!("Bootstrap state: {:?}", state);
    }

    fn progress(&self, percent: u8, detail: &str) {
        info!("{:>3}% {}", percent, detail);
    }

    fn confirm_lock_release(&self, path: &Path, holder: &LockHolder) -> bool {
        warn!("{} is held by {}; retrying", path.display(), holder);
        true
    }

    fn report_error(&self, error: &UpdateError) {
        error!("Bootstrap failed: {}", error);
    }
}

/// Terminal sink with a progress bar and interactive lock prompts.
pub struct ConsoleSink {
    bar: ProgressBar,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self {
            bar: ProgressBar::new(100),
        }
    }

    /// Console sink when stderr is a terminal, log sink otherwise.
    pub fn for_environment() -> Box<dyn ProgressSink> {
        if std::io::stderr().is_terminal() {
            Box::new(Self::new())
        } else {
            Box::new(LogSink)
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleSink {
    fn state_changed(&self, state: BootstrapState) {
        info!("Bootstrap state: {:?}", state);
        match state {
            BootstrapState::WaitForTargetExit => self.bar.set_message("Waiting for the application to exit"),
            BootstrapState::Extracting => self.bar.set_message("Extracting update"),
            BootstrapState::Patching => self.bar.set_message("Applying patches"),
            BootstrapState::Relaunch => self.bar.set_message("Restarting application"),
            BootstrapState::Terminated => self.bar.finish_with_message("Update complete"),
            BootstrapState::FatalError => self.bar.abandon_with_message("Update failed"),
            BootstrapState::Idle => {}
        }
    }

    fn progress(&self, percent: u8, detail: &str) {
        info!("{:>3}% {}", percent, detail);
        self.bar.set_position(u64::from(percent));
    }

    fn confirm_lock_release(&self, path: &Path, holder: &LockHolder) -> bool {
        warn!("{} is held by {}", path.display(), holder);
        self.bar.suspend(|| {
            eprint!(
                "{} is using {}. Close it and press Enter to retry, or type 'c' to cancel: ",
                holder,
                path.display()
            );
            let _ = std::io::stderr().flush();
            let mut answer = String::new();
            match std::io::stdin().lock().read_line(&mut answer) {
                Ok(0) | Err(_) => false,
                Ok(_) => !answer.trim().eq_ignore_ascii_case("c"),
            }
        })
    }

    fn report_error(&self, error: &UpdateError) {
        self.bar.abandon_with_message("Update failed");
        error!("Bootstrap failed: {}", error);
    }
}
