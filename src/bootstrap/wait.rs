//! Waiting for the target application to exit.

use crate::core::{UpdateError, UpdateResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Answers whether any running process was started from a given executable.
pub trait ProcessProbe: Send + Sync {
    fn is_running(&self, executable: &Path) -> bool;
}

/// Process-table probe backed by `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl ProcessProbe for SysinfoProbe {
    fn is_running(&self, executable: &Path) -> bool {
        let target = canonical(executable);
        let own_pid = sysinfo::get_current_pid().ok();

        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        system.processes().iter().any(|(pid, process)| {
            Some(*pid) != own_pid && process.exe().is_some_and(|exe| canonical(exe) == target)
        })
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Polls `probe` until no process runs `executable`.
///
/// Without a `timeout` this waits indefinitely; the token is the only way
/// out in that case.
///
/// # Errors
///
/// [`UpdateError::WaitTimeout`] once `timeout` elapses,
/// [`UpdateError::Cancelled`] when `cancel` fires.
pub async fn wait_for_exit(
    probe: &dyn ProcessProbe,
    executable: &Path,
    poll_interval: Duration,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> UpdateResult<()> {
    let deadline = timeout.map(|t| Instant::now() + t);
    let mut logged = false;

    loop {
        if !probe.is_running(executable) {
            debug!("{} is not running", executable.display());
            return Ok(());
        }
        if !logged {
            info!("Waiting for {} to exit", executable.display());
            logged = true;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(UpdateError::WaitTimeout {
                path: executable.display().to_string(),
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(UpdateError::Cancelled),
            () = tokio::time::sleep(poll_interval) => {}
        }
    }
}
