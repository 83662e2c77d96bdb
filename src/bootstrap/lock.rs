//! Bounded retry of file writes blocked by another process.
//!
//! Windows refuses to overwrite a file another process has open
//! (`ERROR_SHARING_VIOLATION`, `ERROR_LOCK_VIOLATION`); Unix refuses to
//! overwrite a running executable (`ETXTBSY`). Extraction wraps each write in
//! [`retry_on_lock`], which sleeps a fixed delay between attempts and, from
//! the second retry on, asks a [`LockInspector`] who holds the file so the
//! user can close it.

use super::sink::ProgressSink;
use crate::constants::{LOCK_INSPECTION_THRESHOLD, LOCK_RETRY_DELAY, MAX_LOCK_RETRIES};
use crate::core::{UpdateError, UpdateResult};
use std::fmt;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;
#[cfg(unix)]
const ETXTBSY: i32 = 26;

/// Whether `error` means another process holds the file.
#[must_use]
pub fn is_lock_violation(error: &io::Error) -> bool {
    let Some(code) = error.raw_os_error() else {
        return false;
    };
    #[cfg(windows)]
    {
        code == ERROR_SHARING_VIOLATION || code == ERROR_LOCK_VIOLATION
    }
    #[cfg(unix)]
    {
        code == ETXTBSY
    }
    #[cfg(not(any(windows, unix)))]
    {
        let _ = code;
        false
    }
}

/// A process found holding a file open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub pid: u32,
    pub name: String,
}

impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (pid {})", self.name, self.pid)
    }
}

/// Looks up the processes holding a file.
pub trait LockInspector: Send + Sync {
    /// `None` when the platform cannot answer; `Some(vec![])` when nobody
    /// holds the file.
    fn holders(&self, path: &Path) -> Option<Vec<LockHolder>>;
}

/// Lock inspection backed by the OS process table.
///
/// Linux scans `/proc/<pid>/fd`; other platforms report "unsupported".
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLockInspector;

impl LockInspector for SystemLockInspector {
    #[cfg(target_os = "linux")]
    fn holders(&self, path: &Path) -> Option<Vec<LockHolder>> {
        let target = std::fs::canonicalize(path).ok()?;
        let own_pid = std::process::id();
        let mut holders = Vec::new();

        for entry in std::fs::read_dir("/proc").ok()?.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if pid == own_pid {
                continue;
            }
            // Unreadable fd tables belong to other users; skip them.
            let Ok(fds) = std::fs::read_dir(entry.path().join("fd")) else {
                continue;
            };
            let holds = fds
                .flatten()
                .any(|fd| std::fs::read_link(fd.path()).is_ok_and(|link| link == target));
            if holds {
                let name = std::fs::read_to_string(entry.path().join("comm"))
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown".to_string());
                holders.push(LockHolder {
                    pid,
                    name,
                });
            }
        }
        Some(holders)
    }

    #[cfg(not(target_os = "linux"))]
    fn holders(&self, _path: &Path) -> Option<Vec<LockHolder>> {
        None
    }
}

/// Inspector that never finds anyone, for tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLockInspector;

impl LockInspector for NoLockInspector {
    fn holders(&self, _path: &Path) -> Option<Vec<LockHolder>> {
        None
    }
}

/// How long to keep retrying a locked write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockRetryPolicy {
    /// Retries after the first failed attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub delay: Duration,
    /// Retry index from which lock holders are inspected.
    pub inspect_after: u32,
}

impl Default for LockRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_LOCK_RETRIES,
            delay: LOCK_RETRY_DELAY,
            inspect_after: LOCK_INSPECTION_THRESHOLD,
        }
    }
}

impl LockRetryPolicy {
    /// Policy without delays, for tests.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            delay: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Runs `op` until it succeeds, retrying lock violations per `policy`.
///
/// Errors other than lock violations are returned at once. When the sink
/// declines a reported lock holder, or the retries run out, the result is
/// [`UpdateError::LockContention`] carrying the last violation.
pub fn retry_on_lock<T, F>(
    path: &Path,
    policy: &LockRetryPolicy,
    inspector: &dyn LockInspector,
    sink: &dyn ProgressSink,
    mut op: F,
) -> UpdateResult<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut delays = FixedInterval::new(policy.delay).take(policy.max_retries as usize);
    let mut retries: u32 = 0;

    loop {
        let error = match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_lock_violation(&e) => e,
            Err(e) => return Err(e.into()),
        };

        retries += 1;
        let contention = |source| UpdateError::LockContention {
            path: path.display().to_string(),
            attempts: retries,
            source,
        };

        let Some(delay) = delays.next() else {
            warn!("{} still locked after {} attempts", path.display(), retries);
            return Err(contention(error));
        };
        debug!("{} is locked (retry {}/{}): {}", path.display(), retries, policy.max_retries, error);

        if retries >= policy.inspect_after {
            match inspector.holders(path) {
                Some(holders) if !holders.is_empty() => {
                    for holder in &holders {
                        if !sink.confirm_lock_release(path, holder) {
                            info!("User cancelled while {} held {}", holder, path.display());
                            return Err(contention(error));
                        }
                    }
                    // Holders were asked to close the file; try again right away.
                    continue;
                }
                Some(_) => debug!("No process found holding {}", path.display()),
                None => debug!("Lock holder lookup unsupported for {}", path.display()),
            }
        }

        std::thread::sleep(delay);
    }
}
