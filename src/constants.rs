//! Global constants used throughout the updraft codebase.
//!
//! This module contains retry parameters, poll intervals, file names and
//! other values shared by the downloader and the bootstrapper. Keeping them
//! here makes the magic numbers of the update pipeline discoverable in one
//! place.

use std::time::Duration;

/// Number of retries after the first failed write of a locked file.
///
/// A write is attempted at most `MAX_LOCK_RETRIES + 1` times before the
/// extraction fails with a lock-contention error.
pub const MAX_LOCK_RETRIES: u32 = 2;

/// Fixed delay between attempts to write a locked file (5 seconds).
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Retry index from which lock holders are looked up and reported.
pub const LOCK_INSPECTION_THRESHOLD: u32 = 2;

/// Interval between process-table scans while waiting for the target to exit.
pub const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum elapsed time before a download speed is reported.
pub const SPEED_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Name of the external binary-diff tool looked up on `PATH`.
pub const DEFAULT_PATCH_TOOL: &str = "butler";

/// File name of the append-only bootstrap log.
pub const BOOTSTRAP_LOG_FILE: &str = "updraft-bootstrap.log";

/// Stem of the bootstrapper executable shipped next to the host binary.
pub const BOOTSTRAP_BINARY_NAME: &str = "updraft-bootstrap";

/// Directory created next to the first patch file for patch-tool staging.
pub const STAGING_DIR_NAME: &str = "staging";

/// Extension of archives handed to the bootstrapper.
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Extension of platform installer packages.
pub const INSTALLER_EXTENSION: &str = "msi";

/// Extension of incremental patch bundles.
pub const PATCH_EXTENSION: &str = "pwr";

/// Placeholder replaced by the current executable's directory in installer arguments.
pub const PATH_PLACEHOLDER: &str = "%path%";

/// Checksum algorithm used when a descriptor does not name one.
pub const DEFAULT_CHECKSUM_ALGORITHM: &str = "MD5";

/// Environment variable overriding the configuration file location.
pub const CONFIG_PATH_ENV: &str = "UPDRAFT_CONFIG_PATH";

/// Environment variable disabling progress bars.
pub const NO_PROGRESS_ENV: &str = "UPDRAFT_NO_PROGRESS";

/// Buffer size used when hashing files.
pub const HASH_BUFFER_SIZE: usize = 64 * 1024;
