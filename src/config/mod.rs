//! Configuration for the updater.
//!
//! The updater reads a single optional TOML file. It holds per-installation
//! preferences that do not travel with an update descriptor: where downloads
//! land, where the application is installed, how the bootstrapper should
//! treat locked files, and which external patch tool to run.
//!
//! # Location
//!
//! - `UPDRAFT_CONFIG_PATH` if set
//! - otherwise `<config_dir>/updraft/config.toml` (for example
//!   `~/.config/updraft/config.toml` on Linux, `%APPDATA%\updraft\config.toml`
//!   on Windows)
//!
//! A missing file means defaults for every setting.
//!
//! # Example
//!
//! ```toml
//! download_dir = "/var/tmp/myapp-updates"
//! clear_app_directory = true
//! patch_tool = "/opt/butler/butler"
//! wait_timeout_secs = 120
//!
//! [lock_retry]
//! max_retries = 3
//! delay_secs = 2
//! ```

mod updater;

pub use updater::{LockRetryConfig, UpdaterConfig};
