//! updraft - self-update toolkit for desktop applications
//!
//! An application that wants to update itself needs three pieces: a way to
//! decide whether a published version is newer than the installed one, a
//! downloader that fetches and verifies the package, and a separate process
//! that replaces the application's files once it has exited. updraft
//! provides all three.
//!
//! # Architecture Overview
//!
//! ```text
//!  host application                      updraft-bootstrap
//!  ----------------                      -----------------
//!  UpdateDescriptor ──► VersionComparator
//!        │
//!        ▼
//!  Downloader ── .zip ──► launch ───────► wait for target exit
//!        │      .pwr ──► launch (-p) ──► extract / PatchQueue
//!        │      .msi ──► installer            │
//!        ▼                                    ▼
//!   host exits                          relaunch target
//! ```
//!
//! # Core Modules
//!
//! - [`version`] - parsing and ordering of `major.minor.build.revision[-suffix.N]`
//! - [`descriptor`] - the published update descriptor (JSON)
//! - [`download`] - streaming download, checksum verification, dispatch
//! - [`bootstrap`] - the state machine run by `updraft-bootstrap`
//! - [`launch`] - starting installers, the bootstrapper and the relaunched target
//!
//! ## Supporting Modules
//! - [`cli`] - the `updraft` command-line interface
//! - [`config`] - optional `config.toml` with per-installation settings
//! - [`core`] - the error type and user-facing error rendering
//! - [`constants`] - retry counts, intervals and file names
//! - [`utils`] - logging setup, path containment, progress bars
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft::descriptor::UpdateDescriptor;
//! use updraft::version::VersionSpec;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let descriptor = UpdateDescriptor::load_from(std::path::Path::new("feed.json")).await?;
//! let installed = VersionSpec::parse("1.1.0.0")?;
//! if descriptor.is_update_available(&installed) {
//!     println!("{} is available", descriptor.version);
//! }
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod descriptor;
pub mod download;
pub mod launch;
pub mod utils;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
