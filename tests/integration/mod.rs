//! Integration test suite for updraft
//!
//! End-to-end tests that drive the library through its public API and the
//! two binaries through `assert_cmd`.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **bootstrap_cli**: `updraft-bootstrap` argument handling, exit codes, full runs
//! - **cli**: `updraft compare` and `updraft check`
//! - **download**: downloads from a local HTTP server through dispatch
//! - **extraction**: archive containment and lock retry
//! - **patching**: the patch queue driving a fake patch tool
//! - **versioning**: version ordering across the public API

mod bootstrap_cli;
mod cli;
mod download;
mod extraction;
#[cfg(unix)]
mod patching;
mod versioning;
