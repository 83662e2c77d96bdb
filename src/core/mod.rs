//! Core types for updraft
//!
//! This module holds the error vocabulary used by every stage of the update
//! pipeline:
//! - **Strongly-typed errors** ([`UpdateError`]) for precise handling in code
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions
//!   for the CLI and bootstrap front-ends
//! - [`user_friendly_error`] to convert any [`anyhow::Error`] for display
//!
//! Library modules return [`UpdateResult`]; the binaries work in
//! [`anyhow::Result`] and convert at the top level.

pub mod error;

pub use error::{ErrorContext, UpdateError, UpdateResult, user_friendly_error};
