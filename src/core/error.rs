//! Error handling for updraft
//!
//! This module provides the error type shared by every stage of the update
//! pipeline and the user-facing reporting built on top of it. The design
//! follows two principles:
//! 1. **Strongly-typed errors** so callers can branch on precise failure kinds
//! 2. **User-friendly messages** with actionable suggestions for front-ends
//!
//! # Architecture
//!
//! - [`UpdateError`] - Enumerated failure cases of the pipeline
//! - [`ErrorContext`] - Wrapper that adds details and a suggestion for display
//!
//! # Error Categories
//!
//! - **Version gating**: [`UpdateError::FormatError`]
//! - **Download**: [`UpdateError::NetworkError`], [`UpdateError::IntegrityError`],
//!   [`UpdateError::UnsupportedAlgorithm`]
//! - **Installation**: [`UpdateError::LaunchError`], [`UpdateError::ElevationDeclined`]
//! - **Bootstrap**: [`UpdateError::LockContention`], [`UpdateError::UnsafeArchiveEntry`],
//!   [`UpdateError::ArchiveError`], [`UpdateError::PatchToolError`],
//!   [`UpdateError::InvalidArguments`], [`UpdateError::WaitTimeout`]
//!
//! Declined elevation is the only failure every stage absorbs silently; see
//! [`UpdateError::is_elevation_declined`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use updraft::core::{UpdateError, user_friendly_error};
//!
//! fn verify() -> Result<(), UpdateError> {
//!     Err(UpdateError::UnsupportedAlgorithm {
//!         algorithm: "CRC32".to_string(),
//!     })
//! }
//!
//! if let Err(e) = verify() {
//!     let ctx = user_friendly_error(anyhow::Error::from(e));
//!     ctx.display();
//! }
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Result alias used by the library modules.
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

/// The main error type for update operations
///
/// Each variant carries the context needed to explain the failure to a user
/// (paths, algorithms, versions) without further lookups.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// A version string could not be parsed.
    #[error("Invalid version string '{version}': {reason}")]
    FormatError {
        /// The offending version string
        version: String,
        /// What was wrong with it
        reason: String,
    },

    /// The downloaded file's digest does not match the expected value.
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    IntegrityError {
        /// File that was verified
        path: String,
        /// Digest published in the update descriptor
        expected: String,
        /// Digest computed from the file
        actual: String,
    },

    /// The checksum names a hashing algorithm that is not supported.
    #[error("Unsupported checksum algorithm: {algorithm}")]
    UnsupportedAlgorithm {
        /// Algorithm name as given by the descriptor
        algorithm: String,
    },

    /// The transport failed while fetching the update.
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// The operation that was running
        operation: String,
        /// Transport-level reason
        reason: String,
    },

    /// A file stayed locked by another process through every retry.
    #[error("File '{path}' is still locked after {attempts} attempts")]
    LockContention {
        /// The file that could not be written
        path: String,
        /// Total number of write attempts
        attempts: u32,
        /// The last sharing or lock violation
        #[source]
        source: std::io::Error,
    },

    /// A process could not be started.
    #[error("Failed to launch '{program}': {reason}")]
    LaunchError {
        /// Program or file that was launched
        program: String,
        /// Why the launch failed
        reason: String,
    },

    /// The user dismissed an elevation prompt.
    #[error("Elevation prompt was declined by the user")]
    ElevationDeclined,

    /// The external patch tool failed or reported failure.
    #[error("Patch tool failed on '{patch}': {reason}")]
    PatchToolError {
        /// Patch file being applied
        patch: String,
        /// Exit status or reported error
        reason: String,
    },

    /// An archive entry resolves outside the extraction root.
    #[error("Archive entry '{entry}' escapes the extraction root")]
    UnsafeArchiveEntry {
        /// Raw entry name from the archive
        entry: String,
    },

    /// The archive could not be read.
    #[error("Invalid archive '{path}': {reason}")]
    ArchiveError {
        /// Archive path
        path: String,
        /// Reader failure
        reason: String,
    },

    /// The bootstrapper was invoked with unusable arguments.
    #[error("Invalid bootstrap arguments: {reason}")]
    InvalidArguments {
        /// What was wrong
        reason: String,
    },

    /// The target process did not exit within the caller-supplied bound.
    #[error("Timed out waiting for '{path}' to exit")]
    WaitTimeout {
        /// Executable path being waited on
        path: String,
    },

    /// The operation was cancelled through its cancellation token.
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration could not be loaded or saved.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the problem
        message: String,
    },

    /// IO error from [`std::io::Error`]
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Archive reader error from [`zip::result::ZipError`]
    #[error("Archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// JSON error from [`serde_json::Error`]
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Any other failure, carried by its message
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl UpdateError {
    /// Whether this is the benign "user declined elevation" outcome.
    #[must_use]
    pub const fn is_elevation_declined(&self) -> bool {
        matches!(self, Self::ElevationDeclined)
    }

    /// Whether the operation stopped because it was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Shorthand for a [`UpdateError::FormatError`].
    pub fn format(version: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FormatError {
            version: version.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`UpdateError::LaunchError`].
    pub fn launch(program: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::LaunchError {
            program: program.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(error: reqwest::Error) -> Self {
        let operation = match error.url() {
            Some(url) => format!("download of {url}"),
            None => "download".to_string(),
        };
        Self::NetworkError {
            operation,
            reason: error.to_string(),
        }
    }
}

/// Error wrapper carrying user-facing details and a suggestion
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no details or suggestion.
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// [`UpdateError`] values anywhere in the chain get tailored suggestions;
/// bare IO errors are classified by kind; anything else is wrapped with
/// its full cause chain as details.
///
/// # Examples
///
/// ```rust,no_run
/// use updraft::core::{UpdateError, user_friendly_error};
///
/// let error = anyhow::Error::from(UpdateError::ElevationDeclined);
/// let context = user_friendly_error(error);
/// context.display();
/// ```
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let chain = describe_chain(&error);

    let error = match error.downcast::<UpdateError>() {
        Ok(update_error) => {
            let context = create_error_context(update_error);
            return match (context.details.is_none(), chain) {
                (true, Some(chain)) => context.with_details(chain),
                (_, _) => context,
            };
        }
        Err(error) => error,
    };

    let error = match error.downcast::<std::io::Error>() {
        Ok(io_error) => {
            let suggestion = match io_error.kind() {
                std::io::ErrorKind::PermissionDenied => {
                    "Run the updater with sufficient permissions or check file ownership"
                }
                std::io::ErrorKind::NotFound => {
                    "Check that the file or directory exists and the path is correct"
                }
                _ => "Re-run with --verbose to see which file operation failed",
            };
            let context = ErrorContext::new(UpdateError::IoError(io_error))
                .with_suggestion(suggestion);
            return match chain {
                Some(chain) => context.with_details(chain),
                None => context,
            };
        }
        Err(error) => error,
    };

    let mut context = ErrorContext::new(UpdateError::Other {
        message: error.to_string(),
    });
    if let Some(chain) = chain {
        context = context.with_details(chain);
    }
    context
}

fn describe_chain(error: &anyhow::Error) -> Option<String> {
    let causes: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    if causes.is_empty() {
        None
    } else {
        Some(format!("{error} (caused by: {})", causes.join(": ")))
    }
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    match &error {
        UpdateError::FormatError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Use versions of the form X.Y.Z.W with an optional -alpha.N or -beta.N suffix")
            .with_details("Each numeric segment must be a non-negative integer; at most four segments are allowed"),
        UpdateError::IntegrityError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Retry the update; if the mismatch persists, the published checksum or file is wrong")
            .with_details("The download was kept out of the installation because it failed verification"),
        UpdateError::UnsupportedAlgorithm {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Publish the checksum with MD5, SHA1, SHA256, SHA384 or SHA512"),
        UpdateError::NetworkError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check your network connection and try again"),
        UpdateError::LockContention {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Close any program using files in the installation directory and run the update again")
            .with_details("The installation may be partially updated; re-running the update completes it"),
        UpdateError::LaunchError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check that the file exists and is executable"),
        UpdateError::PatchToolError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the bootstrap log for the patch tool output, or install the full update instead"),
        UpdateError::UnsafeArchiveEntry {
            ..
        } => ErrorContext::new(error)
            .with_details("Nothing was written: the archive was rejected before extraction started"),
        UpdateError::InvalidArguments {
            ..
        } => ErrorContext::new(error).with_suggestion(
            "Usage: updraft-bootstrap <archiveOrPatchList> <extractionPath> <targetExecutablePath> [-c] [-p] [-- args...]",
        ),
        UpdateError::WaitTimeout {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Close the application manually and start the update again"),
        UpdateError::ConfigError {
            ..
        } => ErrorContext::new(error)
            .with_suggestion("Check the updraft configuration file for syntax errors"),
        _ => ErrorContext::new(error),
    }
}
