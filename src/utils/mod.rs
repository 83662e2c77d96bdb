//! Cross-cutting helpers
//!
//! - [`logging`] - tracing subscriber setup, run headers, panic hook
//! - [`path_validation`] - lexical containment of archive entry paths
//! - [`progress`] - console progress bars

pub mod logging;
pub mod path_validation;
pub mod progress;

pub use logging::{init_logging, install_panic_hook, write_run_header};
pub use progress::ProgressBar;
