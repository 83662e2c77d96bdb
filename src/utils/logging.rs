//! Tracing subscriber setup for both binaries.
//!
//! Console output goes to stderr at the level chosen on the command line.
//! The bootstrapper additionally appends to a fixed log file that is never
//! truncated or rotated, so each run leaves its block behind:
//!
//! ```text
//! 2026-01-05T10:31:02Z  INFO updraft::run: ===== updraft-bootstrap run 2026-01-05 10:31:02 =====
//! 2026-01-05T10:31:02Z  INFO updraft::run: arguments: ["/tmp/1.pwr", "/opt/app", "/opt/app/app", "-p"]
//! 2026-01-05T10:31:04Z  INFO patch_tool: {"type":"progress","time":1,"progress":0.5}
//! ```
//!
//! `RUST_LOG` overrides the level for both outputs.

use anyhow::{Context, Result};
use std::any::Any;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{Layer, fmt};

/// Installs the global subscriber.
///
/// `console` is the stderr level (`None` silences stderr). `log_file`, when
/// given, is opened in append mode; its parent directory is created. Keep
/// the returned guard alive until exit or buffered lines are lost.
///
/// # Errors
///
/// Fails when the log directory cannot be created or a global subscriber
/// is already installed.
pub fn init_logging(console: Option<Level>, log_file: Option<&Path>, verbose: bool) -> Result<Option<WorkerGuard>> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let console_filter = console.map_or(LevelFilter::OFF, LevelFilter::from_level);
    let console_layer =
        fmt::layer().with_writer(std::io::stderr).with_target(false).compact().with_filter(console_filter);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path.file_name().context("Log file path has no file name")?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Logs the header block that opens every bootstrap run.
pub fn write_run_header(program: &str, args: &[String]) {
    let started = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    tracing::info!(target: "updraft::run", "===== {} run {} =====", program, started);
    tracing::info!(target: "updraft::run", "arguments: {:?}", args);
}

/// Logs panics through `tracing` before the default hook runs.
///
/// Unhandled failures in the bootstrapper thus always reach the log file.
pub fn install_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info.location().map_or_else(|| "unknown location".to_string(), |l| {
            format!("{}:{}:{}", l.file(), l.line(), l.column())
        });
        tracing::error!(target: "updraft::run", "Unhandled failure at {}: {}", location, panic_message(info.payload()));
        previous(info);
    }));
}

/// Text of a panic payload.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn Any + Send> = Box::new(String::from("formatted boom"));
        assert_eq!(panic_message(payload.as_ref()), "formatted boom");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
