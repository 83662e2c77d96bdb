//! updraft-bootstrap: applies a staged update once the target has exited.
//!
//! ```text
//! updraft-bootstrap <archiveOrPatchList> <extractionPath> <targetExecutablePath> [-c] [-p] [-- args...]
//! ```
//!
//! Exit codes: `0` on success or cancellation, `1` when the update failed,
//! `2` when the arguments are invalid. Every run is appended to
//! `updraft-bootstrap.log` in the configured log directory.

use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use updraft::bootstrap::{BootstrapArgs, Bootstrapper, ConsoleSink, ProgressSink};
use updraft::config::UpdaterConfig;
use updraft::constants::BOOTSTRAP_LOG_FILE;
use updraft::core::{UpdateError, user_friendly_error};
use updraft::utils::{init_logging, install_panic_hook, write_run_header};

#[derive(Parser, Debug)]
#[command(
    name = "updraft-bootstrap",
    about = "Replace an application's files with a staged update and relaunch it",
    version
)]
struct Cli {
    #[command(flatten)]
    args: BootstrapArgs,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Path to a custom config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let code = run().await;
    std::process::exit(code);
}

async fn run() -> i32 {
    let parsed = Cli::try_parse();
    if let Err(e) = &parsed {
        if !e.use_stderr() {
            // --help and --version
            let _ = e.print();
            return 0;
        }
    }

    let config_path = parsed.as_ref().ok().and_then(|cli| cli.config.clone());
    let verbose = parsed.as_ref().is_ok_and(|cli| cli.verbose);
    let config = match UpdaterConfig::load_with_optional(config_path).await {
        Ok(config) => config,
        Err(e) => {
            user_friendly_error(e).display();
            return 1;
        }
    };

    let console = if verbose {
        Level::DEBUG
    } else if std::io::stderr().is_terminal() {
        Level::WARN
    } else {
        Level::INFO
    };
    let log_file = config.log_dir().join(BOOTSTRAP_LOG_FILE);
    let _guard = match init_logging(Some(console), Some(log_file.as_path()), verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("warning: file logging disabled: {e:#}");
            None
        }
    };
    install_panic_hook();
    write_run_header("updraft-bootstrap", &std::env::args().skip(1).collect::<Vec<_>>());

    match parsed {
        Ok(cli) => apply(cli, &config).await,
        Err(e) => {
            error!("Invalid bootstrap arguments: {}", e.to_string().trim_end());
            let _ = e.print();
            2
        }
    }
}

async fn apply(cli: Cli, config: &UpdaterConfig) -> i32 {
    let sink: Arc<dyn ProgressSink> = Arc::from(ConsoleSink::for_environment());
    let mut bootstrapper = Bootstrapper::from_config(config, sink);

    let cancel = bootstrapper.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling update");
            cancel.cancel();
        }
    });

    match bootstrapper.run(&cli.args).await {
        Ok(report) => {
            info!("Update applied: {:?} (relaunched: {})", report.applied, report.relaunched);
            0
        }
        Err(UpdateError::Cancelled) => {
            info!("Update cancelled");
            0
        }
        Err(e @ UpdateError::InvalidArguments { .. }) => {
            user_friendly_error(e.into()).display();
            2
        }
        Err(e) => {
            user_friendly_error(e.into()).display();
            1
        }
    }
}
