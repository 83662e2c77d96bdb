//! updraft CLI entry point
//!
//! Parses arguments, runs the selected command and renders failures with
//! suggestions. The companion `updraft-bootstrap` binary is built from
//! `src/bin/bootstrap.rs`.

use anyhow::Result;
use clap::Parser;
use updraft::cli;
use updraft::core::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            user_friendly_error(e).display();
            std::process::exit(1);
        }
    }
}
