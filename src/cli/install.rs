//! `updraft install`: download an update and hand it off.
//!
//! The command plays the host application's part: it fetches the package a
//! descriptor points at, verifies it, and dispatches it by extension.
//!
//! - `.zip`: the bootstrapper is started next to the archive and the
//!   command exits so the target's files can be replaced.
//! - `.pwr`: the bootstrapper is started in patch mode (`-p`).
//! - `.msi` / other: the installer is started.
//!
//! ```bash
//! updraft install feed.json --installed 1.1.0.0 --target /opt/app/app -- --after-update
//! ```
//!
//! Everything after `--` is passed to the target when it is relaunched.
//! Ctrl+C cancels the download and removes the partial file.

use super::common::{load_descriptor, parse_installed};
use crate::config::UpdaterConfig;
use crate::download::{DownloadEvent, DownloadOptions, DownloadOutcome, DownloadStatus, Downloader, InstallAction};
use crate::launch::{LaunchRequest, Launcher, SystemLauncher};
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

#[derive(Args, Debug, Default)]
pub struct InstallCommand {
    /// Update descriptor: a JSON file or an http(s) URL
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: String,

    /// Currently installed version
    #[arg(long, value_name = "VERSION")]
    pub installed: String,

    /// Executable to update and relaunch (defaults to this executable)
    #[arg(long, value_name = "PATH")]
    pub target: Option<PathBuf>,

    /// Directory for the downloaded package
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Extract into this directory instead of the target's directory
    #[arg(long, value_name = "DIR")]
    pub installation_path: Option<PathBuf>,

    /// Empty the installation directory before extracting
    #[arg(long)]
    pub clear: bool,

    /// Start installers and the bootstrapper with elevation
    #[arg(long)]
    pub run_as_admin: bool,

    /// Install even when the installed version is current
    #[arg(long)]
    pub force: bool,

    /// Arguments for the relaunched target
    #[arg(last = true, value_name = "ARGS")]
    pub relaunch_args: Vec<String>,

    /// Don't show progress bars (set by the global option)
    #[arg(skip)]
    pub no_progress: bool,
}

impl InstallCommand {
    /// Command-line settings layered over the loaded configuration.
    #[must_use]
    pub fn apply_overrides(&self, mut config: UpdaterConfig) -> UpdaterConfig {
        if let Some(dir) = &self.download_dir {
            config.download_dir = Some(dir.clone());
        }
        if let Some(path) = &self.installation_path {
            config.installation_path = Some(path.clone());
        }
        config.clear_app_directory |= self.clear;
        config.run_as_admin |= self.run_as_admin;
        config
    }

    /// Download options for this invocation.
    pub fn download_options(&self, config: &UpdaterConfig) -> Result<DownloadOptions> {
        let mut options = DownloadOptions::from_config(config).context("Failed to determine the current executable")?;
        if let Some(target) = &self.target {
            let target_dir = target.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
            options.extraction_dir = config.extraction_dir(&target_dir);
            options.current_exe = target.clone();
        }
        options.forwarded_args = self.relaunch_args.clone();
        Ok(options)
    }

    pub async fn execute(self, config: UpdaterConfig) -> Result<()> {
        let installed = parse_installed(&self.installed)?;
        let descriptor = load_descriptor(&self.descriptor).await?;

        if !self.force && !descriptor.is_update_available(&installed) {
            println!("{} {} is up to date", "✓".green(), installed);
            return Ok(());
        }
        if descriptor.is_mandatory_for(&installed) {
            println!("{} {} is a mandatory update", "!".yellow().bold(), descriptor.version);
        }

        let config = self.apply_overrides(config);
        let options = self.download_options(&config)?;
        let launcher: Arc<dyn Launcher> = Arc::new(SystemLauncher);
        let downloader = Downloader::new(options.clone(), Arc::clone(&launcher))?;

        let cancel = downloader.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let (tx, rx) = mpsc::unbounded_channel();
        let display = tokio::spawn(show_progress(rx, self.no_progress));

        let outcome = match local_package(&descriptor.download_url) {
            Some(source) => {
                let temp = stage_local_package(&source, &config.download_dir()).await?;
                downloader.finish_external(&descriptor, temp, tx).await
            }
            None => downloader.start(&descriptor, tx).await,
        };
        let _ = display.await;

        match outcome {
            DownloadOutcome::Completed {
                path,
                action,
            } => report_action(&path, action, &options, launcher.as_ref()),
            DownloadOutcome::Failed(e) => Err(e.into()),
            DownloadOutcome::Cancelled => {
                println!("Download cancelled");
                Ok(())
            }
        }
    }
}

/// The local path of a `file://` download URL.
fn local_package(download_url: &str) -> Option<PathBuf> {
    Url::parse(download_url).ok().filter(|url| url.scheme() == "file").and_then(|url| url.to_file_path().ok())
}

/// Copies a local package into the download directory under a temp name.
async fn stage_local_package(source: &Path, download_dir: &Path) -> Result<PathBuf> {
    tokio::fs::create_dir_all(download_dir)
        .await
        .with_context(|| format!("Failed to create download directory {}", download_dir.display()))?;
    let temp = download_dir.join(format!("{}.tmp", uuid::Uuid::new_v4()));
    tokio::fs::copy(source, &temp)
        .await
        .with_context(|| format!("Failed to copy local package {}", source.display()))?;
    debug!("Staged {} as {}", source.display(), temp.display());
    Ok(temp)
}

async fn show_progress(mut events: UnboundedReceiver<DownloadEvent>, hidden: bool) {
    let mut bar: Option<ProgressBar> = None;
    while let Some(event) = events.recv().await {
        match event {
            DownloadEvent::Progress(progress) => {
                let bar = bar.get_or_insert_with(|| {
                    if hidden { ProgressBar::hidden() } else { ProgressBar::for_download(progress.total) }
                });
                bar.set_position(progress.received);
                bar.set_message(progress.size.clone());
            }
            DownloadEvent::Finished(status) => {
                if let Some(bar) = &bar {
                    match status {
                        DownloadStatus::Completed => bar.finish_and_clear(),
                        DownloadStatus::Failed(_) => bar.abandon_with_message("failed"),
                        DownloadStatus::Cancelled => bar.abandon_with_message("cancelled"),
                    }
                }
                break;
            }
        }
    }
}

fn report_action(
    path: &Path,
    action: InstallAction,
    options: &DownloadOptions,
    launcher: &dyn Launcher,
) -> Result<()> {
    match action {
        InstallAction::Bootstrap {
            bootstrapper,
        } => {
            println!("{} Update staged; {} will finish the installation", "✓".green(), bootstrapper.display());
        }
        InstallAction::PatchBundle {
            path: patch,
        } => {
            let request = LaunchRequest::new(&options.bootstrapper)
                .args(patch_bootstrap_args(&[patch], options))
                .elevated(options.run_as_admin);
            match launcher.launch(&request) {
                Ok(()) => println!("{} Patch handed to the bootstrapper", "✓".green()),
                Err(e) if e.is_elevation_declined() => println!("Update declined"),
                Err(e) => return Err(e.into()),
            }
        }
        InstallAction::Installer | InstallAction::Direct => {
            println!("{} Installer started from {}", "✓".green(), path.display());
        }
        InstallAction::Declined => println!("Update declined"),
    }
    info!("Install finished for {}", path.display());
    Ok(())
}

/// Bootstrapper arguments for patch mode.
///
/// `<patch1,patch2,...> <extractionDir> <targetExe> -p [-- <forwarded args>...]`
#[must_use]
pub fn patch_bootstrap_args(patches: &[PathBuf], options: &DownloadOptions) -> Vec<String> {
    let list = patches.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(",");
    let mut args = vec![
        list,
        options.extraction_dir.display().to_string(),
        options.current_exe.display().to_string(),
        "-p".to_string(),
    ];
    if !options.forwarded_args.is_empty() {
        args.push("--".to_string());
        args.extend(options.forwarded_args.iter().cloned());
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> DownloadOptions {
        DownloadOptions {
            download_dir: None,
            extraction_dir: PathBuf::from("/opt/app"),
            current_exe: PathBuf::from("/opt/app/app"),
            bootstrapper: PathBuf::from("/opt/updraft/updraft-bootstrap"),
            clear_app_directory: false,
            run_as_admin: false,
            forwarded_args: vec!["--after-update".to_string()],
        }
    }

    #[test]
    fn test_patch_bootstrap_args() {
        let args = patch_bootstrap_args(&[PathBuf::from("/tmp/1.pwr"), PathBuf::from("/tmp/2.pwr")], &options());
        assert_eq!(args, vec!["/tmp/1.pwr,/tmp/2.pwr", "/opt/app", "/opt/app/app", "-p", "--", "--after-update"]);
    }

    #[test]
    fn test_overrides_layer_over_config() {
        let command = InstallCommand {
            download_dir: Some(PathBuf::from("/var/cache/updates")),
            clear: true,
            ..InstallCommand::default()
        };
        let config = command.apply_overrides(UpdaterConfig {
            run_as_admin: true,
            ..UpdaterConfig::default()
        });
        assert_eq!(config.download_dir, Some(PathBuf::from("/var/cache/updates")));
        assert!(config.clear_app_directory);
        assert!(config.run_as_admin);
    }

    #[test]
    fn test_target_sets_extraction_dir() {
        let temp = tempfile::tempdir().unwrap();
        let target = temp.path().join("app");
        let command = InstallCommand {
            target: Some(target.clone()),
            relaunch_args: vec!["--after-update".to_string()],
            ..InstallCommand::default()
        };
        let options = command.download_options(&UpdaterConfig::default()).unwrap();
        assert_eq!(options.current_exe, target);
        assert_eq!(options.extraction_dir, temp.path());
        assert_eq!(options.forwarded_args, vec!["--after-update"]);
    }

    #[test]
    fn test_local_package() {
        assert_eq!(local_package("https://example.com/a.zip"), None);
        #[cfg(unix)]
        assert_eq!(local_package("file:///tmp/a.zip"), Some(PathBuf::from("/tmp/a.zip")));
    }
}
