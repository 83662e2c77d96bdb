//! Downloading, verifying and handing off an update.
//!
//! [`Downloader::start`] runs the whole host-side pipeline for one
//! [`UpdateDescriptor`]:
//!
//! 1. stream the file to `{download_dir}/{uuid}.tmp` (OS temp dir by default),
//!    emitting [`DownloadEvent::Progress`] for every received chunk
//! 2. verify the checksum, if the descriptor carries one
//! 3. rename to the server-supplied or URL-derived file name, replacing any
//!    existing file (delete, then move)
//! 4. [`dispatch`] by extension
//!
//! Exactly one [`DownloadEvent::Finished`] is sent per call, whatever the
//! outcome, so a front-end can transition state deterministically. Progress
//! travels over a channel; the downloader never touches presentation state.
//!
//! # Example
//!
//! ```rust,no_run
//! use updraft::config::UpdaterConfig;
//! use updraft::descriptor::UpdateDescriptor;
//! use updraft::download::{DownloadEvent, DownloadOptions, Downloader};
//! use updraft::launch::SystemLauncher;
//! use std::sync::Arc;
//!
//! # async fn example(descriptor: UpdateDescriptor) -> anyhow::Result<()> {
//! let config = UpdaterConfig::load().await?;
//! let downloader = Downloader::new(DownloadOptions::from_config(&config)?, Arc::new(SystemLauncher))?;
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! tokio::spawn(async move {
//!     while let Some(event) = rx.recv().await {
//!         if let DownloadEvent::Progress(p) = event {
//!             println!("{} {}", p.size, p.speed.unwrap_or_default());
//!         }
//!     }
//! });
//!
//! let outcome = downloader.start(&descriptor, tx).await;
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod filename;
pub mod format;
pub mod verification;

pub use dispatch::{InstallAction, PackageKind, dispatch};
pub use format::{DownloadProgress, DownloadSession, bytes_to_string, format_size, format_speed};
pub use verification::{ChecksumVerifier, HashAlgorithm};

use crate::config::UpdaterConfig;
use crate::core::{UpdateError, UpdateResult};
use crate::descriptor::UpdateDescriptor;
use crate::launch::Launcher;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::CONTENT_DISPOSITION;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where and how a download is installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Download directory; the OS temp dir when `None`
    pub download_dir: Option<PathBuf>,
    /// Directory archives are extracted into
    pub extraction_dir: PathBuf,
    /// The running application's executable
    pub current_exe: PathBuf,
    /// Bootstrapper binary staged next to archives
    pub bootstrapper: PathBuf,
    pub clear_app_directory: bool,
    pub run_as_admin: bool,
    /// Arguments re-passed to the application when it is relaunched
    pub forwarded_args: Vec<String>,
}

impl DownloadOptions {
    /// Options for the running process under `config`.
    ///
    /// # Errors
    ///
    /// Fails when the current executable path cannot be determined.
    pub fn from_config(config: &UpdaterConfig) -> UpdateResult<Self> {
        let current_exe = std::env::current_exe()?;
        let exe_dir = current_exe.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Ok(Self {
            download_dir: config.download_dir.clone(),
            extraction_dir: config.extraction_dir(&exe_dir),
            bootstrapper: config.bootstrapper_path(&current_exe),
            current_exe,
            clear_app_directory: config.clear_app_directory,
            run_as_admin: config.run_as_admin,
            forwarded_args: std::env::args().skip(1).collect(),
        })
    }

    fn target_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Messages delivered to the download's subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    Progress(DownloadProgress),
    /// Sent exactly once, last.
    Finished(DownloadStatus),
}

/// Summary of a finished download for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadStatus {
    Completed,
    Failed(String),
    Cancelled,
}

/// Full result of [`Downloader::start`].
#[derive(Debug)]
pub enum DownloadOutcome {
    Completed { path: PathBuf, action: InstallAction },
    Failed(UpdateError),
    Cancelled,
}

impl DownloadOutcome {
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        match self {
            Self::Completed {
                ..
            } => DownloadStatus::Completed,
            Self::Failed(e) => DownloadStatus::Failed(e.to_string()),
            Self::Cancelled => DownloadStatus::Cancelled,
        }
    }
}

/// Fetches, verifies and dispatches updates.
pub struct Downloader {
    client: reqwest::Client,
    options: DownloadOptions,
    launcher: Arc<dyn Launcher>,
    cancel: CancellationToken,
}

impl Downloader {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be constructed.
    pub fn new(options: DownloadOptions, launcher: Arc<dyn Launcher>) -> UpdateResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("updraft/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            options,
            launcher,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that cancels the transfer in progress.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Runs the download pipeline for `descriptor`.
    ///
    /// Progress events go to `events` as they arrive, followed by exactly
    /// one [`DownloadEvent::Finished`]. A closed receiver does not stop the
    /// download.
    pub async fn start(
        &self,
        descriptor: &UpdateDescriptor,
        events: UnboundedSender<DownloadEvent>,
    ) -> DownloadOutcome {
        let outcome = match self.fetch(descriptor, &events).await {
            Ok(Some(fetched)) => self.complete(descriptor, fetched).await,
            Ok(None) => DownloadOutcome::Cancelled,
            Err(e) => DownloadOutcome::Failed(e),
        };
        finish(&events, &outcome);
        outcome
    }

    /// Runs verification, naming and dispatch for a file fetched elsewhere.
    ///
    /// The final name is the last segment of the descriptor's download URL.
    pub async fn finish_external(
        &self,
        descriptor: &UpdateDescriptor,
        temp_path: PathBuf,
        events: UnboundedSender<DownloadEvent>,
    ) -> DownloadOutcome {
        let outcome = match Url::parse(&descriptor.download_url) {
            Ok(final_url) => {
                let fetched = Fetched {
                    temp_path,
                    final_url,
                    content_disposition: None,
                };
                self.complete(descriptor, fetched).await
            }
            Err(e) => DownloadOutcome::Failed(UpdateError::NetworkError {
                operation: format!("parsing URL '{}'", descriptor.download_url),
                reason: e.to_string(),
            }),
        };
        finish(&events, &outcome);
        outcome
    }

    async fn fetch(
        &self,
        descriptor: &UpdateDescriptor,
        events: &UnboundedSender<DownloadEvent>,
    ) -> UpdateResult<Option<Fetched>> {
        let temp_path = self.temp_destination().await?;
        info!("Downloading {} to {}", descriptor.download_url, temp_path.display());

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(None),
            response = self.client.get(&descriptor.download_url).send() => response?.error_for_status()?,
        };

        let final_url = response.url().clone();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let mut session = DownloadSession::new(temp_path, response.content_length(), self.cancel.clone());

        let mut file = tokio::fs::File::create(session.temp_path()).await?;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                biased;
                () = self.cancel.cancelled() => None,
                chunk = stream.next() => Some(chunk),
            };
            match chunk {
                None => {
                    drop(file);
                    discard(session.temp_path()).await;
                    info!("Download cancelled after {} bytes", session.received());
                    return Ok(None);
                }
                Some(None) => break,
                Some(Some(Err(e))) => {
                    drop(file);
                    discard(session.temp_path()).await;
                    return Err(e.into());
                }
                Some(Some(Ok(bytes))) => {
                    file.write_all(&bytes).await?;
                    let progress = session.record(bytes.len() as u64, Instant::now());
                    let _ = events.send(DownloadEvent::Progress(progress));
                }
            }
        }
        file.flush().await?;
        drop(file);

        debug!("Received {} bytes from {}", session.received(), final_url);
        Ok(Some(Fetched {
            temp_path: session.temp_path().clone(),
            final_url,
            content_disposition,
        }))
    }

    async fn complete(&self, descriptor: &UpdateDescriptor, fetched: Fetched) -> DownloadOutcome {
        if self.cancel.is_cancelled() {
            return DownloadOutcome::Cancelled;
        }
        match self.install(descriptor, fetched).await {
            Ok((path, action)) => DownloadOutcome::Completed {
                path,
                action,
            },
            Err(e) => DownloadOutcome::Failed(e),
        }
    }

    async fn install(
        &self,
        descriptor: &UpdateDescriptor,
        fetched: Fetched,
    ) -> UpdateResult<(PathBuf, InstallAction)> {
        if let Some(checksum) = &descriptor.checksum {
            if let Err(e) = ChecksumVerifier::verify(&fetched.temp_path, checksum).await {
                discard(&fetched.temp_path).await;
                return Err(e);
            }
        }

        let file_name = filename::resolve_file_name(fetched.content_disposition.as_deref(), &fetched.final_url)
            .ok_or_else(|| UpdateError::NetworkError {
                operation: format!("naming download from {}", fetched.final_url),
                reason: "no file name in Content-Disposition or URL".to_string(),
            })?;
        let final_path = self.options.target_dir().join(file_name);

        if tokio::fs::try_exists(&final_path).await? {
            tokio::fs::remove_file(&final_path).await?;
        }
        tokio::fs::rename(&fetched.temp_path, &final_path).await?;
        info!("Update saved to {}", final_path.display());

        let options = self.options.clone();
        let launcher = Arc::clone(&self.launcher);
        let installer_args = descriptor.installer_args.clone();
        let path = final_path.clone();
        let action = tokio::task::spawn_blocking(move || {
            dispatch(&path, installer_args.as_deref(), &options, launcher.as_ref())
        })
        .await
        .map_err(|e| UpdateError::IoError(std::io::Error::other(e)))??;

        Ok((final_path, action))
    }

    async fn temp_destination(&self) -> UpdateResult<PathBuf> {
        let dir = self.options.target_dir();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir.join(format!("{}.tmp", uuid::Uuid::new_v4())))
    }
}

struct Fetched {
    temp_path: PathBuf,
    final_url: Url,
    content_disposition: Option<String>,
}

fn finish(events: &UnboundedSender<DownloadEvent>, outcome: &DownloadOutcome) {
    match outcome {
        DownloadOutcome::Completed {
            path,
            action,
        } => info!("Update {} handed off: {:?}", path.display(), action),
        DownloadOutcome::Failed(e) => error!("Update failed: {}", e),
        DownloadOutcome::Cancelled => info!("Update cancelled"),
    }
    let _ = events.send(DownloadEvent::Finished(outcome.status()));
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}
