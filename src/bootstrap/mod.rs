//! The out-of-process bootstrapper.
//!
//! The host application downloads an update, starts `updraft-bootstrap`
//! and exits. The bootstrapper then drives a small state machine:
//!
//! ```text
//! Idle -> WaitForTargetExit -> Extracting | Patching -> Relaunch -> Terminated
//!            (any state) -> FatalError
//! ```
//!
//! - **WaitForTargetExit**: poll the process table until nothing runs the
//!   target executable. Unbounded unless a timeout is configured.
//! - **Extracting**: unpack a `.zip` over the installation directory on a
//!   blocking worker thread (see [`extract`]).
//! - **Patching**: feed each `.pwr` file to the diff tool (see [`patch`]).
//! - **Relaunch**: start the target again with the forwarded arguments.
//!
//! All user-facing output goes through a [`ProgressSink`], so the console
//! binary and an embedding UI share this one implementation.

pub mod args;
pub mod extract;
pub mod lock;
pub mod patch;
pub mod sink;
pub mod wait;

pub use args::{BootstrapArgs, BootstrapMode};
pub use sink::{BootstrapEvent, ChannelSink, ConsoleSink, LogSink, ProgressSink};

use crate::config::UpdaterConfig;
use crate::constants::PROCESS_POLL_INTERVAL;
use crate::core::{UpdateError, UpdateResult};
use crate::launch::{LaunchRequest, Launcher, SystemLauncher};
use extract::{ExtractionSummary, Extractor};
use lock::{LockInspector, LockRetryPolicy, SystemLockInspector};
use patch::{PatchApplier, PatchDriver, PatchQueue, PatchSummary};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wait::{ProcessProbe, SysinfoProbe};

/// States of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapState {
    Idle,
    WaitForTargetExit,
    Extracting,
    Patching,
    Relaunch,
    Terminated,
    FatalError,
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateApplied {
    Extracted(ExtractionSummary),
    Patched(PatchSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub applied: UpdateApplied,
    /// `false` when the user declined elevation for the relaunch.
    pub relaunched: bool,
}

/// The bootstrap state machine with its platform seams.
pub struct Bootstrapper {
    probe: Arc<dyn ProcessProbe>,
    inspector: Arc<dyn LockInspector>,
    launcher: Arc<dyn Launcher>,
    applier: Arc<dyn PatchApplier>,
    sink: Arc<dyn ProgressSink>,
    policy: LockRetryPolicy,
    poll_interval: Duration,
    wait_timeout: Option<Duration>,
    cancel: CancellationToken,
    state: BootstrapState,
}

impl Bootstrapper {
    /// Bootstrapper using the real process table, launcher and `butler`.
    pub fn new(sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            probe: Arc::new(SysinfoProbe),
            inspector: Arc::new(SystemLockInspector),
            launcher: Arc::new(SystemLauncher),
            applier: Arc::new(PatchDriver::new(crate::constants::DEFAULT_PATCH_TOOL)),
            sink,
            policy: LockRetryPolicy::default(),
            poll_interval: PROCESS_POLL_INTERVAL,
            wait_timeout: None,
            cancel: CancellationToken::new(),
            state: BootstrapState::Idle,
        }
    }

    /// Applies the patch tool, lock policy and wait timeout from `config`.
    pub fn from_config(config: &UpdaterConfig, sink: Arc<dyn ProgressSink>) -> Self {
        Self::new(sink)
            .with_applier(Arc::new(PatchDriver::new(config.patch_tool())))
            .with_policy(config.lock_retry_policy())
            .with_wait_timeout(config.wait_timeout())
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ProcessProbe>) -> Self {
        self.probe = probe;
        self
    }

    #[must_use]
    pub fn with_inspector(mut self, inspector: Arc<dyn LockInspector>) -> Self {
        self.inspector = inspector;
        self
    }

    #[must_use]
    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn with_applier(mut self, applier: Arc<dyn PatchApplier>) -> Self {
        self.applier = applier;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: LockRetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_wait_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.wait_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> BootstrapState {
        self.state
    }

    /// Token that aborts the exit wait, extraction and patching.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs the state machine to completion.
    ///
    /// Ends in [`BootstrapState::Terminated`] on success or cancellation and
    /// in [`BootstrapState::FatalError`] otherwise. Fatal errors are
    /// reported to the sink before they are returned.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidArguments`] before any state change when the
    /// arguments do not match the mode, [`UpdateError::Cancelled`] when the
    /// token fired, or the error that stopped the run.
    pub async fn run(&mut self, args: &BootstrapArgs) -> UpdateResult<BootstrapReport> {
        let mode = args.mode()?;

        match self.execute(args, mode).await {
            Ok(report) => {
                self.transition(BootstrapState::Terminated);
                Ok(report)
            }
            Err(e) if e.is_cancelled() => {
                info!("Bootstrap cancelled in state {:?}", self.state);
                self.transition(BootstrapState::Terminated);
                Err(e)
            }
            Err(e) => {
                error!("Bootstrap failed in state {:?}: {}", self.state, e);
                self.sink.report_error(&e);
                self.transition(BootstrapState::FatalError);
                Err(e)
            }
        }
    }

    async fn execute(&mut self, args: &BootstrapArgs, mode: BootstrapMode) -> UpdateResult<BootstrapReport> {
        self.transition(BootstrapState::WaitForTargetExit);
        wait::wait_for_exit(
            self.probe.as_ref(),
            &args.target_executable,
            self.poll_interval,
            self.wait_timeout,
            &self.cancel,
        )
        .await?;

        let applied = match mode {
            BootstrapMode::Extract {
                archive,
            } => {
                self.transition(BootstrapState::Extracting);
                let summary = self.extract(archive, args.extraction_path.clone(), args.clear_target_dir).await?;
                UpdateApplied::Extracted(summary)
            }
            BootstrapMode::Patch {
                patches,
            } => {
                self.transition(BootstrapState::Patching);
                let mut queue = PatchQueue::new(patches);
                let summary = queue
                    .run(self.applier.as_ref(), &args.extraction_path, self.sink.as_ref(), &self.cancel)
                    .await?;
                info!("Patching finished: {} applied, {} skipped", summary.applied, summary.skipped);
                UpdateApplied::Patched(summary)
            }
        };

        self.transition(BootstrapState::Relaunch);
        let relaunched = self.relaunch(&args.target_executable, &args.forwarded_args)?;

        Ok(BootstrapReport {
            applied,
            relaunched,
        })
    }

    async fn extract(&self, archive: PathBuf, root: PathBuf, clear: bool) -> UpdateResult<ExtractionSummary> {
        let policy = self.policy;
        let inspector = Arc::clone(&self.inspector);
        let sink = Arc::clone(&self.sink);
        let cancel = self.cancel.clone();

        tokio::task::spawn_blocking(move || {
            Extractor {
                policy: &policy,
                inspector: inspector.as_ref(),
                sink: sink.as_ref(),
                cancel: &cancel,
            }
            .extract(&archive, &root, clear)
        })
        .await
        .map_err(|e| UpdateError::IoError(std::io::Error::other(format!("extraction worker failed: {e}"))))?
    }

    fn relaunch(&self, target: &Path, forwarded: &[String]) -> UpdateResult<bool> {
        let mut request = LaunchRequest::new(target).args(forwarded.iter().cloned());
        if let Some(dir) = target.parent().filter(|d| !d.as_os_str().is_empty()) {
            request = request.working_dir(dir);
        }
        match self.launcher.launch(&request) {
            Ok(()) => Ok(true),
            Err(e) if e.is_elevation_declined() => {
                info!("Relaunch of {} declined by the user", target.display());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn transition(&mut self, next: BootstrapState) {
        info!("{:?} -> {:?}", self.state, next);
        self.state = next;
        self.sink.state_changed(next);
    }
}
