//! Incremental updates through an external binary-diff tool.
//!
//! The tool (`butler` by default) is run once per patch file:
//!
//! ```text
//! <tool> apply --staging-dir=<staging> <patch> <target> --json
//! ```
//!
//! With `--json` every output line is a status record tagged by `type`:
//!
//! ```json
//! {"type":"log","time":1700000000,"level":"info","message":"patching"}
//! {"type":"progress","time":1700000001,"progress":0.42,"eta":3.5,"bps":1048576}
//! {"type":"error","time":1700000002,"message":"corrupted patch"}
//! {"type":"result","time":1700000003,"success":true}
//! ```
//!
//! Every line from both streams is logged verbatim under the `patch_tool`
//! target and kept in a [`Transcript`]. A patch counts as applied only when
//! the tool exits with status zero and no `result` record reported failure.

use super::sink::ProgressSink;
use crate::constants::STAGING_DIR_NAME;
use crate::core::{UpdateError, UpdateResult};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// One line of the tool's `--json` output.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusRecord {
    Log {
        #[serde(default)]
        level: Option<String>,
        #[serde(default)]
        message: String,
    },
    Progress {
        /// Fraction in `[0, 1]`.
        progress: f64,
        #[serde(default)]
        eta: Option<f64>,
        #[serde(default)]
        bps: Option<u64>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
    Result {
        #[serde(default)]
        success: Option<bool>,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
    #[serde(other)]
    Unknown,
}

impl StatusRecord {
    /// Display percentage for a progress record.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        match self {
            Self::Progress {
                progress,
                ..
            } => Some((progress.clamp(0.0, 1.0) * 100.0) as u8),
            _ => None,
        }
    }
}

/// Parses one output line; `None` for anything that is not a status record.
#[must_use]
pub fn parse_line(line: &str) -> Option<StatusRecord> {
    serde_json::from_str(line.trim()).ok()
}

/// Append-only log of tool output shared by the stdout and stderr readers.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Transcript {
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).push(line.into());
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// A single patch application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    pub patch: PathBuf,
    pub target_dir: PathBuf,
    pub staging_dir: PathBuf,
}

/// Applies one patch to a directory.
pub trait PatchApplier: Send + Sync {
    fn apply<'a>(
        &'a self,
        request: &'a PatchRequest,
        sink: &'a dyn ProgressSink,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, UpdateResult<()>>;
}

/// Runs the external diff tool as a subprocess.
#[derive(Debug, Clone)]
pub struct PatchDriver {
    tool: PathBuf,
    transcript: Transcript,
}

impl PatchDriver {
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            transcript: Transcript::default(),
        }
    }

    pub fn tool(&self) -> &Path {
        &self.tool
    }

    /// Every line the tool printed so far, both streams interleaved.
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Arguments passed to the tool for `request`.
    #[must_use]
    pub fn arguments(request: &PatchRequest) -> Vec<String> {
        vec![
            "apply".to_string(),
            format!("--staging-dir={}", request.staging_dir.display()),
            request.patch.display().to_string(),
            request.target_dir.display().to_string(),
            "--json".to_string(),
        ]
    }

    async fn run(
        &self,
        request: &PatchRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> UpdateResult<()> {
        let patch_name = request.patch.display().to_string();
        let tool_error = |reason: String| UpdateError::PatchToolError {
            patch: patch_name.clone(),
            reason,
        };

        let program = resolve_tool(&self.tool)
            .map_err(|e| tool_error(format!("'{}' not found on PATH: {e}", self.tool.display())))?;

        info!("Applying patch {} to {}", request.patch.display(), request.target_dir.display());
        let mut child = Command::new(&program)
            .args(Self::arguments(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| tool_error(format!("failed to start '{}': {e}", self.tool.display())))?;

        let stdout = child.stdout.take().ok_or_else(|| tool_error("missing stdout".to_string()))?;
        let stderr = child.stderr.take().ok_or_else(|| tool_error("missing stderr".to_string()))?;

        let stderr_transcript = self.transcript.clone();
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "patch_tool", "stderr: {}", line);
                stderr_transcript.push(line);
            }
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut reported_success: Option<bool> = None;
        let mut errors: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(UpdateError::Cancelled);
                }
                line = lines.next_line() => {
                    let Some(line) = line? else { break };
                    info!(target: "patch_tool", "{}", line);
                    self.transcript.push(line.clone());

                    match parse_line(&line) {
                        Some(record @ StatusRecord::Progress { .. }) => {
                            if let Some(percent) = record.percent() {
                                sink.progress(percent, &patch_name);
                            }
                        }
                        Some(StatusRecord::Error { message }) => errors.push(message),
                        Some(StatusRecord::Result { success, .. }) => reported_success = success,
                        Some(_) => {}
                        None => debug!("Ignoring non-JSON tool output: {}", line),
                    }
                }
            }
        }

        let status = child.wait().await?;
        let _ = stderr_task.await;

        if !status.success() {
            let reason = errors.last().cloned().unwrap_or_else(|| format!("exited with {status}"));
            return Err(tool_error(reason));
        }
        match reported_success {
            Some(true) => {}
            Some(false) => {
                let reason = errors.last().cloned().unwrap_or_else(|| "tool reported failure".to_string());
                return Err(tool_error(reason));
            }
            None if !errors.is_empty() => return Err(tool_error(errors.join("; "))),
            None => warn!("Patch tool exited without a result record for {}", patch_name),
        }

        sink.progress(100, &patch_name);
        info!("Applied patch {}", patch_name);
        Ok(())
    }
}

impl PatchApplier for PatchDriver {
    fn apply<'a>(
        &'a self,
        request: &'a PatchRequest,
        sink: &'a dyn ProgressSink,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, UpdateResult<()>> {
        self.run(request, sink, cancel).boxed()
    }
}

/// Outcome of running a [`PatchQueue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchSummary {
    pub applied: usize,
    pub skipped: usize,
}

/// Ordered patch files applied one at a time.
///
/// The cursor advances only after a patch finished (or was skipped), so it
/// reaches `len()` only once every tool invocation has exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchQueue {
    patches: Vec<PathBuf>,
    cursor: usize,
}

impl PatchQueue {
    pub fn new(patches: Vec<PathBuf>) -> Self {
        Self {
            patches,
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// `<directory of the first patch>/staging`.
    pub fn staging_dir(&self) -> Option<PathBuf> {
        let first = self.patches.first()?;
        let parent = first.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        Some(parent.join(STAGING_DIR_NAME))
    }

    /// Applies every remaining patch to `target_dir`, in order.
    ///
    /// Patches whose file or target directory is missing are logged and
    /// skipped. The first failing patch stops the queue.
    pub async fn run(
        &mut self,
        applier: &dyn PatchApplier,
        target_dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> UpdateResult<PatchSummary> {
        let Some(staging_dir) = self.staging_dir() else {
            return Ok(PatchSummary::default());
        };
        let mut summary = PatchSummary::default();

        while let Some(patch) = self.patches.get(self.cursor).cloned() {
            if cancel.is_cancelled() {
                return Err(UpdateError::Cancelled);
            }

            if !patch.is_file() || !target_dir.is_dir() {
                warn!(
                    "Skipping patch {}: patch file or target directory {} does not exist",
                    patch.display(),
                    target_dir.display()
                );
                summary.skipped += 1;
                self.cursor += 1;
                continue;
            }

            clear_staging(&staging_dir)?;
            let request = PatchRequest {
                patch,
                target_dir: target_dir.to_path_buf(),
                staging_dir: staging_dir.clone(),
            };
            applier.apply(&request, sink, cancel).await?;
            summary.applied += 1;
            self.cursor += 1;
        }

        Ok(summary)
    }
}

/// Looks bare tool names up on `PATH`; paths are used as given.
fn resolve_tool(tool: &Path) -> Result<PathBuf, which::Error> {
    if tool.components().count() > 1 {
        Ok(tool.to_path_buf())
    } else {
        which::which(tool)
    }
}

/// Removes leftover files from a previous tool run.
fn clear_staging(staging_dir: &Path) -> UpdateResult<()> {
    if !staging_dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(staging_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            std::fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}
