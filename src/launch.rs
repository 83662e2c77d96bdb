//! Starting detached processes, optionally elevated.
//!
//! Both the downloader (installers, the bootstrapper) and the bootstrapper
//! (relaunching the updated application) start a process and walk away from
//! it. [`Launcher`] is the seam tests replace; [`SystemLauncher`] is the real
//! implementation.
//!
//! # Elevation
//!
//! - **Windows**: `powershell Start-Process -Verb RunAs`. When the user
//!   dismisses the UAC prompt, PowerShell reports "canceled by the user" and
//!   the launch fails with [`UpdateError::ElevationDeclined`].
//! - **Unix**: the program is started through `pkexec`. A dismissed
//!   authentication dialog only surfaces after the child exits, so it is
//!   not reported as declined.
//!
//! A raw `ERROR_CANCELLED` (1223) from process creation is classified as
//! declined on every platform.

use crate::core::{UpdateError, UpdateResult};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Win32 `ERROR_CANCELLED`: the user declined an elevation prompt.
pub const ERROR_CANCELLED: i32 = 1223;

/// A process to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub elevate: bool,
    pub working_dir: Option<PathBuf>,
}

impl LaunchRequest {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            elevate: false,
            working_dir: None,
        }
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn elevated(mut self, elevate: bool) -> Self {
        self.elevate = elevate;
        self
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Starts processes without waiting for them to finish.
pub trait Launcher: Send + Sync {
    /// # Errors
    ///
    /// [`UpdateError::ElevationDeclined`] when the user refused elevation,
    /// [`UpdateError::LaunchError`] for any other failure.
    fn launch(&self, request: &LaunchRequest) -> UpdateResult<()>;
}

/// Launcher backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl Launcher for SystemLauncher {
    fn launch(&self, request: &LaunchRequest) -> UpdateResult<()> {
        info!("Launching {} {:?} (elevated: {})", request.program.display(), request.args, request.elevate);
        if request.elevate {
            launch_elevated(request)
        } else {
            let mut command = Command::new(&request.program);
            command.args(&request.args);
            spawn_detached(command, request)
        }
    }
}

fn spawn_detached(mut command: Command, request: &LaunchRequest) -> UpdateResult<()> {
    if let Some(dir) = &request.working_dir {
        command.current_dir(dir);
    }
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
    match command.spawn() {
        Ok(child) => {
            debug!("Started {} as pid {}", request.program.display(), child.id());
            Ok(())
        }
        Err(e) => Err(classify_spawn_error(&request.program, &e)),
    }
}

/// Maps a process-creation failure to the declined or launch error kinds.
#[must_use]
pub fn classify_spawn_error(program: &Path, error: &std::io::Error) -> UpdateError {
    if error.raw_os_error() == Some(ERROR_CANCELLED) {
        UpdateError::ElevationDeclined
    } else {
        UpdateError::launch(program.display(), error)
    }
}

#[cfg(windows)]
fn launch_elevated(request: &LaunchRequest) -> UpdateResult<()> {
    let mut script = format!(
        "Start-Process -FilePath {} -Verb RunAs",
        powershell_quote(&request.program.to_string_lossy())
    );
    if !request.args.is_empty() {
        let args: Vec<String> = request.args.iter().map(|a| powershell_quote(&quote_windows_arg(a))).collect();
        script.push_str(&format!(" -ArgumentList {}", args.join(",")));
    }
    if let Some(dir) = &request.working_dir {
        script.push_str(&format!(" -WorkingDirectory {}", powershell_quote(&dir.to_string_lossy())));
    }

    let output = Command::new("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &script])
        .output()
        .map_err(|e| classify_spawn_error(&request.program, &e))?;

    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if is_elevation_declined_message(&stderr) {
        Err(UpdateError::ElevationDeclined)
    } else {
        Err(UpdateError::launch(request.program.display(), stderr.trim()))
    }
}

#[cfg(not(windows))]
fn launch_elevated(request: &LaunchRequest) -> UpdateResult<()> {
    let mut command = Command::new("pkexec");
    command.arg(&request.program).args(&request.args);
    spawn_detached(command, request)
}

/// Whether shell output reports a dismissed elevation prompt.
#[must_use]
pub fn is_elevation_declined_message(output: &str) -> bool {
    let lowered = output.to_ascii_lowercase();
    lowered.contains("canceled by the user") || lowered.contains("cancelled by the user")
}

#[cfg(windows)]
fn powershell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(windows)]
fn quote_windows_arg(arg: &str) -> String {
    if arg.is_empty() || arg.contains([' ', '\t', '"']) {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}
