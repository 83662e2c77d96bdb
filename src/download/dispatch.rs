//! Hand-off of a verified download to the next installation stage.
//!
//! | extension | action |
//! |-----------|--------|
//! | `.zip` | stage the bootstrapper next to the archive and launch it; the host must exit |
//! | `.msi` | `msiexec /i "<file>"` plus the descriptor's installer arguments |
//! | `.pwr` | nothing; the caller starts patch application separately |
//! | other | run the file with the descriptor's installer arguments |
//!
//! Installer arguments may contain `%path%`, replaced by the directory of the
//! running executable. A declined elevation prompt turns any launch into
//! [`InstallAction::Declined`], which is not an error.

use super::DownloadOptions;
use crate::constants::{
    ARCHIVE_EXTENSION, BOOTSTRAP_BINARY_NAME, INSTALLER_EXTENSION, PATCH_EXTENSION,
    PATH_PLACEHOLDER,
};
use crate::core::{UpdateError, UpdateResult};
use crate::launch::{LaunchRequest, Launcher};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// What happened after a download was handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    /// The bootstrapper was started; the host process must exit now.
    Bootstrap { bootstrapper: PathBuf },
    /// A platform installer package was started.
    Installer,
    /// A patch bundle is ready for the bootstrapper's patch mode.
    PatchBundle { path: PathBuf },
    /// The downloaded file itself was started.
    Direct,
    /// The user declined elevation; nothing was started.
    Declined,
}

impl InstallAction {
    /// Whether the host application must exit so its files can be replaced.
    #[must_use]
    pub const fn requires_exit(&self) -> bool {
        matches!(self, Self::Bootstrap { .. })
    }
}

/// The kind of file a download produced, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Archive,
    Installer,
    PatchBundle,
    Executable,
}

impl PackageKind {
    #[must_use]
    pub fn of(path: &Path) -> Self {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some(ARCHIVE_EXTENSION) => Self::Archive,
            Some(INSTALLER_EXTENSION) => Self::Installer,
            Some(PATCH_EXTENSION) => Self::PatchBundle,
            _ => Self::Executable,
        }
    }
}

/// Launches whatever comes after a completed download.
///
/// # Errors
///
/// Returns [`UpdateError::LaunchError`] when the next stage cannot be
/// started, or an IO error when the bootstrapper cannot be staged.
pub fn dispatch(
    file: &Path,
    installer_args: Option<&str>,
    options: &DownloadOptions,
    launcher: &dyn Launcher,
) -> UpdateResult<InstallAction> {
    let kind = PackageKind::of(file);
    info!("Dispatching {} as {:?}", file.display(), kind);

    let (request, action) = match kind {
        PackageKind::PatchBundle => {
            return Ok(InstallAction::PatchBundle {
                path: file.to_path_buf(),
            });
        }
        PackageKind::Archive => {
            let bootstrapper = stage_bootstrapper(&options.bootstrapper, file)?;
            let request = LaunchRequest::new(&bootstrapper)
                .args(bootstrap_args(file, options))
                .elevated(options.run_as_admin);
            (request, InstallAction::Bootstrap {
                bootstrapper,
            })
        }
        PackageKind::Installer => {
            let mut args = vec!["/i".to_string(), file.display().to_string()];
            args.extend(installer_arguments(installer_args, &options.current_exe));
            let request = LaunchRequest::new("msiexec").args(args).elevated(options.run_as_admin);
            (request, InstallAction::Installer)
        }
        PackageKind::Executable => {
            let request = LaunchRequest::new(file)
                .args(installer_arguments(installer_args, &options.current_exe))
                .elevated(options.run_as_admin);
            (request, InstallAction::Direct)
        }
    };

    match launcher.launch(&request) {
        Ok(()) => Ok(action),
        Err(e) if e.is_elevation_declined() => {
            warn!("Elevation declined for {}; update not started", request.program.display());
            Ok(InstallAction::Declined)
        }
        Err(e) => Err(e),
    }
}

/// Bootstrapper argument list for extracting `archive`.
///
/// `<archive> <extractionDir> <currentExe> [-c] [-- <forwarded args>...]`
#[must_use]
pub fn bootstrap_args(archive: &Path, options: &DownloadOptions) -> Vec<String> {
    let mut args = vec![
        archive.display().to_string(),
        options.extraction_dir.display().to_string(),
        options.current_exe.display().to_string(),
    ];
    if options.clear_app_directory {
        args.push("-c".to_string());
    }
    if !options.forwarded_args.is_empty() {
        args.push("--".to_string());
        args.extend(options.forwarded_args.iter().cloned());
    }
    args
}

/// Installer arguments with `%path%` substituted, split into words.
#[must_use]
pub fn installer_arguments(template: Option<&str>, current_exe: &Path) -> Vec<String> {
    let Some(template) = template else {
        return Vec::new();
    };
    let exe_dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
    split_args(&substitute_path(template, exe_dir))
}

/// Replaces every `%path%` with `exe_dir`.
#[must_use]
pub fn substitute_path(template: &str, exe_dir: &Path) -> String {
    template.replace(PATH_PLACEHOLDER, &exe_dir.display().to_string())
}

/// Splits a command line on whitespace, honoring double quotes.
///
/// Quotes group words and are removed; `\"` inside quotes is a literal
/// quote. Empty quoted strings are kept as empty arguments.
#[must_use]
pub fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}

/// Copies the bootstrapper binary next to `archive` and returns the copy.
fn stage_bootstrapper(source: &Path, archive: &Path) -> UpdateResult<PathBuf> {
    let dir = archive.parent().unwrap_or_else(|| Path::new("."));
    let file_name = format!("{BOOTSTRAP_BINARY_NAME}{}", std::env::consts::EXE_SUFFIX);
    let target = dir.join(file_name);

    if !source.is_file() {
        return Err(UpdateError::launch(
            source.display(),
            "bootstrapper binary not found; set bootstrapper_path in the updater config",
        ));
    }
    if source != target {
        if target.exists() {
            std::fs::remove_file(&target)?;
        }
        std::fs::copy(source, &target)?;
    }
    Ok(target)
}
