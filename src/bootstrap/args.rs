use crate::constants::{ARCHIVE_EXTENSION, PATCH_EXTENSION};
use crate::core::{UpdateError, UpdateResult};
use clap::Args;
use std::path::{Path, PathBuf};

/// Invocation arguments of the bootstrap process.
///
/// ```text
/// updraft-bootstrap <archiveOrPatchList> <extractionPath> <targetExecutablePath> [-c] [-p] [-- args...]
/// ```
///
/// Everything after `--` is handed to the relaunched application unchanged.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct BootstrapArgs {
    /// Archive to extract, or a comma-separated list of patch files with -p
    #[arg(value_name = "ARCHIVE_OR_PATCHES")]
    pub update_path: String,

    /// Installation directory to update
    #[arg(value_name = "EXTRACTION_PATH")]
    pub extraction_path: PathBuf,

    /// Executable to wait for and relaunch
    #[arg(value_name = "TARGET_EXECUTABLE")]
    pub target_executable: PathBuf,

    /// Empty the installation directory before extracting
    #[arg(short = 'c', long = "clear")]
    pub clear_target_dir: bool,

    /// Apply patch files instead of extracting an archive
    #[arg(short = 'p', long = "patch")]
    pub patch_mode: bool,

    /// Arguments passed to the relaunched application
    #[arg(last = true, value_name = "ARGS")]
    pub forwarded_args: Vec<String>,
}

/// What the bootstrapper will do, derived from validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapMode {
    Extract { archive: PathBuf },
    Patch { patches: Vec<PathBuf> },
}

impl BootstrapArgs {
    /// Validates the update path against the selected mode.
    ///
    /// # Errors
    ///
    /// [`UpdateError::InvalidArguments`] when an archive does not end in
    /// `.zip`, or the first patch does not end in `.pwr`.
    pub fn mode(&self) -> UpdateResult<BootstrapMode> {
        if self.patch_mode {
            let patches: Vec<PathBuf> = self
                .update_path
                .split(',')
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect();
            match patches.first() {
                Some(first) if has_extension(first, PATCH_EXTENSION) => Ok(BootstrapMode::Patch {
                    patches,
                }),
                Some(first) => Err(UpdateError::InvalidArguments {
                    reason: format!("patch mode requires a .{PATCH_EXTENSION} file, got '{}'", first.display()),
                }),
                None => Err(UpdateError::InvalidArguments {
                    reason: "patch mode requires at least one patch file".to_string(),
                }),
            }
        } else {
            let archive = PathBuf::from(&self.update_path);
            if has_extension(&archive, ARCHIVE_EXTENSION) {
                Ok(BootstrapMode::Extract {
                    archive,
                })
            } else {
                Err(UpdateError::InvalidArguments {
                    reason: format!("archive mode requires a .{ARCHIVE_EXTENSION} file, got '{}'", archive.display()),
                })
            }
        }
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(extension))
}
