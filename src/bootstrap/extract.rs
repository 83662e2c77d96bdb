//! Archive extraction into the installation directory.
//!
//! Extraction runs in two passes. The planning pass resolves every entry
//! name against the extraction root and rejects the whole archive if any
//! entry escapes it, so a hostile archive writes nothing. The writing pass
//! then overwrites files one entry at a time, retrying lock violations,
//! reporting progress after each entry and checking the cancellation token
//! before each one.
//!
//! Writes are not transactional: a failure halfway leaves a partially
//! updated installation behind.

use super::lock::{LockInspector, LockRetryPolicy, retry_on_lock};
use super::sink::ProgressSink;
use crate::core::{UpdateError, UpdateResult};
use crate::utils::path_validation::{resolve_within, with_trailing_separator};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// One archive entry resolved against the extraction root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedEntry {
    pub index: usize,
    pub name: String,
    pub destination: PathBuf,
    pub is_dir: bool,
}

/// Counts reported after a successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
}

/// Deletes the direct children of `dir`.
///
/// Files and symlinks are unlinked; subdirectories are removed recursively.
/// Symlinks are never followed, so a link to a directory outside `dir`
/// leaves that directory untouched.
pub fn clear_directory(dir: &Path) -> UpdateResult<()> {
    if !dir.exists() {
        return Ok(());
    }
    info!("Clearing {}", dir.display());
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| {
            UpdateError::IoError(e.into_io_error().unwrap_or_else(|| io::Error::other("directory walk failed")))
        })?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir_all(path)?;
        } else {
            fs::remove_file(path)?;
        }
        debug!("Removed {}", path.display());
    }
    Ok(())
}

/// Resolves every entry of `archive` below `root`.
///
/// # Errors
///
/// [`UpdateError::UnsafeArchiveEntry`] for the first entry that escapes
/// `root`; nothing has been written at that point. Directory entries that
/// name `root` itself, such as `./`, are left out of the plan.
pub fn plan_extraction<R: io::Read + io::Seek>(
    archive: &mut ZipArchive<R>,
    root: &Path,
) -> UpdateResult<Vec<PlannedEntry>> {
    let root_itself = with_trailing_separator(root);
    let mut plan = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index_raw(index)?;
        let name = entry.name().to_string();
        let destination = resolve_within(root, &name).ok_or_else(|| UpdateError::UnsafeArchiveEntry {
            entry: name.clone(),
        })?;
        if destination == root_itself {
            if entry.is_dir() {
                debug!("Skipping root directory entry '{}'", name);
                continue;
            }
            return Err(UpdateError::ArchiveError {
                path: name,
                reason: "file entry resolves to the extraction root".to_string(),
            });
        }
        plan.push(PlannedEntry {
            index,
            destination,
            is_dir: entry.is_dir(),
            name,
        });
    }
    Ok(plan)
}

/// Archive extraction with lock retry, progress and cancellation.
pub struct Extractor<'a> {
    pub policy: &'a LockRetryPolicy,
    pub inspector: &'a dyn LockInspector,
    pub sink: &'a dyn ProgressSink,
    pub cancel: &'a CancellationToken,
}

impl Extractor<'_> {
    /// Extracts `archive_path` into `root`, clearing it first when `clear`.
    pub fn extract(&self, archive_path: &Path, root: &Path, clear: bool) -> UpdateResult<ExtractionSummary> {
        let file = File::open(archive_path)?;
        let mut archive = ZipArchive::new(file).map_err(|e| UpdateError::ArchiveError {
            path: archive_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let plan = plan_extraction(&mut archive, root)?;
        info!("Extracting {} entries from {} to {}", plan.len(), archive_path.display(), root.display());

        if clear {
            clear_directory(root)?;
        }
        fs::create_dir_all(root)?;

        let total = plan.len();
        let mut summary = ExtractionSummary::default();
        for (done, entry) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("Extraction cancelled after {} of {} entries", done, total);
                return Err(UpdateError::Cancelled);
            }

            if entry.is_dir {
                summary.directories += 1;
            } else {
                self.write_entry(&mut archive, entry)?;
                summary.files += 1;
            }

            let percent = ((done + 1) * 100 / total) as u8;
            self.sink.progress(percent, &entry.name);
        }

        info!("Extracted {} files into {}", summary.files, root.display());
        Ok(summary)
    }

    fn write_entry<R: io::Read + io::Seek>(
        &self,
        archive: &mut ZipArchive<R>,
        entry: &PlannedEntry,
    ) -> UpdateResult<()> {
        if let Some(parent) = entry.destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let written = retry_on_lock(&entry.destination, self.policy, self.inspector, self.sink, || {
            let mut source = archive.by_index(entry.index).map_err(io::Error::other)?;
            let mut target = File::create(&entry.destination)?;
            io::copy(&mut source, &mut target)
        })?;
        debug!("Wrote {} ({} bytes)", entry.destination.display(), written);
        Ok(())
    }
}
