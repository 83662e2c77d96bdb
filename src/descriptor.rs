//! The update descriptor produced by feed retrieval.
//!
//! An [`UpdateDescriptor`] is the immutable record the rest of the pipeline
//! consumes: where to download the update, which version it installs, how
//! to verify it, and which incremental patches lead from an installed
//! version to the target. Feed transport is out of scope; descriptors are
//! deserialized from JSON handed over by the caller.
//!
//! ```json
//! {
//!   "version": "2.1.0.0",
//!   "downloadUrl": "https://updates.example.com/app-2.1.0.0.zip",
//!   "changelogUrl": "https://updates.example.com/changelog.html",
//!   "mandatory": { "required": true, "minVersion": "2.0.0.0", "mode": "forced" },
//!   "installerArgs": "/quiet /dir=\"%path%\"",
//!   "checksum": { "value": "9E107D9D372BB6826BD81D3542A419D6", "algorithm": "MD5" },
//!   "patches": [
//!     { "fileName": "2.0.1.0.pwr", "version": "2.0.1.0" },
//!     { "fileName": "2.1.0.0.pwr", "version": "2.1.0.0" }
//!   ]
//! }
//! ```

use crate::constants::DEFAULT_CHECKSUM_ALGORITHM;
use crate::core::UpdateError;
use crate::version::VersionSpec;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How strongly a mandatory update is enforced by the front-end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateMode {
    /// Offer the update; the user may skip or postpone it
    #[default]
    Normal,
    /// Skip and postpone are unavailable
    Forced,
    /// Download and install without asking
    ForcedDownload,
}

/// Mandatory-update policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mandatory {
    #[serde(default)]
    pub required: bool,
    /// Only installations older than this are forced to update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_version: Option<VersionSpec>,
    #[serde(default)]
    pub mode: UpdateMode,
}

impl Mandatory {
    /// Whether the policy forces an update on `installed`.
    #[must_use]
    pub fn applies_to(&self, installed: &VersionSpec) -> bool {
        self.required
            && match &self.min_version {
                Some(min) => installed < min,
                None => true,
            }
    }
}

/// Expected digest of the downloaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Hex digest, compared case-insensitively
    pub value: String,
    /// Hashing algorithm name; MD5 when absent
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "hashingAlgorithm")]
    pub algorithm: Option<String>,
}

impl Checksum {
    pub fn new(value: impl Into<String>, algorithm: Option<&str>) -> Self {
        Self {
            value: value.into(),
            algorithm: algorithm.map(str::to_string),
        }
    }

    /// The algorithm name with the default applied.
    #[must_use]
    pub fn algorithm_name(&self) -> &str {
        self.algorithm.as_deref().unwrap_or(DEFAULT_CHECKSUM_ALGORITHM)
    }
}

/// One incremental patch published alongside a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchInfo {
    pub file_name: String,
    /// Version the installation reaches after applying this patch
    pub version: VersionSpec,
}

/// Immutable description of an available update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescriptor {
    /// Version installed by this update
    pub version: VersionSpec,
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,
    #[serde(default)]
    pub mandatory: Mandatory,
    /// Arguments for installers; may contain the `%path%` placeholder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installer_args: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patches: Vec<PatchInfo>,
}

impl UpdateDescriptor {
    /// Parse a descriptor from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::JsonError`] for malformed JSON or version strings.
    pub fn from_json(json: &str) -> Result<Self, UpdateError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a descriptor file.
    pub async fn load_from(path: &Path) -> Result<Self, UpdateError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Whether this update is newer than `installed`.
    #[must_use]
    pub fn is_update_available(&self, installed: &VersionSpec) -> bool {
        self.version.is_newer_than(installed)
    }

    /// Whether `installed` must take this update.
    #[must_use]
    pub fn is_mandatory_for(&self, installed: &VersionSpec) -> bool {
        self.is_update_available(installed) && self.mandatory.applies_to(installed)
    }

    /// Patches leading from `installed` to the target version, oldest first.
    ///
    /// A patch applies when its version is newer than `installed` and not
    /// newer than the target.
    #[must_use]
    pub fn applicable_patches(&self, installed: &VersionSpec) -> Vec<&PatchInfo> {
        let mut patches: Vec<&PatchInfo> = self
            .patches
            .iter()
            .filter(|patch| patch.version.is_newer_than(installed) && patch.version <= self.version)
            .collect();
        patches.sort_by(|a, b| a.version.cmp(&b.version));
        patches
    }

    /// Make relative download and changelog URLs absolute against `base`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::NetworkError`] when `base` or a joined URL is invalid.
    pub fn resolve_urls(&mut self, base: &str) -> Result<(), UpdateError> {
        let base = Url::parse(base).map_err(|e| invalid_url(base, &e))?;
        self.download_url = resolve_url(&base, &self.download_url)?;
        if let Some(changelog) = &self.changelog_url {
            self.changelog_url = Some(resolve_url(&base, changelog)?);
        }
        Ok(())
    }
}

fn resolve_url(base: &Url, url: &str) -> Result<String, UpdateError> {
    if let Ok(absolute) = Url::parse(url) {
        return Ok(absolute.to_string());
    }
    base.join(url).map(|u| u.to_string()).map_err(|e| invalid_url(url, &e))
}

fn invalid_url(url: &str, error: &dyn std::fmt::Display) -> UpdateError {
    UpdateError::NetworkError {
        operation: format!("resolving URL '{url}'"),
        reason: error.to_string(),
    }
}
