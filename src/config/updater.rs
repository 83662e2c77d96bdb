use crate::bootstrap::lock::LockRetryPolicy;
use crate::constants::{
    BOOTSTRAP_BINARY_NAME, CONFIG_PATH_ENV, DEFAULT_PATCH_TOOL, LOCK_RETRY_DELAY,
    MAX_LOCK_RETRIES,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Updater settings loaded from `config.toml`.
///
/// Every field is optional in the file; accessor methods apply the
/// documented defaults so callers never handle `None` themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Directory for downloaded updates. The OS temp directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,

    /// Extraction target overriding the current executable's directory.
    ///
    /// Ignored when the directory does not exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_path: Option<PathBuf>,

    /// Ask the bootstrapper to empty the installation directory first.
    #[serde(default)]
    pub clear_app_directory: bool,

    /// Launch installers and the bootstrapper with elevation.
    #[serde(default)]
    pub run_as_admin: bool,

    /// Bootstrapper binary staged next to downloaded archives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrapper_path: Option<PathBuf>,

    /// External diff-patch tool. Looked up on `PATH` when not absolute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_tool: Option<PathBuf>,

    /// Directory holding the bootstrap log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Upper bound on waiting for the target application to exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_timeout_secs: Option<u64>,

    #[serde(default)]
    pub lock_retry: LockRetryConfig,
}

/// `[lock_retry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_max_retries() -> u32 {
    MAX_LOCK_RETRIES
}

fn default_delay_secs() -> u64 {
    LOCK_RETRY_DELAY.as_secs()
}

impl Default for LockRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from the default location.
    ///
    /// A missing file yields [`UpdaterConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, else from the default location.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            tracing::debug!("No updater config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read updater config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse updater config from {}", path.display()))
    }

    /// Save configuration, creating parent directories as needed.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize updater config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write updater config to {}", path.display()))
    }

    /// Default configuration file path.
    ///
    /// # Errors
    ///
    /// Returns an error when `UPDRAFT_CONFIG_PATH` is unset and the platform
    /// configuration directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        resolve_config_path(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
    }

    /// Directory downloads are written to.
    #[must_use]
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Extraction target for archives: the configured installation path if
    /// it exists, else `exe_dir`.
    #[must_use]
    pub fn extraction_dir(&self, exe_dir: &Path) -> PathBuf {
        match &self.installation_path {
            Some(path) if path.is_dir() => path.clone(),
            Some(path) => {
                tracing::warn!(
                    "Configured installation path {} does not exist; extracting to {}",
                    path.display(),
                    exe_dir.display()
                );
                exe_dir.to_path_buf()
            }
            None => exe_dir.to_path_buf(),
        }
    }

    /// Bootstrapper binary to stage next to an archive.
    ///
    /// Defaults to the `updraft-bootstrap` executable beside `current_exe`.
    #[must_use]
    pub fn bootstrapper_path(&self, current_exe: &Path) -> PathBuf {
        if let Some(path) = &self.bootstrapper_path {
            return path.clone();
        }
        let file_name = format!("{BOOTSTRAP_BINARY_NAME}{}", std::env::consts::EXE_SUFFIX);
        current_exe.parent().map_or_else(|| PathBuf::from(&file_name), |dir| dir.join(&file_name))
    }

    /// The patch tool executable, configured or `butler`.
    #[must_use]
    pub fn patch_tool(&self) -> PathBuf {
        self.patch_tool.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_PATCH_TOOL))
    }

    /// Directory of the bootstrap log.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return dir.clone();
        }
        dirs::data_local_dir().unwrap_or_else(std::env::temp_dir).join("updraft")
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    #[must_use]
    pub fn lock_retry_policy(&self) -> LockRetryPolicy {
        LockRetryPolicy {
            max_retries: self.lock_retry.max_retries,
            delay: Duration::from_secs(self.lock_retry.delay_secs),
            ..LockRetryPolicy::default()
        }
    }
}

fn resolve_config_path(env_override: Option<OsString>, config_dir: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = env_override.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    let dir = config_dir.ok_or_else(|| anyhow::anyhow!("Unable to determine configuration directory"))?;
    Ok(dir.join("updraft").join("config.toml"))
}
