//! Helpers shared by the `check` and `install` commands.

use crate::descriptor::UpdateDescriptor;
use crate::version::VersionSpec;
use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use std::path::Path;

/// Loads an update descriptor from an `http(s)` URL or a local file.
///
/// Relative download and changelog URLs are resolved against the location
/// the descriptor was read from.
pub async fn load_descriptor(source: &str) -> Result<UpdateDescriptor> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let body = reqwest::get(source)
            .await
            .and_then(reqwest::Response::error_for_status)
            .with_context(|| format!("Failed to fetch update descriptor from {source}"))?
            .text()
            .await
            .with_context(|| format!("Failed to read update descriptor from {source}"))?;
        let mut descriptor = UpdateDescriptor::from_json(&body)
            .with_context(|| format!("Invalid update descriptor at {source}"))?;
        descriptor.resolve_urls(source)?;
        return Ok(descriptor);
    }

    let path = Path::new(source);
    let mut descriptor = UpdateDescriptor::load_from(path)
        .await
        .with_context(|| format!("Failed to load update descriptor from {}", path.display()))?;

    let absolute = std::fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve descriptor path {}", path.display()))?;
    let base = Url::from_file_path(&absolute)
        .map_err(|()| anyhow!("Descriptor path {} is not absolute", absolute.display()))?;
    descriptor.resolve_urls(base.as_str())?;
    Ok(descriptor)
}

/// Parses the `--installed` version argument.
pub fn parse_installed(version: &str) -> Result<VersionSpec> {
    VersionSpec::parse(version).with_context(|| format!("Invalid installed version '{version}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_relative_download_url_resolves_against_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("feed.json");
        std::fs::write(&path, r#"{"version":"1.2.0.0","downloadUrl":"packages/app-1.2.zip"}"#).unwrap();

        let descriptor = load_descriptor(&path.to_string_lossy()).await.unwrap();
        assert!(descriptor.download_url.starts_with("file://"));
        assert!(descriptor.download_url.ends_with("/packages/app-1.2.zip"));
    }

    #[tokio::test]
    async fn test_missing_descriptor_file() {
        let err = load_descriptor("/definitely/missing/feed.json").await.unwrap_err();
        assert!(err.to_string().contains("Failed to load update descriptor"));
    }

    #[test]
    fn test_parse_installed() {
        assert!(parse_installed("1.0.0.0-beta.2").is_ok());
        assert!(parse_installed("one.two").is_err());
    }
}
