//! `updraft check`: report whether a descriptor offers an update.
//!
//! ```text
//! $ updraft check https://example.com/app/feed.json --installed 1.1.0.0
//! Update available: 1.2.0.0 (installed 1.1.0.0)
//! Mandatory: yes (forced)
//! Download: https://example.com/app/app-1.2.0.0.zip
//! Patches:
//!   1.1.5.0  app-1.1.5.pwr
//!   1.2.0.0  app-1.2.0.pwr
//! ```
//!
//! `--format json` prints the same report as one JSON object.

use super::common::{load_descriptor, parse_installed};
use crate::descriptor::{UpdateDescriptor, UpdateMode};
use crate::version::VersionSpec;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Update descriptor: a JSON file or an http(s) URL
    #[arg(value_name = "DESCRIPTOR")]
    pub descriptor: String,

    /// Currently installed version
    #[arg(long, value_name = "VERSION")]
    pub installed: String,

    /// Output format (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,
}

/// Result of comparing a descriptor with the installed version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub installed: String,
    pub available: String,
    pub update_available: bool,
    pub mandatory: bool,
    pub mode: UpdateMode,
    pub download_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,
    pub patches: Vec<PatchEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchEntry {
    pub version: String,
    pub file_name: String,
}

impl CheckReport {
    #[must_use]
    pub fn build(descriptor: &UpdateDescriptor, installed: &VersionSpec) -> Self {
        let update_available = descriptor.is_update_available(installed);
        Self {
            installed: installed.to_string(),
            available: descriptor.version.to_string(),
            update_available,
            mandatory: descriptor.is_mandatory_for(installed),
            mode: descriptor.mandatory.mode,
            download_url: descriptor.download_url.clone(),
            changelog_url: descriptor.changelog_url.clone(),
            patches: if update_available {
                descriptor
                    .applicable_patches(installed)
                    .into_iter()
                    .map(|p| PatchEntry {
                        version: p.version.to_string(),
                        file_name: p.file_name.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            },
        }
    }

    fn print_text(&self) {
        if !self.update_available {
            println!("{} {} is up to date", "✓".green(), self.installed);
            return;
        }

        println!("Update available: {} (installed {})", self.available.green().bold(), self.installed);
        if self.mandatory {
            println!("Mandatory: {} ({:?})", "yes".yellow(), self.mode);
        } else {
            println!("Mandatory: no");
        }
        println!("Download: {}", self.download_url);
        if let Some(changelog) = &self.changelog_url {
            println!("Changelog: {changelog}");
        }
        if !self.patches.is_empty() {
            println!("Patches:");
            for patch in &self.patches {
                println!("  {:<10} {}", patch.version, patch.file_name);
            }
        }
    }
}

impl CheckCommand {
    pub async fn execute(&self) -> Result<()> {
        let installed = parse_installed(&self.installed)?;
        let descriptor = load_descriptor(&self.descriptor).await?;
        let report = CheckReport::build(&descriptor, &installed);

        if self.format == "json" {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            report.print_text();
        }
        Ok(())
    }
}
