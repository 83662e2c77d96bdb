//! Application version parsing with pre-release staging.
//!
//! Update feeds publish versions as four-part numeric tuples with an
//! optional pre-release suffix:
//!
//! ```text
//! 1.4.0.2
//! 1.4.0.2-beta.3
//! 1.5.0.0-alpha.12
//! ```
//!
//! The numeric prefix (split at the first `-`) accepts one to four
//! dot-separated segments; missing segments default to `0`. The suffix is
//! scanned for the literal substrings `alpha` and `beta` to pick a [`Stage`]
//! (neither means [`Stage::Stable`]), and the text after its last `.` is read
//! as the pre-release build number.
//!
//! # Ordering
//!
//! Numeric tuples compare first, most significant segment first. Equal tuples
//! fall back to the stage (`Alpha < Beta < Stable`) and then to the
//! pre-release build number. See [`comparison::VersionComparator`] for the
//! string-level API.
//!
//! # Malformed suffixes
//!
//! A numeric segment that is not a non-negative integer is a hard
//! [`UpdateError::FormatError`]. A malformed pre-release build number is not:
//! it degrades to `-1` and logs a warning, so `1.0.0.0-beta.x` still parses
//! as a beta that sorts below every numbered beta of the same tuple.
//!
//! # Examples
//!
//! ```rust
//! use updraft::version::{Stage, VersionSpec};
//!
//! let v: VersionSpec = "2.1-beta.4".parse().unwrap();
//! assert_eq!(v.numeric(), [2, 1, 0, 0]);
//! assert_eq!(v.stage(), Stage::Beta);
//! assert_eq!(v.pre_release_build(), 4);
//! ```

pub mod comparison;

pub use comparison::VersionComparator;

use crate::core::UpdateError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Build number recorded when a suffix carries none (or an unreadable one).
pub const NO_PRE_RELEASE_BUILD: i64 = -1;

const MAX_NUMERIC_SEGMENTS: usize = 4;

/// Release stage of a version. Declaration order is the ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Suffix contains `alpha`
    Alpha,
    /// Suffix contains `beta`
    Beta,
    /// No suffix, or a suffix naming neither stage
    Stable,
}

impl Stage {
    fn detect(suffix: &str) -> Self {
        if suffix.contains("alpha") {
            Self::Alpha
        } else if suffix.contains("beta") {
            Self::Beta
        } else {
            Self::Stable
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alpha => write!(f, "alpha"),
            Self::Beta => write!(f, "beta"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

/// A parsed application version.
///
/// Equality and ordering ignore the original spelling, so `1.0` equals
/// `1.0.0.0`.
#[derive(Debug, Clone)]
pub struct VersionSpec {
    numeric: [u32; 4],
    stage: Stage,
    pre_release_build: i64,
    raw: String,
}

impl VersionSpec {
    /// Parse a version string, see the module docs for the accepted grammar.
    pub fn parse(input: &str) -> Result<Self, UpdateError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(UpdateError::format(input, "version string is empty"));
        }

        let (numeric_part, suffix) = match raw.split_once('-') {
            Some((numeric, suffix)) => (numeric, Some(suffix)),
            None => (raw, None),
        };

        let numeric = parse_numeric(raw, numeric_part)?;
        let (stage, pre_release_build) = match suffix {
            Some(suffix) => (Stage::detect(suffix), parse_build(raw, suffix)),
            None => (Stage::Stable, NO_PRE_RELEASE_BUILD),
        };

        Ok(Self {
            numeric,
            stage,
            pre_release_build,
            raw: raw.to_string(),
        })
    }

    /// `(major, minor, build, revision)`
    #[must_use]
    pub const fn numeric(&self) -> [u32; 4] {
        self.numeric
    }

    #[must_use]
    pub const fn stage(&self) -> Stage {
        self.stage
    }

    /// Pre-release build number, [`NO_PRE_RELEASE_BUILD`] when absent.
    #[must_use]
    pub const fn pre_release_build(&self) -> i64 {
        self.pre_release_build
    }

    #[must_use]
    pub const fn is_pre_release(&self) -> bool {
        !matches!(self.stage, Stage::Stable)
    }

    /// The trimmed string this version was parsed from.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `self` is strictly newer than `other`.
    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Greater
    }
}

fn parse_numeric(raw: &str, numeric_part: &str) -> Result<[u32; 4], UpdateError> {
    let segments: Vec<&str> = numeric_part.split('.').collect();
    if segments.len() > MAX_NUMERIC_SEGMENTS {
        return Err(UpdateError::format(
            raw,
            format!("expected at most {MAX_NUMERIC_SEGMENTS} numeric segments, found {}", segments.len()),
        ));
    }

    let mut numeric = [0u32; 4];
    for (slot, segment) in numeric.iter_mut().zip(&segments) {
        *slot = segment.trim().parse::<u32>().map_err(|_| {
            UpdateError::format(raw, format!("segment '{segment}' is not a non-negative integer"))
        })?;
    }
    Ok(numeric)
}

fn parse_build(raw: &str, suffix: &str) -> i64 {
    let Some((_, build)) = suffix.rsplit_once('.') else {
        return NO_PRE_RELEASE_BUILD;
    };
    match build.trim().parse::<i64>() {
        Ok(number) => number,
        Err(_) => {
            warn!("Pre-release build '{}' in version '{}' is not a number; treating as {}", build, raw, NO_PRE_RELEASE_BUILD);
            NO_PRE_RELEASE_BUILD
        }
    }
}

impl Ord for VersionSpec {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric
            .cmp(&other.numeric)
            .then_with(|| self.stage.cmp(&other.stage))
            .then_with(|| self.pre_release_build.cmp(&other.pre_release_build))
    }
}

impl PartialEq for VersionSpec {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionSpec {}

impl std::hash::Hash for VersionSpec {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.numeric.hash(state);
        self.stage.hash(state);
        self.pre_release_build.hash(state);
    }
}

impl PartialOrd for VersionSpec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for VersionSpec {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for VersionSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
