//! String-level version comparison used to gate updates and order patches.
//!
//! [`VersionComparator`] parses both operands with [`VersionSpec::parse`] and
//! propagates any [`UpdateError::FormatError`] instead of guessing.
//!
//! # Examples
//!
//! ```rust
//! use updraft::version::VersionComparator;
//! use std::cmp::Ordering;
//!
//! # fn example() -> Result<(), updraft::core::UpdateError> {
//! assert!(VersionComparator::is_newer("1.2.0.0", "1.1.9.9")?);
//! assert!(VersionComparator::is_newer("1.0.0.0", "1.0.0.0-beta.5")?);
//! assert_eq!(VersionComparator::compare("1.0", "1.0.0.0")?, Ordering::Equal);
//! # Ok(())
//! # }
//! ```

use super::VersionSpec;
use crate::core::UpdateError;
use std::cmp::Ordering;

/// Version comparison utilities for update gating.
pub struct VersionComparator;

impl VersionComparator {
    /// Three-way comparison of two version strings.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::FormatError`] if either string has a malformed
    /// numeric part.
    pub fn compare(a: &str, b: &str) -> Result<Ordering, UpdateError> {
        let a = VersionSpec::parse(a)?;
        let b = VersionSpec::parse(b)?;
        Ok(a.cmp(&b))
    }

    /// Whether `a` is strictly newer than `b`.
    ///
    /// Equal numeric tuples with equal stages are decided by the pre-release
    /// build number; a stable version beats any pre-release of the same
    /// tuple, and beta beats alpha.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::FormatError`] if either string has a malformed
    /// numeric part.
    pub fn is_newer(a: &str, b: &str) -> Result<bool, UpdateError> {
        Ok(Self::compare(a, b)? == Ordering::Greater)
    }

    /// Returns the newest version in `versions`, or `None` when empty.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed version string.
    pub fn get_latest<'a>(versions: &'a [String]) -> Result<Option<&'a String>, UpdateError> {
        let mut latest: Option<(&String, VersionSpec)> = None;
        for version in versions {
            let parsed = VersionSpec::parse(version)?;
            let replace = match &latest {
                Some((_, current)) => parsed > *current,
                None => true,
            };
            if replace {
                latest = Some((version, parsed));
            }
        }
        Ok(latest.map(|(version, _)| version))
    }

    /// Sorts version strings oldest first.
    ///
    /// # Errors
    ///
    /// Fails on the first malformed version string; `versions` is left
    /// untouched in that case.
    pub fn sort_ascending(versions: &mut [String]) -> Result<(), UpdateError> {
        let mut keyed = versions
            .iter()
            .map(|v| VersionSpec::parse(v).map(|spec| (spec, v.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (slot, (_, version)) in versions.iter_mut().zip(keyed) {
            *slot = version;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer_examples() {
        assert!(VersionComparator::is_newer("1.2.0.0", "1.1.9.9").unwrap());
        assert!(VersionComparator::is_newer("1.0.0.0-beta.2", "1.0.0.0-beta.1").unwrap());
        assert!(VersionComparator::is_newer("1.0.0.0", "1.0.0.0-beta.5").unwrap());
        assert!(VersionComparator::is_newer("1.0.0.0-beta.1", "1.0.0.0-alpha.9").unwrap());
    }

    #[test]
    fn test_is_newer_is_strict() {
        for v in ["1.0.0.0", "2.3", "0.0.0.1", "4.5.6.7"] {
            assert!(!VersionComparator::is_newer(v, v).unwrap());
        }
        assert!(!VersionComparator::is_newer("1.0", "1.0.0.0").unwrap());
        assert!(!VersionComparator::is_newer("1.0.0.0", "1.0").unwrap());
    }

    #[test]
    fn test_is_newer_reversed_pairs() {
        assert!(!VersionComparator::is_newer("1.1.9.9", "1.2.0.0").unwrap());
        assert!(!VersionComparator::is_newer("1.0.0.0-beta.5", "1.0.0.0").unwrap());
        assert!(!VersionComparator::is_newer("1.0.0.0-alpha.9", "1.0.0.0-beta.1").unwrap());
    }

    #[test]
    fn test_numeric_beats_stage() {
        assert!(VersionComparator::is_newer("1.0.0.1-alpha.1", "1.0.0.0").unwrap());
    }

    #[test]
    fn test_format_error_propagates() {
        assert!(matches!(
            VersionComparator::is_newer("1.a", "1.0"),
            Err(UpdateError::FormatError { .. })
        ));
        assert!(VersionComparator::compare("1.0", "").is_err());
    }

    #[test]
    fn test_get_latest() {
        let versions = vec![
            "1.0.0.0".to_string(),
            "1.1.0.0-beta.3".to_string(),
            "1.1.0.0".to_string(),
            "0.9".to_string(),
        ];
        let latest = VersionComparator::get_latest(&versions).unwrap();
        assert_eq!(latest, Some(&"1.1.0.0".to_string()));
        assert_eq!(VersionComparator::get_latest(&[]).unwrap(), None);
    }

    #[test]
    fn test_sort_ascending() {
        let mut versions = vec![
            "1.1.0.0".to_string(),
            "1.1.0.0-alpha.2".to_string(),
            "1.0.0.0".to_string(),
            "1.1.0.0-beta.1".to_string(),
        ];
        VersionComparator::sort_ascending(&mut versions).unwrap();
        assert_eq!(versions, vec!["1.0.0.0", "1.1.0.0-alpha.2", "1.1.0.0-beta.1", "1.1.0.0"]);
    }
}
