//! Version ordering as seen by callers of the public API.

use std::cmp::Ordering;
use updraft::core::UpdateError;
use updraft::descriptor::UpdateDescriptor;
use updraft::version::{VersionComparator, VersionSpec};

#[test]
fn test_release_line_ordering() {
    let mut versions: Vec<String> = [
        "1.0.0.0",
        "1.0.0.0-beta.5",
        "1.0.0.0-alpha.3",
        "0.9.9.9",
        "1.0.0.0-beta.10",
        "1.0.0.1-alpha.1",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect();

    VersionComparator::sort_ascending(&mut versions).unwrap();
    assert_eq!(versions, vec![
        "0.9.9.9",
        "1.0.0.0-alpha.3",
        "1.0.0.0-beta.5",
        "1.0.0.0-beta.10",
        "1.0.0.0",
        "1.0.0.1-alpha.1",
    ]);
    assert_eq!(VersionComparator::get_latest(&versions).unwrap().map(String::as_str), Some("1.0.0.1-alpha.1"));
}

#[test]
fn test_is_newer_matches_compare() {
    let pairs = [("2.0", "1.9.9.9"), ("1.0.0.0-rc.1", "1.0.0.0-beta.9"), ("1.0.0.0", "1.0.0.0")];
    for (a, b) in pairs {
        let newer = VersionComparator::is_newer(a, b).unwrap();
        assert_eq!(newer, VersionComparator::compare(a, b).unwrap() == Ordering::Greater, "{a} vs {b}");
    }
}

#[test]
fn test_malformed_numeric_segment_is_format_error() {
    let err = VersionComparator::compare("1.two.3", "1.0").unwrap_err();
    assert!(matches!(err, UpdateError::FormatError { .. }));
}

#[test]
fn test_descriptor_gates_on_installed_version() {
    let descriptor = UpdateDescriptor::from_json(
        r#"{"version":"2.1.0.0-beta.2","downloadUrl":"https://example.com/app.zip"}"#,
    )
    .unwrap();

    assert!(descriptor.is_update_available(&VersionSpec::parse("2.1.0.0-alpha.7").unwrap()));
    assert!(descriptor.is_update_available(&VersionSpec::parse("2.0").unwrap()));
    assert!(!descriptor.is_update_available(&VersionSpec::parse("2.1.0.0-beta.2").unwrap()));
    assert!(!descriptor.is_update_available(&VersionSpec::parse("2.1.0.0").unwrap()));
}
