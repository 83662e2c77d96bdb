//! Path containment checks for archive extraction.
//!
//! Archive entry names are untrusted. Before anything is written, every
//! entry is resolved against the extraction root without touching the file
//! system, and entries that would land outside the root are rejected.

use std::ffi::OsString;
use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

/// Returns `root` with a trailing separator.
///
/// `/opt/app` becomes `/opt/app/`, so a string prefix test cannot confuse
/// `/opt/app` with `/opt/app-evil`.
#[must_use]
pub fn with_trailing_separator(root: &Path) -> PathBuf {
    let mut raw: OsString = root.as_os_str().to_owned();
    let ends_with_separator = raw.to_string_lossy().ends_with(['/', MAIN_SEPARATOR]);
    if !ends_with_separator {
        raw.push(MAIN_SEPARATOR.to_string());
    }
    PathBuf::from(raw)
}

/// Lexically resolves `.` and `..` components.
///
/// Returns `None` when `..` climbs above the start of `path`.
#[must_use]
pub fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return None;
                }
                normalized.pop();
                depth -= 1;
            }
            Component::Normal(part) => {
                normalized.push(part);
                depth += 1;
            }
        }
    }
    Some(normalized)
}

/// Resolves an archive entry name below `root`.
///
/// Absolute names, drive prefixes, and names whose `..` segments climb out
/// of `root` all yield `None`. Backslashes are treated as separators so
/// archives built on Windows are checked the same way everywhere. A name
/// that normalizes to nothing, such as `./`, resolves to `root` itself.
#[must_use]
pub fn resolve_within(root: &Path, entry_name: &str) -> Option<PathBuf> {
    let unified = entry_name.replace('\\', "/");
    let relative = Path::new(&unified);

    if relative.is_absolute() || relative.has_root() {
        return None;
    }
    if relative.components().any(|c| matches!(c, Component::Prefix(_))) {
        return None;
    }

    let normalized = normalize_lexically(relative)?;
    let root = with_trailing_separator(root);
    let candidate = root.join(&normalized);
    candidate.starts_with(&root).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_separator() {
        let root = with_trailing_separator(Path::new("/opt/app"));
        assert!(root.to_string_lossy().ends_with(MAIN_SEPARATOR));
        let again = with_trailing_separator(&root);
        assert_eq!(root, again);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(normalize_lexically(Path::new("a/./b/../c")), Some(PathBuf::from("a/c")));
        assert_eq!(normalize_lexically(Path::new("a/..")), Some(PathBuf::new()));
        assert_eq!(normalize_lexically(Path::new("../a")), None);
        assert_eq!(normalize_lexically(Path::new("a/../../b")), None);
    }

    #[test]
    fn test_resolve_within_accepts_nested_entries() {
        let root = Path::new("/opt/app");
        assert_eq!(resolve_within(root, "bin/app"), Some(PathBuf::from("/opt/app/bin/app")));
        assert_eq!(resolve_within(root, "bin/../lib/x.so"), Some(PathBuf::from("/opt/app/lib/x.so")));
        assert_eq!(resolve_within(root, "data\\cfg.ini"), Some(PathBuf::from("/opt/app/data/cfg.ini")));
    }

    #[test]
    fn test_resolve_within_rejects_escapes() {
        let root = Path::new("/opt/app");
        assert_eq!(resolve_within(root, "../../etc/passwd"), None);
        assert_eq!(resolve_within(root, "bin/../../app-evil/x"), None);
        assert_eq!(resolve_within(root, "..\\..\\x"), None);
        assert_eq!(resolve_within(root, "/etc/passwd"), None);
    }

    #[test]
    fn test_resolve_within_empty_names_resolve_to_root() {
        let root = Path::new("/opt/app");
        let expected = Some(with_trailing_separator(root));
        assert_eq!(resolve_within(root, "."), expected);
        assert_eq!(resolve_within(root, "./"), expected);
        assert_eq!(resolve_within(root, "dir/../"), expected);
    }
}
