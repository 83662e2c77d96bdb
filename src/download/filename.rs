//! Final file naming for completed downloads.
//!
//! The server's `Content-Disposition` header wins; otherwise the last path
//! segment of the URL the transfer actually ended at (after redirects) is
//! used. Either way only the final path component is kept, so a hostile
//! header cannot place the file outside the download directory.

use regex::Regex;
use reqwest::Url;
use std::path::Path;

/// File name announced by a `Content-Disposition` header.
///
/// RFC 5987 `filename*=charset''value` takes precedence over a plain
/// `filename=` parameter, quoted or not.
#[must_use]
pub fn content_disposition_filename(header: &str) -> Option<String> {
    let extended = Regex::new(r#"(?i)filename\*\s*=\s*([^']*)'[^']*'([^;]+)"#).ok()?;
    if let Some(caps) = extended.captures(header) {
        let encoded = caps.get(2).map(|m| m.as_str().trim().trim_matches('"'))?;
        let name = urlencoding::decode(encoded).ok().and_then(|decoded| sanitize(&decoded));
        if name.is_some() {
            return name;
        }
    }

    let plain = Regex::new(r#"(?i)(?:^|;)\s*filename\s*=\s*(?:"([^"]*)"|([^;]+))"#).ok()?;
    let caps = plain.captures(header)?;
    let raw = caps.get(1).or_else(|| caps.get(2))?.as_str().trim();
    sanitize(raw)
}

/// Last non-empty path segment of `url`, percent-decoded.
#[must_use]
pub fn url_file_name(url: &Url) -> Option<String> {
    let segment = url.path_segments()?.rev().find(|s| !s.is_empty())?;
    let decoded = urlencoding::decode(segment).map(|d| d.into_owned()).unwrap_or_else(|_| segment.to_string());
    sanitize(&decoded)
}

/// Chooses the final file name for a download.
#[must_use]
pub fn resolve_file_name(content_disposition: Option<&str>, final_url: &Url) -> Option<String> {
    content_disposition.and_then(content_disposition_filename).or_else(|| url_file_name(final_url))
}

fn sanitize(raw: &str) -> Option<String> {
    let normalized = raw.replace('\\', "/");
    let name = Path::new(&normalized).file_name()?.to_str()?.trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
