use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::error::PathResolutionError;

/// Directory segment used in place of `yyyy/yyyy-mm-dd` when no recording
/// date is known.
pub const UNKNOWN_DATE_SEGMENT: &str = "unknown";

static DATE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static SEPARATOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[/\\]").unwrap());

/// Recording date from the leading space-delimited token of a title.
pub fn recording_date_from_title(title: &str) -> Option<NaiveDate> {
    let token = title.split(' ').next()?;
    if !DATE_TOKEN_RE.is_match(token) {
        return None;
    }
    NaiveDate::parse_from_str(token, "%Y-%m-%d").ok()
}

/// Keep a tag value inside a single directory level.
pub(crate) fn sanitize_segment(segment: &str) -> String {
    let replaced = SEPARATOR_RE.replace_all(segment.trim(), "-");
    match replaced.as_ref() {
        "." | ".." => replaced.replace('.', "-"),
        _ => replaced.into_owned(),
    }
}

/// Destination of a file in the library:
/// `root/[album/]yyyy/yyyy-mm-dd/<title without "yyyy-mm-dd "><extension>`,
/// or `root/[album/]unknown/<title><extension>` without a date.
///
/// `extension` includes its leading dot. The date prefix is removed only
/// when the title starts with exactly `"<yyyy-mm-dd> "` and something
/// follows it.
pub fn resolve_target_path(
    library_root: Option<&Path>,
    album: Option<&str>,
    date: Option<NaiveDate>,
    title: &str,
    extension: &str,
) -> Result<PathBuf, PathResolutionError> {
    let root = library_root
        .filter(|r| !r.as_os_str().is_empty())
        .ok_or(PathResolutionError::LibraryRootUnset)?;

    let mut path = root.to_path_buf();
    if let Some(album) = album.map(sanitize_segment).filter(|a| !a.is_empty()) {
        path.push(album);
    }

    let file_title = match date {
        Some(date) => {
            let iso = date.format("%Y-%m-%d").to_string();
            path.push(date.year().to_string());
            path.push(&iso);
            let prefix = format!("{iso} ");
            title
                .strip_prefix(prefix.as_str())
                .filter(|rest| !rest.trim().is_empty())
                .unwrap_or(title)
        }
        None => {
            path.push(UNKNOWN_DATE_SEGMENT);
            title
        }
    };

    path.push(format!("{}{extension}", sanitize_segment(file_title)));
    Ok(path)
}
