use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::VariantResolutionError;
use crate::media::{self, MediaKind, SupportedVideo};

pub const DESCRIPTOR_EXTENSION: &str = ".xml";

/// Case-insensitive comparison form: NFC, lowercase. File names coming from
/// macOS volumes are decomposed, configuration values usually are not.
pub(crate) fn fold(s: &str) -> String {
    nfc(s).to_lowercase()
}

pub(crate) fn nfc(s: &str) -> String {
    s.nfc().collect()
}

/// Remove every case-insensitive occurrence of `needle` from `haystack`.
fn remove_ignore_case(haystack: &str, needle: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let haystack: String = haystack.nfc().collect();
    let needle = fold(needle);
    let mut out = String::with_capacity(haystack.len());
    let mut rest = haystack.as_str();
    while !rest.is_empty() {
        match find_ignore_case(rest, &needle) {
            Some((start, end)) => {
                out.push_str(&rest[..start]);
                rest = &rest[end..];
            }
            None => {
                out.push_str(rest);
                break;
            }
        }
    }
    out
}

/// Byte range of the first case-insensitive match of an already folded needle.
fn find_ignore_case(haystack: &str, folded_needle: &str) -> Option<(usize, usize)> {
    for (start, _) in haystack.char_indices() {
        let mut end = start;
        let mut folded = String::new();
        for c in haystack[start..].chars() {
            end += c.len_utf8();
            folded.extend(c.to_lowercase());
            if folded.len() >= folded_needle.len() {
                break;
            }
        }
        if folded == folded_needle {
            return Some((start, end));
        }
    }
    None
}

/// Strip `suffix` from the end of `stem`, ignoring case. Returns `None` when
/// the stem does not end with it.
pub(crate) fn strip_suffix_ignore_case(stem: &str, suffix: &str) -> Option<String> {
    if suffix.is_empty() {
        return None;
    }
    let stem: String = stem.nfc().collect();
    let folded_suffix = fold(suffix);
    for (idx, _) in stem.char_indices().rev() {
        let tail = fold(&stem[idx..]);
        if tail == folded_suffix {
            return Some(stem[..idx].to_string());
        }
        if tail.len() > folded_suffix.len() {
            break;
        }
    }
    None
}

/// Resolves variant relationships inside a media set from the ordered list of
/// configured suffixes. Earlier suffixes win.
#[derive(Debug, Clone)]
pub struct VariantResolver {
    suffixes: Vec<String>,
}

impl VariantResolver {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }

    /// Index of the first configured suffix the stem ends with.
    pub fn suffix_priority(&self, stem: &str) -> Option<usize> {
        self.suffixes
            .iter()
            .position(|s| strip_suffix_ignore_case(stem, s).is_some())
    }

    /// Stem with its highest-priority variant suffix removed, or the stem
    /// unchanged when none matches.
    pub fn strip_variant(&self, stem: &str) -> String {
        self.suffixes
            .iter()
            .find_map(|s| strip_suffix_ignore_case(stem, s))
            .unwrap_or_else(|| nfc(stem))
    }

    /// Find the QuickTime variant of `primary` among `siblings`.
    ///
    /// For each suffix in priority order the suffix is removed from the
    /// primary's stem and the first sibling whose stem starts with the
    /// remainder and classifies as an alternate video is returned.
    pub fn find_alternate_variant(
        &self,
        primary: &SupportedVideo,
        siblings: &[PathBuf],
    ) -> Result<Option<SupportedVideo>, VariantResolutionError> {
        if self.suffixes.is_empty() {
            return Err(VariantResolutionError::NoSuffixesConfigured);
        }
        let stem = media::file_stem(primary.path());

        for suffix in &self.suffixes {
            let candidate = fold(&remove_ignore_case(stem, suffix));
            let found = siblings
                .iter()
                .filter(|p| p.as_path() != primary.path())
                .filter(|p| fold(media::file_stem(p)).starts_with(&candidate))
                .filter_map(|p| SupportedVideo::create(p.clone()))
                .find(|v| v.kind() == MediaKind::AlternateVideo);
            if let Some(video) = found {
                tracing::debug!(
                    primary = %primary.path().display(),
                    alternate = %video.path().display(),
                    suffix = %suffix,
                    "found alternate variant"
                );
                return Ok(Some(video));
            }
        }
        Ok(None)
    }

    /// Descriptor path for a media file: the file's stem without its variant
    /// suffix, with the descriptor extension, in the same directory.
    pub fn resolve_descriptor_name(&self, media_file: &Path) -> Result<PathBuf, VariantResolutionError> {
        if self.suffixes.is_empty() {
            return Err(VariantResolutionError::NoSuffixesConfigured);
        }
        let stem = media::file_stem(media_file);
        for suffix in &self.suffixes {
            if let Some(base) = strip_suffix_ignore_case(stem, suffix) {
                let name = format!("{base}{DESCRIPTOR_EXTENSION}");
                return Ok(match media_file.parent() {
                    Some(dir) => dir.join(name),
                    None => PathBuf::from(name),
                });
            }
        }
        Err(VariantResolutionError::NoSuffixMatch(
            media::file_name(media_file).to_string(),
        ))
    }
}
