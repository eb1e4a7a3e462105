use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{DescriptorError, ExtractionError, FileOperationError};
use crate::fileops::FileOperations;
use crate::metadata::{FfMetadata, MetadataExtractor};

const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const DEFAULT_MEDIA_TYPE: &str = "Other";

/// XML sidecar file describing one production:
///
/// ```xml
/// <media type="Other">
///   <title>2023-05-01 Hochzeit Meier</title>
///   <album>Familie</album>
///   <published>2023-05-01</published>
/// </media>
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Descriptor {
    pub title: String,
    pub album: Option<String>,
    pub published: Option<NaiveDate>,
    pub description: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MediaXml {
    #[serde(rename = "@type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(alias = "Title", default)]
    title: Option<String>,
    #[serde(alias = "Album", default, skip_serializing_if = "Option::is_none")]
    album: Option<String>,
    #[serde(alias = "Published", default, skip_serializing_if = "Option::is_none")]
    published: Option<String>,
    #[serde(alias = "Description", default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts `yyyy-mm-dd`, optionally followed by a time part.
fn parse_published(value: &str) -> Option<NaiveDate> {
    let date_part = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

impl Descriptor {
    pub fn parse(xml: &str) -> Result<Self, DescriptorError> {
        let raw: MediaXml = quick_xml::de::from_str(xml).map_err(|e| DescriptorError::Xml(e.to_string()))?;

        let title = non_empty(raw.title).ok_or(DescriptorError::MissingTitle)?;
        let published = match non_empty(raw.published) {
            Some(value) => Some(parse_published(&value).ok_or(DescriptorError::InvalidPublished(value))?),
            None => None,
        };

        Ok(Self {
            title,
            album: non_empty(raw.album),
            published,
            description: non_empty(raw.description),
        })
    }

    /// Build a descriptor from an ffmetadata tag dump. Requires a title tag.
    pub fn from_ffmetadata(meta: &FfMetadata) -> Option<Self> {
        let title = meta.get("title")?.trim().to_string();
        let published = meta
            .get("date")
            .or_else(|| meta.get("creation_time"))
            .and_then(parse_published);
        Some(Self {
            title,
            album: meta.get("album").map(|s| s.trim().to_string()),
            published,
            description: meta
                .get("description")
                .or_else(|| meta.get("comment"))
                .map(|s| s.trim().to_string()),
        })
    }

    /// Descriptor for a video from its embedded tags. The ffmetadata dump is
    /// used when it carries a title, else the single ffprobe tags.
    /// `Ok(None)` when the video has no title at all.
    pub fn from_video(extractor: &MetadataExtractor, file: &Path) -> Result<Option<Self>, ExtractionError> {
        let raw = extractor.raw_metadata(file)?;
        if let Some(descriptor) = FfMetadata::parse(&raw).as_ref().and_then(Self::from_ffmetadata) {
            return Ok(Some(descriptor));
        }

        tracing::debug!(file = %file.display(), "no titled ffmetadata dump, reading single tags");
        let Some(title) = extractor.title(file)? else {
            return Ok(None);
        };
        Ok(Some(Self {
            title,
            album: extractor.album(file)?,
            published: extractor.optional_field(file, "date")?.as_deref().and_then(parse_published),
            description: extractor.description(file)?,
        }))
    }

    pub fn to_xml(&self) -> Result<String, DescriptorError> {
        let raw = MediaXml {
            kind: Some(DEFAULT_MEDIA_TYPE.to_string()),
            title: Some(self.title.clone()),
            album: self.album.clone(),
            published: self.published.map(|d| d.format("%Y-%m-%d").to_string()),
            description: self.description.clone(),
        };
        let body = quick_xml::se::to_string_with_root("media", &raw).map_err(|e| DescriptorError::Xml(e.to_string()))?;
        Ok(format!("{XML_DECLARATION}{body}\n"))
    }
}

/// A descriptor together with the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorFile {
    pub path: PathBuf,
    pub descriptor: Descriptor,
}

/// Read and parse one descriptor file. `Ok(None)` when the file is readable
/// but is not a descriptor.
pub fn read_descriptor(path: &Path, files: &dyn FileOperations) -> Result<Option<Descriptor>, FileOperationError> {
    let text = files.read_file(path)?;
    match Descriptor::parse(&text) {
        Ok(descriptor) => Ok(Some(descriptor)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "not a descriptor file, ignoring");
            Ok(None)
        }
    }
}

/// All valid descriptor files at the top level of `dir`, sorted by name.
/// Unreadable or unparseable XML files are skipped with a warning.
pub fn discover_descriptors(dir: &Path, files: &dyn FileOperations) -> Result<Vec<DescriptorFile>, FileOperationError> {
    let entries = std::fs::read_dir(dir).map_err(|e| FileOperationError::io("read_dir", dir, e))?;
    let mut xml_files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("xml"))
        })
        .collect();
    xml_files.sort();
    tracing::info!(count = xml_files.len(), dir = %dir.display(), "found XML files");

    let mut found = Vec::new();
    for path in xml_files {
        match read_descriptor(&path, files) {
            Ok(Some(descriptor)) => found.push(DescriptorFile { path, descriptor }),
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not read XML file"),
        }
    }
    tracing::info!(count = found.len(), "found descriptor files");
    Ok(found)
}
