use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// ISO base media boxes that may open a QuickTime or MPEG-4 file.
const CONTAINER_BOXES: &[&[u8; 4]] = &[b"ftyp", b"moov", b"mdat", b"wide", b"free", b"skip", b"pnot"];

/// `ftyp` major brand written by QuickTime.
const QUICKTIME_BRAND: &[u8; 4] = b"qt  ";

const SNIFF_LEN: usize = 32;

/// Result of classifying one file of the source directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// MPEG-4 exchange format (`.mp4`, `.m4v`).
    PrimaryVideo,
    /// QuickTime container (`.mov`), the native export of the same production.
    AlternateVideo,
    Image,
    /// XML sidecar carrying album, published date and title.
    Descriptor,
    Unrecognized,
}

impl MediaKind {
    pub fn is_video(self) -> bool {
        matches!(self, MediaKind::PrimaryVideo | MediaKind::AlternateVideo)
    }
}

/// Classify a file by extension, then confirm with the first bytes when the
/// file is readable. Content that contradicts the extension is unrecognized.
pub fn classify(path: &Path) -> MediaKind {
    let by_extension = classify_extension(path);
    if by_extension == MediaKind::Unrecognized || by_extension == MediaKind::Descriptor {
        return by_extension;
    }

    let Some(header) = read_header(path) else {
        return by_extension;
    };

    match by_extension {
        MediaKind::PrimaryVideo | MediaKind::AlternateVideo => sniff_video(&header, by_extension),
        MediaKind::Image => {
            if image::guess_format(&header).is_ok() {
                MediaKind::Image
            } else {
                MediaKind::Unrecognized
            }
        }
        other => other,
    }
}

fn classify_extension(path: &Path) -> MediaKind {
    let is_xml = path
        .extension()
        .and_then(|e| e.to_str())
        .map_or(false, |e| e.eq_ignore_ascii_case("xml"));
    if is_xml {
        return MediaKind::Descriptor;
    }

    let Some(mime) = mime_guess::from_path(path).first() else {
        return MediaKind::Unrecognized;
    };
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("video", "mp4") | ("video", "x-m4v") => MediaKind::PrimaryVideo,
        ("video", "quicktime") => MediaKind::AlternateVideo,
        ("image", "jpeg") | ("image", "png") | ("image", "webp") => MediaKind::Image,
        _ => MediaKind::Unrecognized,
    }
}

fn read_header(path: &Path) -> Option<Vec<u8>> {
    let file = File::open(path).ok()?;
    let mut header = Vec::with_capacity(SNIFF_LEN);
    file.take(SNIFF_LEN as u64).read_to_end(&mut header).ok()?;
    Some(header)
}

fn sniff_video(header: &[u8], by_extension: MediaKind) -> MediaKind {
    if header.len() < 8 {
        return MediaKind::Unrecognized;
    }
    let box_type = &header[4..8];
    if !CONTAINER_BOXES.iter().any(|b| b.as_slice() == box_type) {
        return MediaKind::Unrecognized;
    }
    if box_type == b"ftyp" && header.len() >= 12 {
        if &header[8..12] == QUICKTIME_BRAND {
            return MediaKind::AlternateVideo;
        }
        return MediaKind::PrimaryVideo;
    }
    by_extension
}

/// A video file that classified as one of the two supported containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedVideo {
    path: PathBuf,
    kind: MediaKind,
}

impl SupportedVideo {
    pub fn create(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let kind = classify(&path);
        kind.is_video().then_some(Self { path, kind })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn is_primary(&self) -> bool {
        self.kind == MediaKind::PrimaryVideo
    }

    /// Same video at its new location after a move.
    pub(crate) fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: self.kind,
        }
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    /// Extension including the leading dot, as found on disk.
    pub fn extension(&self) -> String {
        dotted_extension(&self.path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupportedImage {
    path: PathBuf,
}

impl SupportedImage {
    pub fn create(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        (classify(&path) == MediaKind::Image).then_some(Self { path })
    }

    pub(crate) fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }

    pub fn extension(&self) -> String {
        dotted_extension(&self.path)
    }
}

pub(crate) fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

pub(crate) fn file_stem(path: &Path) -> &str {
    path.file_stem().and_then(|n| n.to_str()).unwrap_or("")
}

pub(crate) fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    /// Minimal MPEG-4 header with the given major brand.
    pub(crate) fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut bytes = vec![0, 0, 0, 0x14];
        bytes.extend_from_slice(b"ftyp");
        bytes.extend_from_slice(brand);
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        bytes.extend_from_slice(brand);
        bytes
    }

    pub(crate) const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

    #[test]
    fn test_classify_by_extension_when_missing() {
        assert_eq!(classify(Path::new("/nope/a.mp4")), MediaKind::PrimaryVideo);
        assert_eq!(classify(Path::new("/nope/a.M4V")), MediaKind::PrimaryVideo);
        assert_eq!(classify(Path::new("/nope/a.mov")), MediaKind::AlternateVideo);
        assert_eq!(classify(Path::new("/nope/a.jpg")), MediaKind::Image);
        assert_eq!(classify(Path::new("/nope/a.xml")), MediaKind::Descriptor);
        assert_eq!(classify(Path::new("/nope/a.srt")), MediaKind::Unrecognized);
        assert_eq!(classify(Path::new("/nope/noext")), MediaKind::Unrecognized);
    }

    #[test]
    fn test_sniff_confirms_content() {
        let dir = tempdir().unwrap();
        let mp4 = dir.path().join("a.mp4");
        fs::write(&mp4, ftyp(b"mp42")).unwrap();
        assert_eq!(classify(&mp4), MediaKind::PrimaryVideo);

        let mov_named_mp4 = dir.path().join("b.mp4");
        fs::write(&mov_named_mp4, ftyp(b"qt  ")).unwrap();
        assert_eq!(classify(&mov_named_mp4), MediaKind::AlternateVideo);

        let fake = dir.path().join("c.mp4");
        fs::write(&fake, b"this is not a video at all").unwrap();
        assert_eq!(classify(&fake), MediaKind::Unrecognized);

        let png = dir.path().join("d.png");
        fs::write(&png, PNG_MAGIC).unwrap();
        assert_eq!(classify(&png), MediaKind::Image);

        let bad_png = dir.path().join("e.png");
        fs::write(&bad_png, b"plain text").unwrap();
        assert_eq!(classify(&bad_png), MediaKind::Unrecognized);
    }

    #[test]
    fn test_supported_wrappers() {
        assert!(SupportedVideo::create("/x/a.mp4").is_some());
        assert!(SupportedVideo::create("/x/a.jpg").is_none());
        assert!(SupportedImage::create("/x/a.png").is_some());
        assert!(SupportedImage::create("/x/a.mov").is_none());

        let video = SupportedVideo::create("/x/Film-4K.mp4").unwrap();
        assert!(video.is_primary());
        assert_eq!(video.extension(), ".mp4");
        assert_eq!(video.file_name(), "Film-4K.mp4");
    }
}
