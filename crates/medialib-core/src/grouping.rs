use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::descriptor::{self, Descriptor};
use crate::fileops::FileOperations;
use crate::media::{self, MediaKind};
use crate::report::Diagnostic;
use crate::variant::{self, VariantResolver};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawFile {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// All files derived from one production.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaSet {
    /// Base name shared by every file, without variant suffix or extension.
    /// May start with an ISO date token.
    pub title: String,
    /// Case-folded `title`, the grouping key.
    #[serde(skip)]
    pub key: String,
    pub files: Vec<RawFile>,
    pub descriptor: Option<Descriptor>,
}

impl MediaSet {
    pub fn files_of_kind(&self, kind: MediaKind) -> impl Iterator<Item = &RawFile> {
        self.files.iter().filter(move |f| f.kind == kind)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }
}

#[derive(Debug, Default)]
pub struct Grouping {
    pub sets: Vec<MediaSet>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Partition a flat file list into media sets by shared base name.
///
/// Sets appear in the order their first file was listed; files keep their
/// listing order inside a set. Unrecognized files are left out with a
/// diagnostic.
pub fn group_media_sets(files: &[PathBuf], resolver: &VariantResolver) -> Grouping {
    let mut grouping = Grouping::default();
    let mut index: HashMap<String, usize> = HashMap::new();

    for path in files {
        let kind = media::classify(path);
        if kind == MediaKind::Unrecognized {
            tracing::debug!(path = %path.display(), "unrecognized file, not grouped");
            grouping
                .diagnostics
                .push(Diagnostic::new(path.clone(), "unrecognized file type, skipped"));
            continue;
        }

        let stem = media::file_stem(path);
        let title = match kind {
            // descriptor names are already the bare base name
            MediaKind::Descriptor => variant::nfc(stem),
            _ => resolver.strip_variant(stem),
        };
        let key = variant::fold(&title);

        let raw = RawFile {
            path: path.clone(),
            kind,
        };
        match index.get(&key) {
            Some(&i) => grouping.sets[i].files.push(raw),
            None => {
                index.insert(key.clone(), grouping.sets.len());
                grouping.sets.push(MediaSet {
                    title,
                    key,
                    files: vec![raw],
                    descriptor: None,
                });
            }
        }
    }

    tracing::info!(
        sets = grouping.sets.len(),
        skipped = grouping.diagnostics.len(),
        "grouped source files into media sets"
    );
    grouping
}

/// Attach the parsed descriptor of each set, located through the descriptor
/// name of the set's videos. Videos without a variant suffix and unreadable
/// descriptors are reported, never fatal.
pub fn attach_descriptors(
    sets: &mut [MediaSet],
    resolver: &VariantResolver,
    files: &dyn FileOperations,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for set in sets.iter_mut() {
        let descriptor_paths: Vec<PathBuf> = set
            .files_of_kind(MediaKind::Descriptor)
            .map(|f| f.path.clone())
            .collect();

        let videos: Vec<PathBuf> = set
            .files
            .iter()
            .filter(|f| f.kind.is_video())
            .map(|f| f.path.clone())
            .collect();

        for video in videos {
            let expected = match resolver.resolve_descriptor_name(&video) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(path = %video.display(), error = %e, "cannot derive descriptor name");
                    diagnostics.push(Diagnostic::new(video.clone(), e.to_string()));
                    continue;
                }
            };
            if set.descriptor.is_some() {
                continue;
            }
            let expected_key = variant::fold(&expected.to_string_lossy());
            let Some(found) = descriptor_paths
                .iter()
                .find(|p| variant::fold(&p.to_string_lossy()) == expected_key)
            else {
                continue;
            };
            match descriptor::read_descriptor(found, files) {
                Ok(Some(d)) => set.descriptor = Some(d),
                Ok(None) => diagnostics.push(Diagnostic::new(found.clone(), "not a recognized descriptor, ignored")),
                Err(e) => diagnostics.push(Diagnostic::new(found.clone(), e.to_string())),
            }
        }
    }
}
