use serde::Serialize;

use crate::grouping::MediaSet;
use crate::media::{self, MediaKind, SupportedImage, SupportedVideo};
use crate::variant::VariantResolver;

/// The part of a media set that goes into the library: one video and its
/// cover images. Paths are updated as files are moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalMediaServerFiles {
    pub video: SupportedVideo,
    pub images: Vec<SupportedImage>,
}

/// Pick the primary-format video with the highest-priority variant suffix
/// (first listed on ties) and every image of the set. `None` when the set
/// has no primary-format video.
pub fn select_local_media_server_files(set: &MediaSet, resolver: &VariantResolver) -> Option<LocalMediaServerFiles> {
    let video = set
        .files_of_kind(MediaKind::PrimaryVideo)
        .filter_map(|f| SupportedVideo::create(f.path.clone()))
        .filter(SupportedVideo::is_primary)
        .enumerate()
        .min_by_key(|(position, v)| {
            let priority = resolver
                .suffix_priority(media::file_stem(v.path()))
                .unwrap_or(usize::MAX);
            (priority, *position)
        })
        .map(|(_, v)| v)?;

    let images = set
        .files_of_kind(MediaKind::Image)
        .filter_map(|f| SupportedImage::create(f.path.clone()))
        .collect();

    Some(LocalMediaServerFiles { video, images })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::group_media_sets;
    use std::path::PathBuf;

    fn resolver() -> VariantResolver {
        VariantResolver::new(vec!["-Medienserver".to_string(), "-Internet".to_string()])
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from("/in").join(n)).collect()
    }

    #[test]
    fn test_highest_priority_primary_wins() {
        let files = paths(&[
            "Film-Internet.mp4",
            "Film.jpg",
            "Film-Medienserver.mp4",
            "Film-Medienserver.mov",
            "Film.png",
        ]);
        let resolver = resolver();
        let grouping = group_media_sets(&files, &resolver);
        let selected = select_local_media_server_files(&grouping.sets[0], &resolver).unwrap();

        assert_eq!(selected.video.path(), PathBuf::from("/in/Film-Medienserver.mp4").as_path());
        let images: Vec<_> = selected.images.iter().map(|i| i.file_name().to_string()).collect();
        assert_eq!(images, vec!["Film.jpg", "Film.png"]);
    }

    #[test]
    fn test_unsuffixed_primary_comes_last() {
        let files = paths(&["Film.mp4", "Film-Internet.m4v"]);
        let resolver = resolver();
        let grouping = group_media_sets(&files, &resolver);
        let selected = select_local_media_server_files(&grouping.sets[0], &resolver).unwrap();
        assert_eq!(selected.video.file_name(), "Film-Internet.m4v");
        assert!(selected.images.is_empty());
    }

    #[test]
    fn test_no_primary_video() {
        let files = paths(&["Film-Medienserver.mov", "Film.jpg"]);
        let resolver = resolver();
        let grouping = group_media_sets(&files, &resolver);
        assert!(select_local_media_server_files(&grouping.sets[0], &resolver).is_none());
    }
}
