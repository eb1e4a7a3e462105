use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::artwork::{Artwork, PosterFanartSelector};
use crate::error::{IntegrationError, IntegrationErrorKind, Stage};
use crate::fileops::FileOperations;
use crate::grouping::MediaSet;
use crate::media::SupportedImage;
use crate::metadata::MetadataExtractor;
use crate::purpose::LocalMediaServerFiles;
use crate::report::{MovedFile, Outcome, SetReport};
use crate::target_path::{recording_date_from_title, resolve_target_path, sanitize_segment};

#[derive(Debug, Clone, Default)]
pub struct IntegratorOptions {
    pub library_root: Option<PathBuf>,
    pub banner_file_postfix: Option<String>,
    /// Resolve targets without touching the filesystem.
    pub dry_run: bool,
}

/// Files of a set after integration, at their final locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integration {
    pub files: LocalMediaServerFiles,
    pub moved: Vec<MovedFile>,
    pub ignored_images: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum SetOutcome {
    Done(Integration),
    PartiallyDone {
        integration: Integration,
        error: IntegrationError,
    },
    /// Dry run: where the video would go.
    Planned { target: PathBuf },
    Error(IntegrationError),
}

impl SetOutcome {
    pub fn into_report(self, title: &str) -> SetReport {
        match self {
            SetOutcome::Done(integration) => {
                let mut report = SetReport::new(title, Outcome::Done);
                report.moved = integration.moved;
                report.ignored_images = integration.ignored_images;
                report
            }
            SetOutcome::PartiallyDone { integration, error } => {
                let mut report = SetReport::new(title, Outcome::PartiallyDone);
                report.stage = Some(error.stage);
                report.reason = Some(error.kind.to_string());
                report.moved = integration.moved;
                report.ignored_images = integration.ignored_images;
                report
            }
            SetOutcome::Planned { target } => {
                let mut report = SetReport::new(title, Outcome::Done);
                report.planned_target = Some(target);
                report
            }
            SetOutcome::Error(error) => {
                let mut report = SetReport::new(title, Outcome::Error);
                report.stage = Some(error.stage);
                report.reason = Some(error.kind.to_string());
                report
            }
        }
    }
}

struct ResolvedMetadata {
    album: Option<String>,
    date: Option<NaiveDate>,
}

/// Moves one media set into the library.
///
/// Stages run in order: metadata, target path, target directory, video move,
/// images. Any failure before the video is moved ends the set with an error
/// and leaves the source untouched. Once the video has moved nothing is
/// rolled back; an image failure downgrades the set to partially done.
pub struct MediaIntegrator<'a> {
    extractor: MetadataExtractor<'a>,
    files: &'a dyn FileOperations,
    selector: PosterFanartSelector<'a>,
    options: IntegratorOptions,
}

impl<'a> MediaIntegrator<'a> {
    pub fn new(
        extractor: MetadataExtractor<'a>,
        files: &'a dyn FileOperations,
        selector: PosterFanartSelector<'a>,
        options: IntegratorOptions,
    ) -> Self {
        Self {
            extractor,
            files,
            selector,
            options,
        }
    }

    pub fn integrate(&self, set: &MediaSet, files: LocalMediaServerFiles) -> SetOutcome {
        let metadata = match self.resolve_metadata(set, &files) {
            Ok(m) => m,
            Err(e) => return SetOutcome::Error(e),
        };

        let target = match resolve_target_path(
            self.options.library_root.as_deref(),
            metadata.album.as_deref(),
            metadata.date,
            &set.title,
            &files.video.extension(),
        ) {
            Ok(t) => t,
            Err(e) => return SetOutcome::Error(IntegrationError::new(Stage::PathResolved, e)),
        };
        tracing::debug!(title = %set.title, target = %target.display(), "resolved target path");

        if self.options.dry_run {
            return SetOutcome::Planned { target };
        }

        let Some(target_dir) = target.parent() else {
            return SetOutcome::Error(IntegrationError::new(
                Stage::PathResolved,
                IntegrationErrorKind::Configuration(format!("target {} has no parent directory", target.display())),
            ));
        };
        if let Err(e) = self.files.create_directory(target_dir) {
            return SetOutcome::Error(IntegrationError::new(Stage::DirectoryEnsured, e));
        }

        let video_outcome = match self.files.move_file(files.video.path(), &target) {
            Ok(o) => o,
            Err(e) => return SetOutcome::Error(IntegrationError::new(Stage::VideoMoved, e)),
        };
        tracing::info!(
            source = %files.video.path().display(),
            target = %target.display(),
            outcome = ?video_outcome,
            "moved video"
        );

        let mut integration = Integration {
            files: LocalMediaServerFiles {
                video: files.video.relocated(target.clone()),
                images: Vec::new(),
            },
            moved: vec![MovedFile {
                source: files.video.path().to_path_buf(),
                target: target.clone(),
                outcome: video_outcome,
            }],
            ignored_images: Vec::new(),
        };

        // images keep the full set title, date prefix included
        let base_name = sanitize_segment(&set.title);
        match self.move_images(&files.images, target_dir, &base_name, &mut integration) {
            Ok(images) => {
                integration.files.images = images;
                SetOutcome::Done(integration)
            }
            Err(error) => {
                tracing::warn!(title = %set.title, error = %error, "images not integrated, video kept in library");
                SetOutcome::PartiallyDone { integration, error }
            }
        }
    }

    fn resolve_metadata(&self, set: &MediaSet, files: &LocalMediaServerFiles) -> Result<ResolvedMetadata, IntegrationError> {
        let tagged_album = self
            .extractor
            .album(files.video.path())
            .map_err(|e| IntegrationError::new(Stage::MetadataResolved, e))?;
        let descriptor = set.descriptor.as_ref();
        let album = tagged_album.or_else(|| descriptor.and_then(|d| d.album.clone()));
        let date = recording_date_from_title(&set.title).or_else(|| descriptor.and_then(|d| d.published));

        tracing::debug!(title = %set.title, album = ?album, date = ?date, "resolved metadata");
        Ok(ResolvedMetadata { album, date })
    }

    /// Move the set's images next to the video. Returns the moved images at
    /// their new locations.
    fn move_images(
        &self,
        images: &[SupportedImage],
        target_dir: &Path,
        base_name: &str,
        integration: &mut Integration,
    ) -> Result<Vec<SupportedImage>, IntegrationError> {
        let Some(artwork) = self.selector.select(images) else {
            tracing::debug!(base_name, "no images to move");
            return Ok(Vec::new());
        };

        match artwork {
            Artwork::Poster(poster) => {
                let poster = self.move_image(&poster, target_dir.join(format!("{base_name}{}", poster.extension())), integration)?;
                Ok(vec![poster])
            }
            Artwork::PosterAndFanart { poster, fanart, ignored } => {
                integration.ignored_images = ignored.iter().map(|i| i.path().to_path_buf()).collect();
                let banner = self
                    .options
                    .banner_file_postfix
                    .as_deref()
                    .filter(|b| !b.trim().is_empty())
                    .ok_or_else(|| {
                        IntegrationError::new(
                            Stage::ImagesResolved,
                            IntegrationErrorKind::Configuration("banner file postfix is not configured".to_string()),
                        )
                    })?;
                let poster = self.move_image(&poster, target_dir.join(format!("{base_name}{}", poster.extension())), integration)?;
                let fanart = self.move_image(
                    &fanart,
                    target_dir.join(format!("{base_name}{banner}{}", fanart.extension())),
                    integration,
                )?;
                Ok(vec![poster, fanart])
            }
        }
    }

    fn move_image(
        &self,
        image: &SupportedImage,
        target: PathBuf,
        integration: &mut Integration,
    ) -> Result<SupportedImage, IntegrationError> {
        let outcome = self
            .files
            .move_file(image.path(), &target)
            .map_err(|e| IntegrationError::new(Stage::ImagesResolved, e))?;
        tracing::info!(source = %image.path().display(), target = %target.display(), "moved image");
        integration.moved.push(MovedFile {
            source: image.path().to_path_buf(),
            target: target.clone(),
            outcome,
        });
        Ok(image.relocated(target))
    }
}
