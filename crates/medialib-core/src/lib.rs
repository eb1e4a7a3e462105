pub mod artwork;
pub mod cancel;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod fileops;
pub mod grouping;
pub mod integrator;
pub mod media;
pub mod metadata;
pub mod purpose;
pub mod report;
pub mod scan;
pub mod target_path;
pub mod variant;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rayon::prelude::*;

pub use artwork::{HeaderProbe, ImageProbe};
pub use cancel::{CancellationToken, CancelledError};
pub use config::{load_settings, Settings, ValidatedSettings};
pub use error::ConfigError;
pub use fileops::{FileOperations, LocalFileOperations};
pub use metadata::{CommandRunner, ToolRunner};
pub use report::{Outcome, RunReport, SetReport};

use artwork::PosterFanartSelector;
use grouping::MediaSet;
use integrator::{IntegratorOptions, MediaIntegrator};
use metadata::MetadataExtractor;
use variant::VariantResolver;

/// Progress sink: `(stage, current, total, message)`.
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter, emits at most every 200ms or on completion.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        let start = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        Self {
            inner,
            last_emit: Mutex::new(start),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed() < Duration::from_millis(200) {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Collaborators of one run. Built once by the caller and shared by every
/// media set.
pub struct RunContext<'a> {
    pub runner: &'a dyn ToolRunner,
    pub files: &'a dyn FileOperations,
    pub probe: &'a dyn ImageProbe,
    pub cancel_token: Option<CancellationToken>,
    pub dry_run: bool,
}

impl<'a> RunContext<'a> {
    pub fn new(runner: &'a dyn ToolRunner, files: &'a dyn FileOperations, probe: &'a dyn ImageProbe) -> Self {
        Self {
            runner,
            files,
            probe,
            cancel_token: None,
            dry_run: false,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = Some(token);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel_token.as_ref().map_or(false, |t| t.check().is_err())
    }
}

/// Organize the source directory into the library.
///
/// Only run-level failures are returned as `Err`; every per-set failure is
/// recorded in the report and processing continues with the next set.
pub fn run(settings: &ValidatedSettings, ctx: &RunContext, progress: &ProgressCallback) -> Result<RunReport, ConfigError> {
    let tp = ThrottledProgress::new(progress);
    let mut report = RunReport {
        dry_run: ctx.dry_run,
        ..RunReport::default()
    };

    // Stage 1: scan
    let files = scan::scan_source_directory(&settings.source_directory_path)?;
    tp.report("scan", 0, 1, &format!("{} files", files.len()));

    // Stage 2: group and attach descriptors
    let resolver = VariantResolver::new(settings.variant_suffixes.clone());
    let mut grouping = grouping::group_media_sets(&files, &resolver);
    grouping::attach_descriptors(&mut grouping.sets, &resolver, ctx.files, &mut grouping.diagnostics);
    report.diagnostics = grouping.diagnostics;
    tp.report("group", 0, 1, &format!("{} media sets", grouping.sets.len()));

    // Stage 3: integrate each set
    let extractor = MetadataExtractor::new(
        ctx.runner,
        settings.ffmpeg.to_string_lossy(),
        settings.ffprobe.to_string_lossy(),
    );
    let integrator = MediaIntegrator::new(
        extractor,
        ctx.files,
        PosterFanartSelector::new(ctx.probe),
        IntegratorOptions {
            library_root: Some(settings.library_path.clone()),
            banner_file_postfix: settings.banner_file_postfix.clone(),
            dry_run: ctx.dry_run,
        },
    );

    let total = grouping.sets.len() as u64;
    let counter = AtomicU64::new(0);
    let process = |set: &MediaSet| -> SetReport {
        let set_report = if ctx.is_cancelled() {
            SetReport::skipped(&set.title, "cancelled")
        } else {
            integrate_set(set, &resolver, &integrator)
        };
        let current = counter.fetch_add(1, Ordering::Relaxed);
        tp.report("integrate", current, total, &set.title);
        set_report
    };

    report.sets = if settings.workers > 1 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.workers)
            .build()
            .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
        pool.install(|| grouping.sets.par_iter().map(process).collect())
    } else {
        grouping.sets.iter().map(process).collect()
    };
    report.cancelled = ctx.is_cancelled();

    tracing::info!(
        done = report.count(Outcome::Done),
        partial = report.count(Outcome::PartiallyDone),
        skipped = report.count(Outcome::Skipped),
        failed = report.count(Outcome::Error),
        cancelled = report.cancelled,
        "run finished"
    );
    Ok(report)
}

fn integrate_set(set: &MediaSet, resolver: &VariantResolver, integrator: &MediaIntegrator) -> SetReport {
    let Some(files) = purpose::select_local_media_server_files(set, resolver) else {
        tracing::warn!(title = %set.title, "no primary video in media set, skipping");
        return SetReport::skipped(&set.title, no_primary_video_reason(set));
    };

    let alternate = match resolver.find_alternate_variant(&files.video, &set.paths()) {
        Ok(found) => found.map(|v| v.path().to_path_buf()),
        Err(e) => {
            tracing::debug!(title = %set.title, error = %e, "alternate variant lookup failed");
            None
        }
    };

    let mut set_report = integrator.integrate(set, files).into_report(&set.title);
    set_report.alternate_variant = alternate;
    set_report
}

/// Images of a set without a video are never placed; name them so they
/// can be moved by hand, e.g. after a rerun of a partially done set.
fn no_primary_video_reason(set: &MediaSet) -> String {
    let images: Vec<&str> = set
        .files_of_kind(media::MediaKind::Image)
        .map(|f| media::file_name(&f.path))
        .collect();
    if images.is_empty() {
        return "no primary video".to_string();
    }
    format!("no primary video, images left in source: {}", images.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileOperationError;
    use crate::fileops::MoveOutcome;
    use crate::media::tests::ftyp;
    use crate::metadata::tests::ScriptedRunner;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    const DESCRIPTOR: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<media type="Other">
  <title>2023-05-01 Hochzeit</title>
  <album>Familie</album>
</media>"#;

    fn populate(source: &Path) {
        fs::write(source.join("2023-05-01 Hochzeit-Medienserver.mp4"), ftyp(b"mp42")).unwrap();
        fs::write(source.join("2023-05-01 Hochzeit-Medienserver.mov"), ftyp(b"qt  ")).unwrap();
        image::RgbImage::new(30, 40)
            .save(source.join("2023-05-01 Hochzeit.jpg"))
            .unwrap();
        fs::write(source.join("2023-05-01 Hochzeit.xml"), DESCRIPTOR).unwrap();
        fs::write(source.join("Ferien-Internet.mov"), ftyp(b"qt  ")).unwrap();
        fs::write(source.join("Notizen.txt"), "erledigen").unwrap();
    }

    fn settings(root: &Path, workers: usize) -> ValidatedSettings {
        let library = root.join("library");
        let source = root.join("export");
        fs::create_dir_all(&library).unwrap();
        fs::create_dir_all(&source).unwrap();
        Settings {
            library_path: Some(library),
            source_directory_path: Some(source),
            variant_suffixes: vec!["-Medienserver".to_string(), "-Internet".to_string()],
            banner_file_postfix: Some("-fanart".to_string()),
            workers,
            ..Settings::default()
        }
        .validate_with(|name| Ok(PathBuf::from(name)))
        .unwrap()
    }

    fn no_progress() -> Box<ProgressCallback> {
        Box::new(|_: &str, _: u64, _: u64, _: &str| {})
    }

    #[test]
    fn test_run_end_to_end() {
        let dir = tempdir().unwrap();
        let settings = settings(dir.path(), 1);
        populate(&settings.source_directory_path);

        let runner = ScriptedRunner::default();
        let ctx = RunContext::new(&runner, &LocalFileOperations, &HeaderProbe);
        let progress = no_progress();
        let report = run(&settings, &ctx, progress.as_ref()).unwrap();

        assert_eq!(report.sets.len(), 2);
        let hochzeit = &report.sets[0];
        assert_eq!(hochzeit.title, "2023-05-01 Hochzeit");
        assert_eq!(hochzeit.outcome, Outcome::Done);
        assert_eq!(
            hochzeit.alternate_variant.as_deref(),
            Some(settings.source_directory_path.join("2023-05-01 Hochzeit-Medienserver.mov").as_path())
        );
        assert_eq!(hochzeit.moved.len(), 2);
        assert!(hochzeit.moved.iter().all(|m| m.outcome == MoveOutcome::Moved));

        // album comes from the descriptor, the ffprobe tag is absent
        let target_dir = settings.library_path.join("Familie/2023/2023-05-01");
        assert!(target_dir.join("Hochzeit.mp4").is_file());
        assert!(target_dir.join("2023-05-01 Hochzeit.jpg").is_file());

        let ferien = &report.sets[1];
        assert_eq!(ferien.outcome, Outcome::Skipped);
        assert_eq!(ferien.reason.as_deref(), Some("no primary video"));

        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.diagnostics[0].path.ends_with("Notizen.txt"));
        assert!(report.is_success());
    }

    #[test]
    fn test_run_parallel_keeps_order() {
        let dir = tempdir().unwrap();
        let settings = settings(dir.path(), 3);
        let source = &settings.source_directory_path;
        for name in ["A", "B", "C", "D"] {
            fs::write(source.join(format!("2020-01-01 {name}-Internet.mp4")), ftyp(b"isom")).unwrap();
        }

        let runner = ScriptedRunner::default().with_field("album", "Reisen");
        let ctx = RunContext::new(&runner, &LocalFileOperations, &HeaderProbe);
        let progress = no_progress();
        let report = run(&settings, &ctx, progress.as_ref()).unwrap();

        let titles: Vec<&str> = report.sets.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["2020-01-01 A", "2020-01-01 B", "2020-01-01 C", "2020-01-01 D"]);
        assert_eq!(report.count(Outcome::Done), 4);
        assert!(settings.library_path.join("Reisen/2020/2020-01-01/D.mp4").is_file());
    }

    #[test]
    fn test_run_cancelled_skips_everything() {
        let dir = tempdir().unwrap();
        let settings = settings(dir.path(), 1);
        populate(&settings.source_directory_path);

        let token = CancellationToken::new();
        token.cancel();
        let runner = ScriptedRunner::default();
        let ctx = RunContext::new(&runner, &LocalFileOperations, &HeaderProbe).with_cancel_token(token);
        let progress = no_progress();
        let report = run(&settings, &ctx, progress.as_ref()).unwrap();

        assert!(report.cancelled);
        assert!(report.sets.iter().all(|s| s.outcome == Outcome::Skipped));
        assert!(runner.calls.lock().unwrap().is_empty());
        assert!(fs::read_dir(&settings.library_path).unwrap().next().is_none());
    }

    #[test]
    fn test_run_dry_run_touches_nothing() {
        let dir = tempdir().unwrap();
        let settings = settings(dir.path(), 1);
        populate(&settings.source_directory_path);

        let runner = ScriptedRunner::default();
        let ctx = RunContext::new(&runner, &LocalFileOperations, &HeaderProbe).with_dry_run(true);
        let progress = no_progress();
        let report = run(&settings, &ctx, progress.as_ref()).unwrap();

        assert!(report.dry_run);
        assert_eq!(
            report.sets[0].planned_target,
            Some(settings.library_path.join("Familie/2023/2023-05-01/Hochzeit.mp4"))
        );
        assert!(fs::read_dir(&settings.library_path).unwrap().next().is_none());
        assert!(settings
            .source_directory_path
            .join("2023-05-01 Hochzeit-Medienserver.mp4")
            .is_file());
    }

    /// Local moves, except that images cannot be written.
    struct ReadOnlyImages;

    impl FileOperations for ReadOnlyImages {
        fn move_file(&self, src: &Path, dst: &Path) -> Result<MoveOutcome, FileOperationError> {
            if media::classify(src) == media::MediaKind::Image {
                return Err(FileOperationError::Io {
                    op: "move",
                    path: dst.to_path_buf(),
                    message: "read-only file system".to_string(),
                });
            }
            LocalFileOperations.move_file(src, dst)
        }

        fn copy_file(&self, src: &Path, dst: &Path, overwrite: bool) -> Result<(), FileOperationError> {
            LocalFileOperations.copy_file(src, dst, overwrite)
        }

        fn create_directory(&self, path: &Path) -> Result<(), FileOperationError> {
            LocalFileOperations.create_directory(path)
        }

        fn read_file(&self, path: &Path) -> Result<String, FileOperationError> {
            LocalFileOperations.read_file(path)
        }
    }

    #[test]
    fn test_rerun_after_partial_run_skips_leftover_images() {
        let dir = tempdir().unwrap();
        let settings = settings(dir.path(), 1);
        let source = &settings.source_directory_path;
        fs::write(source.join("2023-05-01 Fest-Medienserver.mp4"), ftyp(b"mp42")).unwrap();
        image::RgbImage::new(30, 40).save(source.join("2023-05-01 Fest.jpg")).unwrap();
        let runner = ScriptedRunner::default();
        let progress = no_progress();

        let first = run(&settings, &RunContext::new(&runner, &ReadOnlyImages, &HeaderProbe), progress.as_ref()).unwrap();
        assert_eq!(first.sets.len(), 1);
        assert_eq!(first.sets[0].outcome, Outcome::PartiallyDone);
        let target_dir = settings.library_path.join("2023/2023-05-01");
        assert!(target_dir.join("Fest.mp4").is_file());

        // the rescan sees only the image, so the set has no video any more
        let second = run(&settings, &RunContext::new(&runner, &LocalFileOperations, &HeaderProbe), progress.as_ref()).unwrap();
        assert_eq!(second.sets.len(), 1);
        let leftover = &second.sets[0];
        assert_eq!(leftover.title, "2023-05-01 Fest");
        assert_eq!(leftover.outcome, Outcome::Skipped);
        assert_eq!(
            leftover.reason.as_deref(),
            Some("no primary video, images left in source: 2023-05-01 Fest.jpg")
        );
        assert!(source.join("2023-05-01 Fest.jpg").is_file());
        assert!(!target_dir.join("2023-05-01 Fest.jpg").exists());
    }

    #[test]
    fn test_throttled_progress_always_emits_completion() {
        let calls = std::sync::Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let callback = move |stage: &str, current: u64, total: u64, _: &str| {
            sink.lock().unwrap().push((stage.to_string(), current, total));
        };
        let tp = ThrottledProgress::new(&callback);
        for i in 0..10 {
            tp.report("integrate", i, 10, "");
        }
        let calls = calls.lock().unwrap();
        assert_eq!(calls.first(), Some(&("integrate".to_string(), 0, 10)));
        assert_eq!(calls.last(), Some(&("integrate".to_string(), 9, 10)));
        assert!(calls.len() < 10);
    }
}
