use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use medialib_core::descriptor::{discover_descriptors, Descriptor};
use medialib_core::metadata::MetadataExtractor;
use medialib_core::report::write_report_json;
use medialib_core::{
    CancellationToken, CommandRunner, HeaderProbe, LocalFileOperations, Outcome, RunContext, RunReport, Settings,
};

#[derive(Parser)]
#[command(name = "medialib", version, about = "Organize exported video productions into a media library")]
struct Cli {
    /// Settings file (default: ./medialib.toml or ~/.config/medialib/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the media sets of the source directory into the library
    Run(RunArgs),
    /// Print a descriptor XML built from a video's embedded tags
    Describe {
        /// Video file to inspect
        file: PathBuf,

        /// Write the XML to this path instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List the descriptor files of a directory (default: the source directory)
    Descriptors {
        dir: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Library root directory
    #[arg(long, env = "MEDIALIB_LIBRARY_PATH")]
    library_path: Option<PathBuf>,

    /// Directory holding the exported files
    #[arg(long, env = "MEDIALIB_SOURCE_DIRECTORY_PATH")]
    source_directory_path: Option<PathBuf>,

    /// Variant suffix, highest priority first (repeatable)
    #[arg(long = "variant-suffix")]
    variant_suffixes: Vec<String>,

    /// File name postfix of the fanart image
    #[arg(long, env = "MEDIALIB_BANNER_FILE_POSTFIX")]
    banner_file_postfix: Option<String>,

    #[arg(long)]
    ffmpeg: Option<String>,

    #[arg(long)]
    ffprobe: Option<String>,

    /// Media sets processed in parallel
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write the run report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Resolve targets without moving anything
    #[arg(long)]
    dry_run: bool,
}

impl RunArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(path) = self.library_path {
            settings.library_path = Some(path);
        }
        if let Some(path) = self.source_directory_path {
            settings.source_directory_path = Some(path);
        }
        if !self.variant_suffixes.is_empty() {
            settings.variant_suffixes = self.variant_suffixes;
        }
        if let Some(postfix) = self.banner_file_postfix {
            settings.banner_file_postfix = Some(postfix);
        }
        if let Some(ffmpeg) = self.ffmpeg {
            settings.ffmpeg = ffmpeg;
        }
        if let Some(ffprobe) = self.ffprobe {
            settings.ffprobe = ffprobe;
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
        }
        if let Some(report) = self.report {
            settings.report_path = Some(report);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("medialib=debug,medialib_core=debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut settings = medialib_core::load_settings(cli.config.as_deref())?;
    tracing::debug!(?settings, "loaded settings");
    match cli.command {
        Commands::Run(args) => {
            let dry_run = args.dry_run;
            args.apply(&mut settings);
            run(&settings, dry_run)
        }
        Commands::Describe { file, output } => describe(&settings, &file, output.as_deref()),
        Commands::Descriptors { dir } => list_descriptors(&settings, dir),
    }
}

fn run(settings: &Settings, dry_run: bool) -> anyhow::Result<()> {
    let t_total = std::time::Instant::now();
    let validated = settings.validate()?;
    tracing::info!(
        source = %validated.source_directory_path.display(),
        library = %validated.library_path.display(),
        workers = validated.workers,
        dry_run,
        "starting run"
    );

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("cancelling after the current media set");
        handler_token.cancel();
    })
    .context("failed to install Ctrl-C handler")?;

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}")?);

    let runner = CommandRunner;
    let ctx = RunContext::new(&runner, &LocalFileOperations, &HeaderProbe)
        .with_cancel_token(token)
        .with_dry_run(dry_run);
    let progress_pb = pb.clone();
    let report = medialib_core::run(&validated, &ctx, &move |stage, current, total, message| {
        let pb = &progress_pb;
        if stage == "integrate" {
            pb.set_length(total);
            pb.set_position(current + 1);
            pb.set_message(message.to_string());
        } else {
            pb.println(format!("[{stage}] {message}"));
        }
    })?;
    pb.finish_and_clear();

    print_report(&report);

    if let Some(path) = settings.report_path.as_deref() {
        write_report_json(&report, path).with_context(|| format!("failed to write report {}", path.display()))?;
        eprintln!("Report written to {}", path.display());
    }

    eprintln!(
        "Done! {} done, {} partially done, {} skipped, {} failed, {} files moved ({:.2}s)",
        report.count(Outcome::Done),
        report.count(Outcome::PartiallyDone),
        report.count(Outcome::Skipped),
        report.count(Outcome::Error),
        report.files_moved(),
        t_total.elapsed().as_secs_f64()
    );

    if report.cancelled {
        anyhow::bail!("run cancelled");
    }
    if !report.is_success() {
        anyhow::bail!("{} media sets failed", report.count(Outcome::Error));
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    for set in &report.sets {
        let label = match set.outcome {
            Outcome::Done if report.dry_run => "planned",
            Outcome::Done => "done",
            Outcome::PartiallyDone => "partial",
            Outcome::Skipped => "skipped",
            Outcome::Error => "error",
        };
        println!("{label:<8} {}", set.title);
        if let Some(target) = &set.planned_target {
            println!("         -> {}", target.display());
        }
        for moved in &set.moved {
            println!("         {} -> {}", moved.source.display(), moved.target.display());
        }
        if let Some(alternate) = &set.alternate_variant {
            println!("         alternate variant: {}", alternate.display());
        }
        for ignored in &set.ignored_images {
            println!("         ignored image: {}", ignored.display());
        }
        match (set.stage, &set.reason) {
            (Some(stage), Some(reason)) => println!("         {stage} stage: {reason}"),
            (None, Some(reason)) => println!("         {reason}"),
            _ => {}
        }
    }
    for diagnostic in &report.diagnostics {
        println!("skipped  {}: {}", diagnostic.path.display(), diagnostic.message);
    }
}

fn describe(settings: &Settings, file: &Path, output: Option<&Path>) -> anyhow::Result<()> {
    let runner = CommandRunner;
    let extractor = MetadataExtractor::new(&runner, settings.ffmpeg.as_str(), settings.ffprobe.as_str());
    let descriptor = Descriptor::from_video(&extractor, file)
        .with_context(|| format!("failed to read metadata of {}", file.display()))?
        .with_context(|| format!("{} has no title tag", file.display()))?;
    let xml = descriptor.to_xml()?;

    match output {
        Some(path) => {
            std::fs::write(path, &xml).with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("Descriptor written to {}", path.display());
        }
        None => print!("{xml}"),
    }
    Ok(())
}

fn list_descriptors(settings: &Settings, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir
        .or_else(|| settings.source_directory_path.clone())
        .context("no directory given and no source_directory_path configured")?;
    let found = discover_descriptors(&dir, &LocalFileOperations)?;
    for file in &found {
        let d = &file.descriptor;
        let published = d.published.map(|p| p.to_string()).unwrap_or_default();
        println!(
            "{:<10} {:<20} {}  ({})",
            published,
            d.album.as_deref().unwrap_or("-"),
            d.title,
            file.path.display()
        );
    }
    eprintln!("{} descriptor files in {}", found.len(), dir.display());
    Ok(())
}
