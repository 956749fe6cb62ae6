//! innervation: batch measurement of innervation indices from the command line.
//!
//! `analyze` runs every image through the same adjustments, ROI and
//! threshold, saving one row per image to a results file. `summarize`
//! reads results files back and prints per-file statistics, or with
//! `--group` treats each file as one animal and compares groups.
//!
//! # Usage
//!
//! ```text
//! innervation analyze --roi "10,10 200,10 200,180 10,180" --output results.txt slides/*.tif
//! innervation summarize control/*.txt
//! innervation summarize --group Control=c1.txt,c2.txt,c3.txt --group CFA=f1.txt,f2.txt,f3.txt
//! ```
//!
//! Logging goes to stderr and honors `RUST_LOG` (default `warn`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod args;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use innervation_export::{BatchSummary, ExportError, GroupSummary, OneWayAnova, parse_results};
use innervation_pipeline::{AdjustmentState, NormalizationParams, RoiPolygon, ThresholdMode};
use innervation_session::{BatchFile, Session, SessionConfig, SessionError};

use crate::args::{GroupArg, RoiArg, parse_group, parse_roi};

/// Innervation index measurement for microscopy images.
#[derive(Parser)]
#[command(name = "innervation", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure every image and write a results file.
    Analyze(AnalyzeArgs),
    /// Print count, mean, SD and SEM for each results file, or compare
    /// groups of files.
    Summarize(SummarizeArgs),
}

#[derive(Args)]
struct AnalyzeArgs {
    /// Images to analyze (PNG, JPEG, BMP, TIFF), in order.
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Contrast factor around mid-gray.
    #[arg(long, default_value_t = AdjustmentState::DEFAULT_CONTRAST)]
    contrast: f32,

    /// Brightness offset in 0-255 units.
    #[arg(long, default_value_t = AdjustmentState::DEFAULT_BRIGHTNESS, allow_negative_numbers = true)]
    brightness: f32,

    /// Gaussian blur radius in pixels (0 disables).
    #[arg(long, default_value_t = AdjustmentState::DEFAULT_BLUR_RADIUS)]
    blur_radius: f32,

    /// Percentile mapped to black.
    #[arg(long, default_value_t = NormalizationParams::DEFAULT_LOW_PERCENTILE)]
    low_percentile: f64,

    /// Percentile mapped to white.
    #[arg(long, default_value_t = NormalizationParams::DEFAULT_HIGH_PERCENTILE)]
    high_percentile: f64,

    /// ROI polygon as "x,y x,y x,y ..." in pixels. Defaults to the whole
    /// image.
    #[arg(long, value_parser = parse_roi, allow_hyphen_values = true)]
    roi: Option<RoiArg>,

    /// Use Otsu's method (the default).
    #[arg(long, conflicts_with = "cutoff")]
    otsu: bool,

    /// Fixed cutoff in 0-255 units instead of Otsu.
    #[arg(long)]
    cutoff: Option<f64>,

    /// Decimal places in the results file.
    #[arg(long, default_value_t = innervation_export::TsvOptions::DEFAULT_PRECISION)]
    precision: usize,

    /// Results file path. Defaults to stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Write a threshold preview PNG per image into this directory.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Print per-image diagnostics as JSON instead of a report.
    #[arg(long)]
    json: bool,

    /// Full session config as a JSON string.
    ///
    /// When provided, the percentile, threshold and precision flags are
    /// ignored. The JSON must be a valid `SessionConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Args)]
struct SummarizeArgs {
    /// Results files written by `analyze` (or compatible).
    #[arg(required_unless_present = "groups")]
    results: Vec<PathBuf>,

    /// A group of results files as `NAME=FILE[,FILE...]`, one file per
    /// animal. Repeat for each group; two or more groups also run a
    /// one-way ANOVA on the per-file means.
    #[arg(long = "group", value_parser = parse_group)]
    groups: Vec<GroupArg>,

    /// Print summaries as JSON.
    #[arg(long)]
    json: bool,
}

/// Build a [`SessionConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and the
/// individual flags are ignored.
fn config_from_args(args: &AnalyzeArgs) -> Result<SessionConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let mut config = SessionConfig::default();
    config.analysis.normalization = NormalizationParams {
        low_percentile: args.low_percentile,
        high_percentile: args.high_percentile,
    };
    config.analysis.threshold = match (args.otsu, args.cutoff) {
        (false, Some(cutoff)) => ThresholdMode::Manual(cutoff),
        _ => ThresholdMode::Automatic,
    };
    config.export.precision = args.precision;
    Ok(config)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Analyze(args) => analyze(&args),
        Command::Summarize(args) => summarize(&args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

fn analyze(args: &AnalyzeArgs) -> Result<(), String> {
    let config = config_from_args(args)?;
    let adjustment = AdjustmentState::new(args.contrast, args.brightness, args.blur_radius)
        .map_err(|e| format!("Error: {e}"))?;

    let files = args
        .images
        .iter()
        .map(|path| {
            std::fs::read(path)
                .map(|bytes| BatchFile::new(identifier_for(path), bytes))
                .map_err(|e| format!("Error reading {}: {e}", path.display()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(ref dir) = args.overlay_dir {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("Error creating {}: {e}", dir.display()))?;
    }

    let mut session = Session::new(config).map_err(|e| format!("Error: {e}"))?;
    session
        .load_batch(files)
        .map_err(|e| format!("Error: {e}"))?;

    while session.state().has_image() {
        measure_current(&mut session, args, &adjustment)?;
    }

    for failure in session.decode_failures() {
        eprintln!("Skipped {}: {}", failure.identifier, failure.message);
    }

    let tsv = session.export_results();
    match args.output {
        Some(ref path) => {
            std::fs::write(path, &tsv)
                .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
            eprintln!(
                "Results written to {} ({} rows)",
                path.display(),
                session.results().len()
            );
        }
        None => print!("{tsv}"),
    }
    Ok(())
}

/// Run one image through adjust -> ROI -> calculate -> save.
///
/// Images whose ROI ends up empty are skipped with a warning instead of
/// aborting the batch.
fn measure_current(
    session: &mut Session,
    args: &AnalyzeArgs,
    adjustment: &AdjustmentState,
) -> Result<(), String> {
    let identifier = session.current_identifier().unwrap_or_default().to_owned();
    let fail = |e: SessionError| format!("Error analyzing {identifier}: {e}");

    if !adjustment.is_identity() {
        session
            .set_adjustment(adjustment.contrast, adjustment.brightness, adjustment.blur_radius)
            .map_err(fail)?;
    }

    let vertices = match args.roi {
        Some(RoiArg(ref vertices)) => vertices.clone(),
        None => {
            let dims = session.dimensions().ok_or_else(|| fail(SessionError::NoImage))?;
            RoiPolygon::full_image(dims).vertices().to_vec()
        }
    };
    session.start_roi().map_err(fail)?;
    for v in &vertices {
        session.add_roi_vertex(v.x, v.y).map_err(fail)?;
    }
    session.finish_roi().map_err(fail)?;

    let diagnostics = match session.calculate() {
        Ok(calculation) => calculation.diagnostics.clone(),
        Err(SessionError::EmptyRoi) => {
            eprintln!("Skipped {identifier}: ROI contains no pixels");
            session.skip().map_err(fail)?;
            return Ok(());
        }
        Err(e) => return Err(fail(e)),
    };

    if args.json {
        let json = serde_json::to_string_pretty(&diagnostics)
            .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
        println!("{json}");
    } else {
        eprintln!("{}\n", diagnostics.report());
    }

    if let Some(ref dir) = args.overlay_dir {
        let preview = session.threshold_preview().map_err(fail)?;
        let path = dir.join(overlay_name(&identifier));
        preview
            .save_with_format(&path, image::ImageFormat::Png)
            .map_err(|e| format!("Error writing {}: {e}", path.display()))?;
        log::info!("overlay written to {}", path.display());
    }

    session.save().map_err(fail)?;
    Ok(())
}

fn summarize(args: &SummarizeArgs) -> Result<(), String> {
    if !args.results.is_empty() {
        summarize_files(&args.results, args.json)?;
    }
    if !args.groups.is_empty() {
        summarize_groups(&args.groups, args.json)?;
    }
    Ok(())
}

fn read_values(path: &Path) -> Result<Vec<f64>, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    let parsed =
        parse_results(&text).map_err(|e| format!("Error parsing {}: {e}", path.display()))?;
    Ok(parsed.values())
}

fn summarize_files(paths: &[PathBuf], json: bool) -> Result<(), String> {
    let mut summaries = Vec::with_capacity(paths.len());
    for path in paths {
        let summary = BatchSummary::from_values(&read_values(path)?)
            .map_err(|e| format!("Error summarizing {}: {e}", path.display()))?;
        summaries.push((path.display().to_string(), summary));
    }

    if json {
        let json = serde_json::to_string_pretty(&summaries)
            .map_err(|e| format!("Error serializing summaries: {e}"))?;
        println!("{json}");
    } else {
        for (name, summary) in &summaries {
            println!("{name}\t{}", summary.report());
        }
    }
    Ok(())
}

/// Mean index of one results file, or `None` if it holds no values.
fn file_mean(path: &Path) -> Result<Option<f64>, String> {
    match BatchSummary::from_values(&read_values(path)?) {
        Ok(summary) => Ok(Some(summary.mean)),
        Err(ExportError::NoValues) => {
            eprintln!("Skipped {}: no index values", path.display());
            Ok(None)
        }
        Err(e) => Err(format!("Error summarizing {}: {e}", path.display())),
    }
}

fn summarize_groups(groups: &[GroupArg], json: bool) -> Result<(), String> {
    let mut summaries = Vec::with_capacity(groups.len());
    for group in groups {
        let mut means = Vec::with_capacity(group.files.len());
        for path in &group.files {
            if let Some(mean) = file_mean(path)? {
                means.push(mean);
            }
        }
        let summary = GroupSummary::new(group.name.clone(), means)
            .map_err(|e| format!("Error in group {}: {e}", group.name))?;
        summaries.push(summary);
    }

    let anova = if summaries.len() >= 2 {
        Some(OneWayAnova::across(&summaries).map_err(|e| format!("Error comparing groups: {e}"))?)
    } else {
        None
    };

    if json {
        let report = serde_json::json!({ "groups": summaries, "anova": anova });
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Error serializing groups: {e}"))?;
        println!("{json}");
    } else {
        for summary in &summaries {
            println!("{}", summary.report());
        }
        if let Some(anova) = anova {
            println!("{}", anova.report());
        }
    }
    Ok(())
}

/// Results-file identifier: the file name, as the user sees it.
fn identifier_for(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Preview file name for an image identifier.
fn overlay_name(identifier: &str) -> String {
    let stem = Path::new(identifier)
        .file_stem()
        .map_or_else(|| identifier.to_owned(), |s| s.to_string_lossy().into_owned());
    format!("{stem}_overlay.png")
}
