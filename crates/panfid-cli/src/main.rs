//! panfid: locate the fiducial marks of a scanned panoramic film frame.
//!
//! Decodes the scan and a reference fiducial image, runs the locator, and
//! prints the fiducial table. Optional outputs:
//!
//! - `--table <path>` writes the plain-text table to a file
//! - `--json` prints JSON instead of the table, `--json-out <path>` writes it
//! - `--overlay <path>` writes a PNG with found marks circled and missing
//!   marks crossed out
//! - `--diagnostics` prints the sweep report to stderr (and embeds it in
//!   the JSON)
//!
//! Exit status: `0` when at least one fiducial was found, `2` when none
//! were, `3` for configuration problems (bad flags, invalid config, or an
//! undecodable pattern), `1` for I/O failures.
//!
//! # Usage
//!
//! ```text
//! panfid [OPTIONS] --pattern <PATTERN> <SCAN_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser, ValueEnum};
use image::DynamicImage;
use panfid_pipeline::diagnostics::{Clock, SweepDiagnostics};
use panfid_pipeline::matcher::{GradientFilter, SurfaceModelKind};
use panfid_pipeline::{
    CentroidKind, FiducialLocator, Interpolator, LocateResult, LocatorConfig, LocatorError,
    MatchAlgorithmKind, MatchConfig, Raster,
};

/// Exit status for unreadable inputs or unwritable outputs.
const EXIT_IO: u8 = 1;

/// Exit status when the sweep measured no fiducial at all.
const EXIT_NO_FIDUCIALS: u8 = 2;

/// Exit status for configuration problems.
const EXIT_CONFIG: u8 = 3;

/// Sub-pixel fiducial mark locator for scanned panoramic film.
///
/// Searches the first-fiducial strip of the scan for the reference mark,
/// then walks the frame column by column measuring every fiducial.
#[derive(Parser)]
#[command(name = "panfid", version)]
struct Cli {
    /// Path to the scanned frame (TIFF, PNG, JPEG, BMP).
    scan_path: PathBuf,

    /// Path to the reference fiducial image.
    #[arg(long)]
    pattern: PathBuf,

    /// Scan resolution in microns per pixel.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_RESOLUTION_MICRONS)]
    resolution: f64,

    /// Image band to read (1-based).
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_BAND)]
    band: usize,

    /// Interpolator for chip loads.
    #[arg(long, value_enum, default_value_t = Interp::Cubic)]
    interpolator: Interp,

    /// Minimum acceptable match score.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Keep whole-pixel match positions.
    #[arg(long)]
    no_subpixel: bool,

    /// Coarse search reduction factor.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_REDUCTION_FACTOR)]
    reduction_factor: usize,

    /// Minimum z-score extremum in the pattern.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_MIN_Z_SCORE)]
    min_z_score: f64,

    /// Minimum percent of valid pattern pixels.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_PATTERN_VALID_PERCENT)]
    pattern_valid_percent: f64,

    /// Minimum percent of valid pixels per subsearch.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_SUBSEARCH_VALID_PERCENT)]
    subsearch_valid_percent: f64,

    /// Side of the sub-pixel surface window (odd, at least 3).
    #[arg(long, default_value_t = MatchConfig::DEFAULT_SURFACE_WINDOW)]
    surface_window: usize,

    /// Largest accepted sub-pixel shift in search-chip cells.
    #[arg(long, default_value_t = MatchConfig::DEFAULT_DISTANCE_TOLERANCE)]
    distance_tolerance: f64,

    /// Filter applied to both chips before scoring.
    #[arg(long, value_enum, default_value_t = Gradient::None)]
    gradient: Gradient,

    /// Match score.
    #[arg(long, value_enum, default_value_t = Algorithm::Correlation)]
    algorithm: Algorithm,

    /// Sub-pixel surface model.
    #[arg(long, value_enum, default_value_t = Surface::Centroid)]
    surface_model: Surface,

    /// Trim play in pixels (derived from the resolution when omitted).
    #[arg(long)]
    play: Option<f64>,

    /// Coverage the adaptive selection aims for, in percent.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_TARGET_SELECTION_PERCENT)]
    target_selection_percent: f64,

    /// Minimum percent of an ellipse interior that must be selected.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_PERCENT_SELECTED)]
    percent_selected: f64,

    /// Consecutive non-improving ellipses before the search stops.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_PATIENCE_LIMIT)]
    patience_limit: usize,

    /// Number of adaptive DN windows tried.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_ADAPTIVE_STEPS)]
    adaptive_steps: usize,

    /// Maximum fit-and-trim rounds per fiducial.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_MAX_TRIM_ROUNDS)]
    max_trim_rounds: usize,

    /// Seed for the ellipse candidate sampler.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// How far, in pixels, the fill seed may move off an out-of-range
    /// centre pixel.
    #[arg(long, default_value_t = LocatorConfig::DEFAULT_SEED_RADIUS)]
    seed_radius: f64,

    /// Lowest DN a fiducial cell may have (pixel-type floor when omitted).
    #[arg(long)]
    min_dn: Option<f64>,

    /// Highest DN a fiducial cell may have.
    #[arg(long)]
    max_dn: Option<f64>,

    /// Adaptive selection variant.
    #[arg(long, value_enum, default_value_t = Window::ApolloPan)]
    centroid: Window,

    /// Full locator config as a JSON string.
    ///
    /// When provided, all other locator parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Write the fiducial table to a file.
    #[arg(long)]
    table: Option<PathBuf>,

    /// Print JSON instead of the plain-text table.
    #[arg(long)]
    json: bool,

    /// Write the JSON document to a file.
    #[arg(long)]
    json_out: Option<PathBuf>,

    /// Print the sweep diagnostics report to stderr and embed the
    /// diagnostics in JSON output.
    #[arg(long)]
    diagnostics: bool,

    /// Write a PNG overlay of the result over the scan.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Marker radius in the overlay, in pixels.
    #[arg(long, default_value_t = 12)]
    overlay_radius: u32,

    /// Raise log verbosity (`-v` info, `-vv` debug). `RUST_LOG` wins.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Chip interpolator selection.
#[derive(Clone, Copy, ValueEnum)]
enum Interp {
    /// Nearest pixel.
    Nearest,
    /// 2x2 bilinear.
    Bilinear,
    /// 4x4 Catmull-Rom.
    Cubic,
}

/// Pre-match filter selection.
#[derive(Clone, Copy, ValueEnum)]
enum Gradient {
    /// Raw DN values.
    None,
    /// Sobel gradient magnitude.
    Sobel,
}

/// Match score selection.
#[derive(Clone, Copy, ValueEnum)]
enum Algorithm {
    /// Maximum absolute correlation.
    Correlation,
    /// Minimum mean absolute difference.
    Difference,
}

/// Sub-pixel surface model selection.
#[derive(Clone, Copy, ValueEnum)]
enum Surface {
    /// Weighted centre of the high-score cells.
    Centroid,
    /// Least-squares quadratic surface.
    Quadratic,
}

/// Adaptive DN window selection.
#[derive(Clone, Copy, ValueEnum)]
enum Window {
    /// Symmetric window around the seed value.
    Generic,
    /// Bright target: threshold lowered from the seed value.
    ApolloPan,
}

/// Build a [`LocatorConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<LocatorConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(LocatorConfig {
        resolution_microns: cli.resolution,
        band: cli.band,
        interpolator: match cli.interpolator {
            Interp::Nearest => Interpolator::Nearest,
            Interp::Bilinear => Interpolator::Bilinear,
            Interp::Cubic => Interpolator::Cubic,
        },
        tolerance: cli.tolerance,
        subpixel_accuracy: !cli.no_subpixel,
        reduction_factor: cli.reduction_factor,
        min_z_score: cli.min_z_score,
        pattern_valid_percent: cli.pattern_valid_percent,
        subsearch_valid_percent: cli.subsearch_valid_percent,
        surface_window: cli.surface_window,
        distance_tolerance: cli.distance_tolerance,
        gradient: match cli.gradient {
            Gradient::None => GradientFilter::None,
            Gradient::Sobel => GradientFilter::Sobel,
        },
        match_algorithm: match cli.algorithm {
            Algorithm::Correlation => MatchAlgorithmKind::MaximumCorrelation,
            Algorithm::Difference => MatchAlgorithmKind::MinimumDifference,
        },
        surface_model: match cli.surface_model {
            Surface::Centroid => SurfaceModelKind::Centroid,
            Surface::Quadratic => SurfaceModelKind::Quadratic,
        },
        play: cli.play,
        target_selection_percent: cli.target_selection_percent,
        percent_selected: cli.percent_selected,
        patience_limit: cli.patience_limit,
        adaptive_steps: cli.adaptive_steps,
        max_trim_rounds: cli.max_trim_rounds,
        ransac_seed: cli.seed,
        seed_radius: cli.seed_radius,
        min_dn: cli.min_dn,
        max_dn: cli.max_dn,
        centroid: match cli.centroid {
            Window::Generic => CentroidKind::Generic,
            Window::ApolloPan => CentroidKind::ApolloPan,
        },
        ..LocatorConfig::default()
    })
}

/// Exit status for a locator error.
fn error_exit_code(err: &LocatorError) -> u8 {
    if err.is_config() {
        EXIT_CONFIG
    } else if matches!(err, LocatorError::NoFirstFiducial { .. }) {
        EXIT_NO_FIDUCIALS
    } else {
        EXIT_IO
    }
}

/// Exit status for a completed sweep: success only if something was found.
fn result_exit_code(result: &LocateResult) -> u8 {
    if result.found_count() > 0 {
        0
    } else {
        EXIT_NO_FIDUCIALS
    }
}

/// Read and decode an image. I/O failures and decode failures are
/// reported separately so the caller can pick the exit status.
fn read_image(path: &Path) -> Result<Result<DynamicImage, String>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    log::info!("read {} ({} bytes)", path.display(), bytes.len());
    Ok(image::load_from_memory(&bytes).map_err(|e| format!("Error decoding {}: {e}", path.display())))
}

fn write_output(path: &Path, contents: &str, what: &str) -> Result<(), String> {
    std::fs::write(path, contents)
        .map_err(|e| format!("Error writing {what} to {}: {e}", path.display()))?;
    eprintln!("{what} written to {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

fn main() -> ExitCode {
    // clap's own exit status for bad flags would collide with EXIT_NO_FIDUCIALS.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let pattern = match read_image(&cli.pattern) {
        Ok(Ok(image)) => Raster::from_dynamic(&image),
        Ok(Err(msg)) => {
            eprintln!("{msg}");
            return ExitCode::from(EXIT_CONFIG);
        }
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(EXIT_IO);
        }
    };

    let locator = match FiducialLocator::new(&pattern, config) {
        Ok(locator) => locator,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(error_exit_code(&e));
        }
    };

    let scan_image = match read_image(&cli.scan_path) {
        Ok(Ok(image)) => image,
        Ok(Err(msg)) | Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::from(EXIT_IO);
        }
    };
    let scan = Raster::from_dynamic(&scan_image);

    let never = AtomicBool::new(false);
    let (result, diagnostics) = match locator.locate_with_diagnostics(&scan, &never, &StdClock) {
        Ok(output) => output,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(error_exit_code(&e));
        }
    };

    if cli.diagnostics {
        eprintln!("{}", diagnostics.report());
    }

    if let Err(msg) = emit(&cli, locator.config(), &scan_image, &result, &diagnostics) {
        eprintln!("{msg}");
        return ExitCode::from(EXIT_IO);
    }

    eprintln!("{}", panfid_export::summary_line(&result));
    ExitCode::from(result_exit_code(&result))
}

/// Print the result and write every requested output file.
fn emit(
    cli: &Cli,
    config: &LocatorConfig,
    scan_image: &DynamicImage,
    result: &LocateResult,
    diagnostics: &SweepDiagnostics,
) -> Result<(), String> {
    let diagnostics = cli.diagnostics.then_some(diagnostics);
    let json = if cli.json || cli.json_out.is_some() {
        Some(
            panfid_export::to_json(result, diagnostics)
                .map_err(|e| format!("Error serializing result: {e}"))?,
        )
    } else {
        None
    };

    let source = cli.scan_path.file_name().and_then(|s| s.to_str());
    let config_json = serde_json::to_string(config).ok();
    let metadata = panfid_export::TableMetadata {
        source,
        profile: Some(config.profile.name.as_str()),
        config_json: config_json.as_deref(),
    };
    let table = panfid_export::to_table(result, &metadata);

    match json {
        Some(ref json) if cli.json => println!("{json}"),
        _ => print!("{table}"),
    }

    if let Some(ref path) = cli.table {
        write_output(path, &table, "Table")?;
    }
    if let (Some(path), Some(json)) = (&cli.json_out, &json) {
        write_output(path, json, "JSON")?;
    }
    if let Some(ref path) = cli.overlay {
        let overlay = panfid_export::to_overlay(&scan_image.to_luma8(), result, cli.overlay_radius);
        overlay
            .save(path)
            .map_err(|e| format!("Error writing overlay to {}: {e}", path.display()))?;
        eprintln!("Overlay written to {}", path.display());
    }
    Ok(())
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: Instant) -> Duration {
        since.elapsed()
    }
}
