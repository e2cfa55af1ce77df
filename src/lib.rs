//! roiquant: per-region cell quantification for microscopy batches.
//!
//! For every image in a directory and every region of interest (ROI) drawn
//! on it, roiquant estimates the number of nuclei from the nucleus channel,
//! counts marker-positive cells segmented by an external Cellpose process
//! on the marker channel, and writes one row per (image, ROI) to a
//! tab-separated results table.
//!
//! # Modules
//!
//! - [`raster`]: calibrated rasters, ROIs, TIFF and GeoJSON input
//! - [`nuclei`]: density-based nucleus counting
//! - [`segmentation`]: orchestration of the external segmenter
//! - [`population`]: labeled objects and their size/intensity filters
//! - [`quantify`]: per-ROI pipeline, results table and overlays
//! - [`batch`]: directory discovery and batch execution
//! - [`config`]: run configuration
//! - [`error`]: error types for roiquant operations

pub mod batch;
pub mod config;
pub mod error;
pub mod nuclei;
pub mod population;
pub mod quantify;
pub mod raster;
pub mod segmentation;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::RunConfig;
use crate::segmentation::{CellposeVersion, EnvKind, Segmenter, SCRATCH_PREFIX};

pub use error::QuantError;

/// The roiquant CLI application.
#[derive(Parser)]
#[command(name = "roiquant")]
#[command(version, author, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG wins if set.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Quantify every image and ROI in a directory.
    Run(RunArgs),
    /// Show which images, channels and ROIs a run would use.
    Plan(PlanArgs),
    /// Validate the configuration and print the segmenter command line.
    CheckEnv(CheckEnvArgs),
}

/// Arguments for the run subcommand.
#[derive(clap::Args)]
struct RunArgs {
    /// Directory holding the images.
    dir: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Do not write overlay TIFFs.
    #[arg(long)]
    no_overlay: bool,
}

/// Arguments for the plan subcommand.
#[derive(clap::Args)]
struct PlanArgs {
    /// Directory holding the images.
    dir: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    /// Output format for the report ('text' or 'json').
    #[arg(long, default_value = "text")]
    output: String,
}

/// Arguments for the check-env subcommand.
#[derive(clap::Args)]
struct CheckEnvArgs {
    #[command(flatten)]
    config: ConfigArgs,
}

/// Configuration file plus per-field overrides.
#[derive(clap::Args)]
struct ConfigArgs {
    /// YAML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pixel size in µm.
    #[arg(long)]
    pixel_size: Option<f64>,

    /// Area of an average nucleus in µm².
    #[arg(long)]
    mean_nucleus_area: Option<f64>,

    /// Smallest marker cell kept, in µm².
    #[arg(long)]
    min_cell_area: Option<f64>,

    /// Largest marker cell kept, in µm².
    #[arg(long)]
    max_cell_area: Option<f64>,

    /// Minimum mean marker intensity of a kept cell.
    #[arg(long)]
    min_cell_intensity: Option<f64>,

    /// Output directory (default: <DIR>/Results).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Cellpose environment directory.
    #[arg(long, env = "ROIQUANT_CELLPOSE_ENV")]
    env_path: Option<PathBuf>,

    /// Cellpose environment kind.
    #[arg(long, value_enum)]
    env_kind: Option<EnvKind>,

    /// Cellpose release installed in the environment.
    #[arg(long, value_enum)]
    cellpose_version: Option<CellposeVersion>,

    /// Cellpose model.
    #[arg(long)]
    model: Option<String>,

    /// Stitch masks across planes above this IoU (Cellpose 0.7 and later).
    #[arg(long)]
    stitch_threshold: Option<f64>,

    /// Expected cell diameter in pixels.
    #[arg(long)]
    diameter: Option<f64>,

    /// Run Cellpose on the CPU.
    #[arg(long)]
    no_gpu: bool,

    /// Kill Cellpose after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Directory for Cellpose scratch files.
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

impl ConfigArgs {
    /// Loads the config file (or defaults) and applies the overrides.
    fn load(&self) -> Result<RunConfig, QuantError> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_yaml_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(v) = self.pixel_size {
            config.pixel_size = v;
        }
        if let Some(v) = self.mean_nucleus_area {
            config.mean_nucleus_area = v;
        }
        if let Some(v) = self.min_cell_area {
            config.min_cell_area = v;
        }
        if let Some(v) = self.max_cell_area {
            config.max_cell_area = v;
        }
        if let Some(v) = self.min_cell_intensity {
            config.min_cell_intensity = v;
        }
        if let Some(v) = &self.output_dir {
            config.output_dir = Some(v.clone());
        }

        let seg = &mut config.segmentation;
        if let Some(v) = &self.env_path {
            seg.env_path = v.clone();
        }
        if let Some(v) = self.env_kind {
            seg.env_kind = v;
        }
        if let Some(v) = self.cellpose_version {
            seg.version = v;
        }
        if let Some(v) = &self.model {
            seg.model = v.clone();
        }
        if let Some(v) = self.stitch_threshold {
            seg.stitch_threshold = Some(v);
        }
        if let Some(v) = self.diameter {
            seg.diameter = v;
        }
        if self.no_gpu {
            seg.use_gpu = false;
        }
        if let Some(v) = self.timeout_secs {
            seg.timeout_secs = Some(v);
        }
        if let Some(v) = &self.scratch_dir {
            seg.scratch_root = Some(v.clone());
        }

        Ok(config)
    }
}

/// Run the roiquant CLI.
///
/// This is the main entry point for the CLI, called from `main.rs` once
/// logging is set up.
pub fn run(cli: Cli) -> Result<(), QuantError> {
    match cli.command {
        Some(Commands::Run(args)) => run_batch(args),
        Some(Commands::Plan(args)) => run_plan(args),
        Some(Commands::CheckEnv(args)) => run_check_env(args),
        None => {
            println!("roiquant {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Per-ROI nucleus and marker-cell quantification.");
            println!();
            println!("Run 'roiquant --help' for usage information.");
            Ok(())
        }
    }
}

/// Execute the run subcommand.
fn run_batch(args: RunArgs) -> Result<(), QuantError> {
    let mut config = args.config.load()?;
    if args.no_overlay {
        config.overlay = false;
    }
    let config = config.validate()?;
    let segmenter = Segmenter::cellpose(config.segmentation().clone());

    let summary = batch::run_batch(&args.dir, &config, &segmenter)?;
    print!("{}", summary);
    Ok(())
}

/// Execute the plan subcommand.
fn run_plan(args: PlanArgs) -> Result<(), QuantError> {
    let config = args.config.load()?.validate()?;
    let plan = batch::plan_batch(&args.dir, &config)?;

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&plan)?),
        "text" => print!("{}", plan),
        other => {
            return Err(QuantError::Configuration(format!(
                "unknown output format '{}' (supported: text, json)",
                other
            )))
        }
    }
    Ok(())
}

/// Execute the check-env subcommand.
fn run_check_env(args: CheckEnvArgs) -> Result<(), QuantError> {
    let config = args.config.load()?.validate()?;
    let seg = config.segmentation();
    let example_dir = seg.scratch_root().join(format!("{}XXXXXX", SCRATCH_PREFIX));

    println!(
        "Environment: {} ({}, Cellpose {})",
        seg.config().env_path.display(),
        seg.config().env_kind,
        seg.config().version
    );
    println!("Command: {}", seg.command(&example_dir));

    let entry = seg.entry_point();
    if !entry.is_file() {
        return Err(QuantError::MissingInput(format!(
            "{} not found; is the Cellpose environment installed?",
            entry.display()
        )));
    }
    println!("Found {}", entry.display());
    Ok(())
}
