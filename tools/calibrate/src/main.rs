//! Calibration dry-run tool.
//!
//! Drives a calibration batch source the way the inference-engine builder
//! would, without building an engine:
//! - `run`: pull every batch and report per-batch statistics
//! - `inspect`: preprocess a single image
//! - `cache`: report on an existing calibration cache

use anyhow::{bail, Context, Result};
use calib_core::{
    load_calibrator_config, setup_cli_logging, BatchShape, CalibratorConfig, DeviceKind, PreprocessParams,
};
use calib_data::{BatchStats, ImagePreprocessor, PreprocessConfig};
use calib_engine::{drive, CalibrationBatchSource, CalibrationCache, DeviceBackend, DriveReport};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "calibrate")]
#[command(about = "Dry-run and inspect int8 calibration batch sources", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull every calibration batch as the engine would
    Run {
        /// Calibrator configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Override the number of calibration steps
        #[arg(long)]
        steps: Option<usize>,

        /// Override the sampling seed
        #[arg(long)]
        seed: Option<u64>,

        /// Write a JSON summary of the run
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Preprocess one image and print its channel statistics
    Inspect {
        /// Image to preprocess
        #[arg(short, long)]
        image: PathBuf,

        /// Target height
        #[arg(long, default_value = "224")]
        height: usize,

        /// Target width
        #[arg(long, default_value = "224")]
        width: usize,
    },

    /// Show whether a calibration cache exists and how large it is
    Cache {
        /// Calibration cache file
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// JSON summary of a dry run
#[derive(Debug, Serialize)]
struct RunSummary {
    device: String,
    batch_shape: BatchShape,
    pool_size: usize,
    report: DriveReport,
    batches: Vec<BatchStats>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_cli_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            steps,
            seed,
            summary,
        } => {
            let mut config = load_calibrator_config(&config)?;
            if let Some(steps) = steps {
                config.calibration.num_steps = steps;
            }
            if seed.is_some() {
                config.calibration.seed = seed;
            }
            run(&config, summary.as_deref())?
        }

        Commands::Inspect {
            image,
            height,
            width,
        } => inspect(&image, height, width)?,

        Commands::Cache { file } => show_cache(&file),
    }

    Ok(())
}

fn run(config: &CalibratorConfig, summary: Option<&Path>) -> Result<()> {
    match config.device.kind {
        DeviceKind::Host => {
            let source = CalibrationBatchSource::open_host(config)
                .context("Failed to create host calibration source")?;
            run_source(source, summary)
        }
        DeviceKind::Cuda => run_cuda(config, summary),
    }
}

#[cfg(feature = "cuda")]
fn run_cuda(config: &CalibratorConfig, summary: Option<&Path>) -> Result<()> {
    let source = CalibrationBatchSource::open_cuda(config)
        .context("Failed to create CUDA calibration source")?;
    run_source(source, summary)
}

#[cfg(not(feature = "cuda"))]
fn run_cuda(_config: &CalibratorConfig, _summary: Option<&Path>) -> Result<()> {
    bail!("device.kind = \"cuda\" needs a build with `--features cuda`; use kind = \"host\" for a dry run")
}

fn run_source<D: DeviceBackend>(mut source: CalibrationBatchSource<D>, summary: Option<&Path>) -> Result<()> {
    let device = source
        .device()
        .map(|d| d.describe())
        .unwrap_or_default();
    info!(
        "Dry run on {}: {} steps of {} from {} images",
        device,
        source.num_steps(),
        source.shape(),
        source.pool_size()
    );

    let progress = ProgressBar::new(source.num_steps() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches ({eta})")?
            .progress_chars("=>-"),
    );

    let mut batches = Vec::with_capacity(source.num_steps());
    let report = drive(&mut source, &["input"], |source, _, _| {
        if let Some(stats) = source.last_stats() {
            batches.push(stats.clone());
        }
        progress.inc(1);
    })
    .context("Calibration dry run failed")?;
    progress.finish_and_clear();

    if report.cache_hit {
        info!(
            "Cache {} already exists ({} bytes); the engine would skip calibration",
            source.cache_path().display(),
            report.cache_bytes
        );
    } else {
        info!("Produced {} batches", report.batches);
        for (step, stats) in batches.iter().enumerate() {
            info!(
                "  batch {:>4}: min {:>8.4}  max {:>8.4}",
                step,
                stats.min(),
                stats.max()
            );
        }
    }

    if let Some(path) = summary {
        let summary = RunSummary {
            device,
            batch_shape: source.shape(),
            pool_size: source.pool_size(),
            report,
            batches,
        };
        let json = serde_json::to_string_pretty(&summary)?;
        fs::write(path, json).with_context(|| format!("Failed to write summary {}", path.display()))?;
        info!("Summary written to {}", path.display());
    }

    source.close();
    Ok(())
}

fn inspect(image: &Path, height: usize, width: usize) -> Result<()> {
    if height == 0 || width == 0 {
        bail!("height and width must be positive");
    }

    let shape = BatchShape::new(1, 3, height, width);
    shape.validate()?;
    let preprocessor = ImagePreprocessor::new(PreprocessConfig::for_shape(&shape, &PreprocessParams::default())?);

    let batch = preprocessor
        .load_batch(&[image.to_path_buf()], &shape)
        .with_context(|| format!("Failed to preprocess {}", image.display()))?;

    println!("{}: tensor {}", image.display(), shape);
    for (channel, stats) in batch.stats().channels.iter().enumerate() {
        println!(
            "  channel {}: min {:>8.4}  max {:>8.4}  mean {:>8.4}",
            channel, stats.min, stats.max, stats.mean
        );
    }

    Ok(())
}

fn show_cache(file: &Path) {
    let cache = CalibrationCache::new(file);
    match cache.read() {
        Some(bytes) => {
            println!("{}: {} bytes", file.display(), bytes.len());
            // Text caches start with a header line naming the engine version and algorithm
            if let Some(header) = bytes.split(|&b| b == b'\n').next() {
                if let Ok(header) = std::str::from_utf8(header) {
                    println!("  header: {}", header.trim());
                }
            }
        }
        None => {
            warn!("No calibration cache at {}", file.display());
            println!("{}: absent", file.display());
        }
    }
}
