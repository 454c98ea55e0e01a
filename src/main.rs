#![allow(dead_code)]

mod config;
mod data;
mod error;
mod fit;
mod log;
mod pipeline;

use std::path::PathBuf;

use clap::Parser;

use config::FitConfig;
use fit::optimizer::ArgminOptimizer;
use fit::ranges::AutoRangePicker;
use pipeline::conversion::BrukerLoader;
use pipeline::Fitter;

/// Fit the 6.27-6.315 ppm doublet pair across a tree of Bruker experiments
#[derive(Parser)]
#[command(
    name = "nmr-roi-fit",
    version,
    about = "Batch ROI doublet fitting for Bruker 1D NMR experiments"
)]
struct Cli {
    /// Input directory holding <sample>/<expno> experiment folders
    #[arg(long, default_value = "./data")]
    path: PathBuf,

    /// Output directory for <name>_FIT.json files (parent must exist)
    #[arg(long = "pathToWrite", default_value = "../results")]
    path_to_write: PathBuf,

    /// JSON configuration overriding the default fit settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the reproducibility log to this file (.txt for plain text, JSON otherwise)
    #[arg(long = "session-log")]
    session_log: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    ::log::info!("nmr-roi-fit v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => FitConfig::load(path)?,
        None => FitConfig::default(),
    };

    let picker = AutoRangePicker::new(config.picking.clone());
    let optimizer = ArgminOptimizer::default();
    let loader = BrukerLoader::new(config.filter.clone(), config.processing.clone());
    let fitter = Fitter {
        config: &config,
        picker: &picker,
        optimizer: &optimizer,
    };

    let mut session = log::reproducibility::ReproLog::new();
    let report = pipeline::run_batch(&cli.path, &cli.path_to_write, &fitter, &loader, &mut session)?;

    ::log::info!(
        "Done: {} group(s), {} spectra, {} written, {} skipped",
        report.groups,
        report.spectra,
        report.written.len(),
        report.skipped.len()
    );
    for (name, reason) in &report.skipped {
        ::log::debug!("  {}: {}", name, reason);
    }

    if let Some(path) = &cli.session_log {
        session.save(path)?;
        ::log::info!("Session log written to {}", path.display());
    }
    Ok(())
}
