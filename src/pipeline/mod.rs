pub mod conversion;
pub mod processing;
pub mod roi;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::FitConfig;
use crate::data::experiments::{file_list, group_by_experiments, group_experiments, select_every};
use crate::data::spectrum::{Spectrum, XyData};
use crate::error::Result;
use crate::fit::optimizer::SignalOptimizer;
use crate::fit::ranges::RangePicker;
use crate::fit::result::{assemble, write_record, FitRecord};
use crate::fit::signal::build_signals;
use crate::fit::two_stage::two_stage_fit;
use crate::fit::windows::derive_windows;
use crate::log::reproducibility::ReproLog;
use conversion::SpectrumLoader;
use roi::{gate, min_max, xy_extract, GateDecision};

/// Why a spectrum produced no output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Gate window not above the spectrum background
    BelowBackground,
    /// Range picking found nothing in the fit window
    NoRanges,
    /// Zero intensity range in the fit window, nothing to normalize
    FlatRegion,
    /// The spectrum has no points in the gate window
    EmptyGateWindow,
}

impl SkipReason {
    /// Skips that point at a misconfigured window rather than at the sample
    pub fn is_suspicious(&self) -> bool {
        matches!(self, SkipReason::EmptyGateWindow)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BelowBackground => write!(f, "no signal above background"),
            SkipReason::NoRanges => write!(f, "no ranges detected"),
            SkipReason::FlatRegion => write!(f, "flat region of interest"),
            SkipReason::EmptyGateWindow => write!(f, "no points in the gate window"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written(PathBuf),
    Skipped(SkipReason),
}

/// The collaborators a fit run calls into
pub struct Fitter<'a> {
    pub config: &'a FitConfig,
    pub picker: &'a dyn RangePicker,
    pub optimizer: &'a dyn SignalOptimizer,
}

impl<'a> Fitter<'a> {
    /// Gate, pick, fit and write one spectrum.
    pub fn process_spectrum(&self, spectrum: &Spectrum, out_dir: &Path, log: &mut ReproLog) -> Result<Outcome> {
        let config = self.config;
        let name = spectrum.name.as_str();
        let frequency = spectrum.frequency;

        let experimental = xy_extract(&spectrum.data, &[config.fit_roi]);

        match gate(&spectrum.data, config.gate_roi, config.gate_factor) {
            GateDecision::Proceed {
                median_all,
                median_roi,
            } => log.add_entry(
                name,
                "Gate",
                &format!("median(all)={:.4e}, median(roi)={:.4e}, proceed", median_all, median_roi),
            ),
            GateDecision::Reject {
                median_all,
                median_roi,
            } => {
                log.add_entry(
                    name,
                    "Gate",
                    &format!("median(all)={:.4e}, median(roi)={:.4e}, rejected", median_all, median_roi),
                );
                return Ok(skip(name, SkipReason::BelowBackground));
            }
            GateDecision::EmptyRoi => {
                log.add_entry(name, "Gate", "no points in the gate window, rejected");
                return Ok(skip(name, SkipReason::EmptyGateWindow));
            }
        }

        let ranges = self.picker.pick(&experimental, frequency);
        log.add_entry(
            name,
            "Range Picking",
            &format!(
                "{} range(s) from {:?}",
                ranges.len(),
                ranges.iter().map(|r| r.from).collect::<Vec<_>>()
            ),
        );
        log::debug!("{}: ranges {:?}", name, ranges);
        let Some(windows) = derive_windows(&ranges, frequency) else {
            return Ok(skip(name, SkipReason::NoRanges));
        };
        log.add_entry(
            name,
            "Windows",
            &format!(
                "x1=[{:.5}, {:.5}], x2=[{:.5}, {:.5}]",
                windows.x1.min, windows.x1.max, windows.x2.min, windows.x2.max
            ),
        );

        let scale = match min_max(&experimental.y) {
            Some(m) if m.range() > 0.0 => m.range(),
            _ => return Ok(skip(name, SkipReason::FlatRegion)),
        };
        let normalized = XyData::new(
            experimental.x.clone(),
            experimental.y.iter().map(|v| v / scale).collect(),
        );

        let signals = build_signals(config, &windows, frequency);
        let fit = two_stage_fit(self.optimizer, &normalized, &signals, &config.stages)?;
        log.add_entry(name, "Stage 1", &fit.direct.to_string());
        log.add_entry(name, "Stage 2", &fit.gradient.to_string());

        let assembled = assemble(&fit.signals, &experimental, scale);
        let record = FitRecord::new(name, config.fit_roi, experimental, frequency, assembled);
        let path = write_record(out_dir, &record)?;
        log.add_entry(name, "Write", &path.display().to_string());
        log::info!("{}: fit written to {}", name, path.display());
        Ok(Outcome::Written(path))
    }
}

fn skip(name: &str, reason: SkipReason) -> Outcome {
    if reason.is_suspicious() {
        log::warn!("{}: skipped ({}), check the configured windows", name, reason);
    } else {
        log::info!("{}: skipped ({})", name, reason);
    }
    Outcome::Skipped(reason)
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub groups: usize,
    pub spectra: usize,
    pub written: Vec<PathBuf>,
    pub skipped: Vec<(String, SkipReason)>,
}

/// Create the output directory when missing. The parent must exist.
pub fn prepare_output_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir(path)?;
        log::info!("Created output directory {}", path.display());
    }
    Ok(())
}

/// Select, load and fit every eligible experiment below `input`, one
/// spectrum at a time.
pub fn run_batch(
    input: &Path,
    output: &Path,
    fitter: &Fitter<'_>,
    loader: &dyn SpectrumLoader,
    log: &mut ReproLog,
) -> Result<BatchReport> {
    prepare_output_dir(output)?;
    log.set_source(&input.display().to_string());

    let files = file_list(input)?;
    let experiments = group_by_experiments(&files, &fitter.config.filter);
    let total = experiments.len();
    let selected = select_every(experiments, fitter.config.experiment_step);
    log::info!(
        "{} files, {} experiments, {} selected (every {})",
        files.len(),
        total,
        selected.len(),
        fitter.config.experiment_step
    );

    let mut report = BatchReport::default();
    for group in group_experiments(selected) {
        report.groups += 1;
        log::info!(
            "Group {} ({} experiments)",
            group.first().map(|e| e.sample.as_str()).unwrap_or(""),
            group.len()
        );
        for spectrum in loader.load_group(&group, log)? {
            report.spectra += 1;
            match fitter.process_spectrum(&spectrum, output, log)? {
                Outcome::Written(path) => report.written.push(path),
                Outcome::Skipped(reason) => report.skipped.push((spectrum.name.clone(), reason)),
            }
        }
    }
    Ok(report)
}
