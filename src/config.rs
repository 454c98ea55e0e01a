/// Batch configuration
///
/// Defaults reproduce the screening run for the 6.27–6.315 ppm doublet
/// pair. A JSON file passed with `--config` overrides any subset of fields.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::experiments::ExperimentFilter;
use crate::data::spectrum::Zone;
use crate::error::{FitError, Result};
use crate::fit::ranges::PickingOptions;
use crate::fit::two_stage::StageConfig;
use crate::pipeline::processing::ProcessingOptions;

/// Initial guess for one of the two doublets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalGuess {
    /// Starting centre in ppm
    pub x: f64,
    /// Starting amplitude on the normalized scale
    pub y: f64,
    /// Coupling lower bound as a multiple of the nominal J
    pub coupling_min_factor: f64,
    /// Coupling upper bound as a multiple of the nominal J
    pub coupling_max_factor: f64,
}

impl Default for SignalGuess {
    fn default() -> Self {
        Self {
            x: 6.29,
            y: 1.0,
            coupling_min_factor: 0.9,
            coupling_max_factor: 1.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Keep experiments whose number is a multiple of this step
    pub experiment_step: u32,
    pub filter: ExperimentFilter,
    /// Narrow window that is picked and fitted
    pub fit_roi: Zone,
    /// Wide window used for the median background test
    pub gate_roi: Zone,
    /// Reject when `median(all) * gate_factor > median(gate_roi)`
    pub gate_factor: f64,
    /// Nominal doublet coupling in Hz
    pub coupling_hz: f64,
    /// Nominal line width in Hz
    pub width_hz: f64,
    pub signals: [SignalGuess; 2],
    pub picking: PickingOptions,
    pub stages: StageConfig,
    pub processing: ProcessingOptions,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            experiment_step: 10,
            filter: ExperimentFilter::default(),
            fit_roi: Zone::new(6.27, 6.315),
            gate_roi: Zone::new(6.2, 6.4),
            gate_factor: 3.0,
            coupling_hz: 2.34,
            width_hz: 0.97,
            signals: [
                SignalGuess::default(),
                SignalGuess {
                    x: 6.283,
                    y: 0.5,
                    coupling_min_factor: 0.8,
                    coupling_max_factor: 1.2,
                },
            ],
            picking: PickingOptions::default(),
            stages: StageConfig::default(),
            processing: ProcessingOptions::default(),
        }
    }
}

impl FitConfig {
    /// Load a configuration file; absent fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: FitConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.experiment_step == 0 {
            return Err(FitError::Config("experiment_step must be at least 1".into()));
        }
        if !(self.gate_factor.is_finite() && self.gate_factor >= 0.0) {
            return Err(FitError::Config(format!(
                "gate_factor must be a non-negative number, got {}",
                self.gate_factor
            )));
        }
        if !(self.coupling_hz > 0.0 && self.width_hz > 0.0) {
            return Err(FitError::Config(
                "coupling_hz and width_hz must be positive".into(),
            ));
        }
        for (label, zone) in [("fit_roi", &self.fit_roi), ("gate_roi", &self.gate_roi)] {
            if !(zone.from < zone.to) {
                return Err(FitError::Config(format!(
                    "{} must satisfy from < to ({} .. {})",
                    label, zone.from, zone.to
                )));
            }
        }
        for guess in &self.signals {
            if !(guess.coupling_min_factor > 0.0
                && guess.coupling_min_factor <= guess.coupling_max_factor)
            {
                return Err(FitError::Config(format!(
                    "invalid coupling factors {} .. {}",
                    guess.coupling_min_factor, guess.coupling_max_factor
                )));
            }
        }
        if self.stages.direct_iterations == 0 || self.stages.gradient_max_iterations == 0 {
            return Err(FitError::Config("stage iteration budgets must be positive".into()));
        }
        Ok(())
    }
}
