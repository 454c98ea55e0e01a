/// Two-stage doublet fit
///
/// Stage 1 runs a short direct search with Gaussian lines. Stage 2 switches
/// every signal to a pseudo-Voigt seeded with the stage-1 width and refines
/// with a gradient solver.

use serde::{Deserialize, Serialize};

use super::optimizer::{Method, OptimizerReport, SignalOptimizer};
use super::shape::Shape;
use super::signal::DoubletSignal;
use crate::data::spectrum::XyData;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageConfig {
    pub direct_iterations: u64,
    pub gradient_max_iterations: u64,
    /// Lorentzian fraction the pseudo-Voigt starts from
    pub mu: f64,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            direct_iterations: 10,
            gradient_max_iterations: 2000,
            mu: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwoStageFit {
    pub signals: Vec<DoubletSignal>,
    pub direct: OptimizerReport,
    pub gradient: OptimizerReport,
}

pub fn two_stage_fit(
    optimizer: &dyn SignalOptimizer,
    xy: &XyData,
    signals: &[DoubletSignal],
    stages: &StageConfig,
) -> Result<TwoStageFit> {
    let gaussian: Vec<DoubletSignal> = signals
        .iter()
        .map(|s| DoubletSignal {
            shape: Shape::Gaussian {
                fwhm: s.shape.fwhm(),
            },
            ..s.clone()
        })
        .collect();

    let direct = optimizer.optimize(
        xy,
        &gaussian,
        Method::Direct {
            iterations: stages.direct_iterations,
        },
    )?;
    log::debug!("Stage 1: {}", direct.report);

    let seeded: Vec<DoubletSignal> = direct
        .signals
        .into_iter()
        .map(|s| s.into_pseudo_voigt(stages.mu))
        .collect();

    let gradient = optimizer.optimize(
        xy,
        &seeded,
        Method::Gradient {
            max_iterations: stages.gradient_max_iterations,
        },
    )?;
    log::debug!("Stage 2: {}", gradient.report);
    if !gradient.report.converged {
        log::debug!("Stage 2 stopped without convergence; result kept");
    }

    Ok(TwoStageFit {
        signals: gradient.signals,
        direct: direct.report,
        gradient: gradient.report,
    })
}
