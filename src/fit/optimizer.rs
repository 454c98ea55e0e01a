/// Constrained optimization of doublet signals
///
/// Every bounded parameter is mapped to the unit interval
/// (`p = min + u * (max - min)`) and the argmin solvers work on `u`.
/// Evaluations clamp `u` to `[0, 1]`, so the bounds always hold.

use std::cell::{Cell, RefCell};
use std::fmt;

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;

use super::shape::synthesize;
use super::signal::{expand_all, Bounds, DoubletSignal};
use crate::data::spectrum::XyData;
use crate::error::{FitError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Method {
    /// Derivative-free simplex search started from the centre of the box
    Direct { iterations: u64 },
    /// L-BFGS started from the current parameter values
    Gradient { max_iterations: u64 },
}

impl Method {
    pub fn name(&self) -> &'static str {
        match self {
            Method::Direct { .. } => "Nelder-Mead",
            Method::Gradient { .. } => "L-BFGS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizerReport {
    pub method: &'static str,
    pub iterations: u64,
    /// Number of cost evaluations, finite-difference probes included
    pub evaluations: usize,
    /// Sum of squared residuals at the returned parameters
    pub cost: f64,
    pub converged: bool,
    pub message: String,
}

impl fmt::Display for OptimizerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}(cost={:.6e}, n_iter={}, n_fev={}, converged={}, {})",
            self.method, self.cost, self.iterations, self.evaluations, self.converged, self.message
        )
    }
}

#[derive(Debug, Clone)]
pub struct Optimized {
    pub signals: Vec<DoubletSignal>,
    pub report: OptimizerReport,
}

/// Fits signals to (x, y) data with a baseline of zero.
pub trait SignalOptimizer {
    fn optimize(&self, xy: &XyData, signals: &[DoubletSignal], method: Method) -> Result<Optimized>;
}

#[derive(Debug, Clone)]
pub struct ArgminOptimizer {
    /// L-BFGS history length
    pub memory: usize,
    pub tolerance_grad: f64,
    pub tolerance_cost: f64,
    /// Edge of the initial simplex in unit coordinates
    pub simplex_size: f64,
    /// Unit-space step for parameters without a gradient difference
    pub default_step: f64,
}

impl Default for ArgminOptimizer {
    fn default() -> Self {
        Self {
            memory: 7,
            tolerance_grad: 1e-10,
            tolerance_cost: 1e-14,
            simplex_size: 0.2,
            default_step: 1e-4,
        }
    }
}

/// Unit-space layout of all signal parameters
struct ParameterSpace<'a> {
    template: &'a [DoubletSignal],
    bounds: Vec<Bounds>,
    steps: Vec<f64>,
}

impl<'a> ParameterSpace<'a> {
    fn new(template: &'a [DoubletSignal], default_step: f64) -> Self {
        let bounds: Vec<Bounds> = template.iter().flat_map(|s| s.bounds()).collect();
        let steps = bounds
            .iter()
            .map(|b| match b.gradient_difference {
                Some(gd) if b.span() > 0.0 => (gd / b.span()).clamp(1e-8, 0.1),
                _ => default_step,
            })
            .collect();
        Self {
            template,
            bounds,
            steps,
        }
    }

    fn dim(&self) -> usize {
        self.bounds.len()
    }

    fn to_unit(&self) -> Vec<f64> {
        let values: Vec<f64> = self.template.iter().flat_map(|s| s.values()).collect();
        values
            .iter()
            .zip(&self.bounds)
            .map(|(&v, b)| if b.span() > 0.0 { ((v - b.min) / b.span()).clamp(0.0, 1.0) } else { 0.5 })
            .collect()
    }

    fn to_values(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(&self.bounds)
            .map(|(&ui, b)| b.min + ui.clamp(0.0, 1.0) * b.span())
            .collect()
    }

    fn signals_at(&self, u: &[f64]) -> Vec<DoubletSignal> {
        let values = self.to_values(u);
        let mut offset = 0;
        self.template
            .iter()
            .map(|s| {
                let n = s.parameter_count();
                let next = s.with_values(&values[offset..offset + n]);
                offset += n;
                next
            })
            .collect()
    }
}

/// Best point seen by any evaluation, kept outside the executor so a
/// failed run still yields parameters
#[derive(Default)]
struct Tracker {
    best: RefCell<Option<(f64, Vec<f64>)>>,
    evaluations: Cell<usize>,
}

impl Tracker {
    fn record(&self, cost: f64, u: &[f64]) {
        self.evaluations.set(self.evaluations.get() + 1);
        if !cost.is_finite() {
            return;
        }
        let mut best = self.best.borrow_mut();
        if best.as_ref().map_or(true, |(c, _)| cost < *c) {
            *best = Some((cost, u.to_vec()));
        }
    }
}

struct SignalProblem<'a> {
    space: &'a ParameterSpace<'a>,
    xy: &'a XyData,
    tracker: &'a Tracker,
}

impl<'a> SignalProblem<'a> {
    fn sum_of_squares(&self, u: &[f64]) -> f64 {
        let peaks = expand_all(&self.space.signals_at(u));
        let model = synthesize(&peaks, &self.xy.x);
        let cost: f64 = self
            .xy
            .y
            .iter()
            .zip(&model)
            .map(|(y, m)| (y - m) * (y - m))
            .sum();
        self.tracker.record(cost, u);
        cost
    }
}

impl<'a> CostFunction for SignalProblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.sum_of_squares(params))
    }
}

impl<'a> Gradient for SignalProblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        const EPS: f64 = 1e-12;
        let u: Vec<f64> = params.iter().map(|v| v.clamp(0.0, 1.0)).collect();
        let mut g = vec![0.0; u.len()];
        let mut probe = u.clone();

        for i in 0..u.len() {
            if self.space.bounds[i].span() <= 0.0 {
                continue;
            }
            let h = self.space.steps[i];
            let (lo, hi) = ((u[i] - h).max(0.0), (u[i] + h).min(1.0));
            probe[i] = hi;
            let f_hi = self.sum_of_squares(&probe);
            probe[i] = lo;
            let f_lo = self.sum_of_squares(&probe);
            probe[i] = u[i];
            g[i] = (f_hi - f_lo) / (hi - lo);

            // Projected gradient: no push outside the box
            if (u[i] <= EPS && g[i] > 0.0) || (u[i] >= 1.0 - EPS && g[i] < 0.0) {
                g[i] = 0.0;
            }
        }
        Ok(g)
    }
}

fn converged(status: &TerminationStatus) -> bool {
    matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    )
}

impl ArgminOptimizer {
    fn run_direct(
        &self,
        problem: SignalProblem<'_>,
        dim: usize,
        iterations: u64,
    ) -> std::result::Result<(Vec<f64>, u64, bool, String), argmin::core::Error> {
        let centre = vec![0.5; dim];
        let mut simplex = vec![centre.clone()];
        for i in 0..dim {
            let mut vertex = centre.clone();
            vertex[i] += self.simplex_size;
            simplex.push(vertex);
        }
        let solver = NelderMead::new(simplex);
        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(iterations))
            .run()?;
        let state = res.state();
        let best = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| argmin::core::Error::msg("no best parameters"))?;
        let status = state.get_termination_status();
        Ok((best, state.get_iter(), converged(status), status.to_string()))
    }

    fn run_gradient(
        &self,
        problem: SignalProblem<'_>,
        init: Vec<f64>,
        max_iterations: u64,
    ) -> std::result::Result<(Vec<f64>, u64, bool, String), argmin::core::Error> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, self.memory)
            .with_tolerance_grad(self.tolerance_grad)?
            .with_tolerance_cost(self.tolerance_cost)?;
        let res = Executor::new(problem, solver)
            .configure(|state| state.param(init).max_iters(max_iterations))
            .run()?;
        let state = res.state();
        let best = state
            .get_best_param()
            .cloned()
            .ok_or_else(|| argmin::core::Error::msg("no best parameters"))?;
        let status = state.get_termination_status();
        Ok((best, state.get_iter(), converged(status), status.to_string()))
    }
}

impl SignalOptimizer for ArgminOptimizer {
    fn optimize(&self, xy: &XyData, signals: &[DoubletSignal], method: Method) -> Result<Optimized> {
        let space = ParameterSpace::new(signals, self.default_step);
        let tracker = Tracker::default();
        if space.dim() == 0 || xy.is_empty() {
            return Err(FitError::Optimization(format!(
                "nothing to optimize ({} parameters, {} points)",
                space.dim(),
                xy.len()
            )));
        }
        let problem = SignalProblem {
            space: &space,
            xy,
            tracker: &tracker,
        };

        let outcome = match method {
            Method::Direct { iterations } => self.run_direct(problem, space.dim(), iterations),
            Method::Gradient { max_iterations } => {
                self.run_gradient(problem, space.to_unit(), max_iterations)
            }
        };

        // The solver result is accepted as is; a solver error falls back to
        // the best point evaluated so far.
        let (u, iterations, converged, message) = match outcome {
            Ok(found) => found,
            Err(e) => {
                let best = tracker.best.borrow().clone();
                match best {
                    Some((_, u)) => {
                        log::warn!("{} stopped early: {}; keeping best evaluated point", method.name(), e);
                        (u, 0, false, e.to_string())
                    }
                    None => return Err(FitError::Optimization(format!("{}: {}", method.name(), e))),
                }
            }
        };

        let fitted = space.signals_at(&u);
        let model = synthesize(&expand_all(&fitted), &xy.x);
        let cost: f64 = xy.y.iter().zip(&model).map(|(y, m)| (y - m) * (y - m)).sum();

        Ok(Optimized {
            signals: fitted,
            report: OptimizerReport {
                method: method.name(),
                iterations,
                evaluations: tracker.evaluations.get(),
                cost,
                converged,
                message,
            },
        })
    }
}
