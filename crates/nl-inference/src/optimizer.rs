//! Optimization algorithms
//!
//! A thin wrapper around argmin's L-BFGS with a More–Thuente line search.
//! Box bounds are handled by clamping plus a projected gradient; unbounded
//! parameters use infinite bounds and pass through untouched.

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nl_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Configuration for the L-BFGS optimizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Maximum number of iterations
    pub max_iter: u64,
    /// Convergence tolerance for gradient norm
    pub tol: f64,
    /// Number of corrections to approximate inverse Hessian
    pub m: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self { max_iter: 1000, tol: 1e-6, m: 10 }
    }
}

impl OptimizerConfig {
    /// Reject configurations argmin would refuse or that cannot terminate sensibly.
    pub fn validate(&self) -> Result<()> {
        if self.max_iter == 0 {
            return Err(Error::Validation("max_iter must be > 0".into()));
        }
        if !self.tol.is_finite() || self.tol < 0.0 {
            return Err(Error::Validation(format!("tol must be finite and >= 0, got {}", self.tol)));
        }
        if self.m == 0 {
            return Err(Error::Validation("m must be > 0".into()));
        }
        Ok(())
    }
}

/// Result of optimization
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Best-fit parameters
    pub parameters: Vec<f64>,
    /// Function value at minimum
    pub fval: f64,
    /// Function value at the starting point
    pub initial_cost: f64,
    /// Gradient at the last iterate, if the solver kept one
    pub final_gradient: Option<Vec<f64>>,
    /// Number of iterations
    pub n_iter: u64,
    /// Number of objective (cost) evaluations.
    pub n_fev: usize,
    /// Number of gradient evaluations.
    pub n_gev: usize,
    /// Convergence status
    pub converged: bool,
    /// Termination message
    pub message: String,
}

impl OptimizationResult {
    /// Euclidean norm of the final gradient, NaN if unavailable.
    pub fn grad_norm(&self) -> f64 {
        self.final_gradient
            .as_ref()
            .map(|g| g.iter().map(|x| x * x).sum::<f64>().sqrt())
            .unwrap_or(f64::NAN)
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OptimizationResult(fval={:.6}, n_iter={}, n_fev={}, n_gev={}, converged={})",
            self.fval, self.n_iter, self.n_fev, self.n_gev, self.converged
        )
    }
}

/// Objective function trait for optimization
pub trait ObjectiveFunction: Send + Sync {
    /// Evaluate function at given parameters
    fn eval(&self, params: &[f64]) -> Result<f64>;

    /// Compute gradient at given parameters (central differences if not overridden)
    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        let mut grad = Vec::with_capacity(params.len());
        let mut shifted = params.to_vec();

        for i in 0..params.len() {
            let eps = 1e-8 * params[i].abs().max(1.0);

            shifted[i] = params[i] + eps;
            let f_plus = self.eval(&shifted)?;
            shifted[i] = params[i] - eps;
            let f_minus = self.eval(&shifted)?;
            shifted[i] = params[i];

            grad.push((f_plus - f_minus) / (2.0 * eps));
        }

        Ok(grad)
    }
}

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds.iter()).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Zero gradient components that point out of the box at an active bound.
fn project_gradient(x: &[f64], grad: &mut [f64], bounds: &[(f64, f64)]) {
    const EPS: f64 = 1e-12;
    for ((g, &xi), &(lo, hi)) in grad.iter_mut().zip(x.iter()).zip(bounds.iter()) {
        if (xi <= lo + EPS && *g > 0.0) || (xi >= hi - EPS && *g < 0.0) {
            *g = 0.0;
        }
    }
}

/// Fresh L-BFGS runs allowed after a cost stall above the gradient tolerance.
const MAX_RESTARTS: usize = 2;

#[derive(Default)]
struct EvalCounts {
    cost: AtomicUsize,
    grad: AtomicUsize,
}

/// Bridges [`ObjectiveFunction`] to argmin's problem traits.
struct Problem<'a> {
    objective: &'a dyn ObjectiveFunction,
    bounds: &'a [(f64, f64)],
    counts: Arc<EvalCounts>,
}

impl CostFunction for Problem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        self.counts.cost.fetch_add(1, Ordering::Relaxed);
        let x = clamp_params(params, self.bounds);
        self.objective.eval(&x).map_err(|e| argmin::core::Error::msg(e.to_string()))
    }
}

impl Gradient for Problem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        self.counts.grad.fetch_add(1, Ordering::Relaxed);
        let x = clamp_params(params, self.bounds);
        let mut g =
            self.objective.gradient(&x).map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        project_gradient(&x, &mut g, self.bounds);
        Ok(g)
    }
}

/// L-BFGS optimizer with optional box constraints
#[derive(Debug, Clone, Default)]
pub struct LbfgsOptimizer {
    config: OptimizerConfig,
}

impl LbfgsOptimizer {
    /// Create a new optimizer with the given configuration
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize `objective` starting from `init_params`.
    ///
    /// `bounds` holds one `(lower, upper)` pair per parameter; pass infinities
    /// for unconstrained parameters.
    pub fn minimize(
        &self,
        objective: &dyn ObjectiveFunction,
        init_params: &[f64],
        bounds: &[(f64, f64)],
    ) -> Result<OptimizationResult> {
        if init_params.len() != bounds.len() {
            return Err(Error::Validation(format!(
                "Parameter and bounds length mismatch: {} != {}",
                init_params.len(),
                bounds.len()
            )));
        }
        let invalid = bounds.iter().find(|(lo, hi)| lo.is_nan() || hi.is_nan() || lo > hi);
        if let Some((lo, hi)) = invalid {
            return Err(Error::Validation(format!("Invalid bounds: ({lo}, {hi})")));
        }
        self.config.validate()?;

        let mut start = clamp_params(init_params, bounds);
        let initial_cost = objective.eval(&start)?;
        let counts = Arc::new(EvalCounts::default());

        // Stall detection only: stop once the cost no longer moves at f64 resolution.
        let tol_cost = f64::EPSILON * initial_cost.abs().max(1.0);

        let mut n_iter = 0_u64;
        let mut best: Option<Run> = None;
        for restart in 0..=MAX_RESTARTS {
            let budget = self.config.max_iter - n_iter;
            let attempt = self.run_lbfgs(objective, bounds, &counts, start.clone(), budget, tol_cost);
            let run = match attempt {
                Ok(run) => run,
                // A failed restart keeps the previous run.
                Err(e) if best.is_some() => {
                    log::debug!("L-BFGS restart {restart} failed: {e}");
                    break;
                }
                Err(e) => return Err(e),
            };
            n_iter += run.n_iter;

            let improved = best.as_ref().is_none_or(|b| run.fval <= b.fval);
            let stalled = run.solver_converged
                && (run.grad_norm.is_nan() || run.grad_norm > self.config.tol);
            if improved {
                start = run.parameters.clone();
                best = Some(run);
            }
            if !improved || !stalled || n_iter >= self.config.max_iter {
                break;
            }
            log::debug!(
                "L-BFGS stalled at |grad|={:.3e} > tol={:.1e}; restarting from best point",
                best.as_ref().map_or(f64::NAN, |b| b.grad_norm),
                self.config.tol
            );
        }
        let run = best.ok_or_else(|| Error::Computation("No best parameters found".into()))?;

        // Converged means the solver stopped cleanly and the projected gradient meets `tol`.
        let converged = run.solver_converged && run.grad_norm <= self.config.tol;
        let message = if run.solver_converged && !converged {
            format!(
                "{} (gradient norm {:.3e} above tol {:.1e})",
                run.message, run.grad_norm, self.config.tol
            )
        } else {
            run.message
        };

        let result = OptimizationResult {
            parameters: run.parameters,
            fval: run.fval,
            initial_cost,
            final_gradient: run.gradient,
            n_iter,
            n_fev: counts.cost.load(Ordering::Relaxed),
            n_gev: counts.grad.load(Ordering::Relaxed),
            converged,
            message,
        };
        log::debug!("{result}");
        Ok(result)
    }

    /// One L-BFGS run from `start` with at most `max_iters` iterations.
    fn run_lbfgs(
        &self,
        objective: &dyn ObjectiveFunction,
        bounds: &[(f64, f64)],
        counts: &Arc<EvalCounts>,
        start: Vec<f64>,
        max_iters: u64,
        tol_cost: f64,
    ) -> Result<Run> {
        let problem = Problem { objective, bounds, counts: Arc::clone(counts) };
        let solver = LBFGS::new(MoreThuenteLineSearch::new(), self.config.m)
            .with_tolerance_grad(self.config.tol)
            .and_then(|s| s.with_tolerance_cost(tol_cost))
            .map_err(|e| Error::Validation(format!("Invalid optimizer configuration: {e}")))?;

        let res = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(max_iters))
            .run()
            .map_err(|e| Error::Computation(format!("Optimization failed: {e}")))?;

        let state = res.state();
        let best = state
            .get_best_param()
            .ok_or_else(|| Error::Computation("No best parameters found".to_string()))?;
        let parameters = clamp_params(best, bounds);
        let fval = state.get_best_cost();

        let termination = state.get_termination_status();
        let solver_converged = matches!(
            termination,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
                | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
        );

        // Gradient at the reported point, projected the same way the solver saw it.
        counts.grad.fetch_add(1, Ordering::Relaxed);
        let gradient = objective.gradient(&parameters).ok().map(|mut g| {
            project_gradient(&parameters, &mut g, bounds);
            g
        });
        let grad_norm = gradient
            .as_ref()
            .map(|g| g.iter().map(|x| x * x).sum::<f64>().sqrt())
            .unwrap_or(f64::NAN);

        Ok(Run {
            parameters,
            fval,
            gradient,
            grad_norm,
            n_iter: state.get_iter(),
            solver_converged,
            message: termination.to_string(),
        })
    }
}

/// Outcome of a single L-BFGS run.
struct Run {
    parameters: Vec<f64>,
    fval: f64,
    gradient: Option<Vec<f64>>,
    grad_norm: f64,
    n_iter: u64,
    solver_converged: bool,
    message: String,
}
