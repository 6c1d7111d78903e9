//! Normal-distribution negative log-likelihood.
//!
//! The objective is written once, in [`normal_nll`], generic over
//! [`Scalar`]: evaluating it with `f64` yields the objective value, evaluating
//! it with [`Dual`] yields one directional derivative. The scale enters as
//! `log_sd` and is mapped through [`ExpBijector`], so `(mean, log_sd)` is an
//! unconstrained parameter vector.

use crate::sdreport::DerivedQuantity;
use nl_ad::dual::{self, Dual};
use nl_ad::scalar::Scalar;
use nl_core::traits::LogDensityModel;
use nl_core::{Error, Result};
use nl_prob::normal;
use nl_prob::transforms::{Bijector, ExpBijector};
use rayon::prelude::*;

/// Joint negative log-likelihood of `y` under `N(mean, exp(log_sd))`.
///
/// Empty `y` gives exactly zero. Nothing is validated: NaN and infinite
/// inputs propagate through the arithmetic.
pub fn normal_nll<S: Scalar>(y: &[f64], mean: S, log_sd: S) -> S {
    let sd = ExpBijector::forward_scalar(log_sd);
    let mut jnll = S::from_f64(0.0);
    for &yi in y {
        jnll = jnll - normal::logpdf_generic(yi, mean, sd);
    }
    jnll
}

/// Same value as [`normal_nll`], reduced in parallel over observations.
pub fn normal_nll_par<S: Scalar>(y: &[f64], mean: S, log_sd: S) -> S {
    let sd = ExpBijector::forward_scalar(log_sd);
    let zero = || S::from_f64(0.0);
    y.par_iter()
        .fold(zero, |acc, &yi| acc - normal::logpdf_generic(yi, mean, sd))
        .reduce(zero, |a, b| a + b)
}

/// Negative log-likelihood at `(mean, log_sd)`.
pub fn evaluate(y: &[f64], mean: f64, log_sd: f64) -> f64 {
    normal_nll(y, mean, log_sd)
}

/// Parallel [`evaluate`]. Agrees with it up to summation-order rounding.
pub fn evaluate_par(y: &[f64], mean: f64, log_sd: f64) -> f64 {
    normal_nll_par(y, mean, log_sd)
}

/// Negative log-likelihood and its gradient `[d/dmean, d/dlog_sd]`.
pub fn evaluate_with_grad(y: &[f64], mean: f64, log_sd: f64) -> (f64, [f64; 2]) {
    let (v, g) = dual::gradient(|p: &[Dual]| normal_nll(y, p[0], p[1]), &[mean, log_sd]);
    (v, [g[0], g[1]])
}

fn closed_form(y: &[f64]) -> Option<[f64; 2]> {
    if y.is_empty() {
        return None;
    }
    let n = y.len() as f64;
    let mean = y.iter().sum::<f64>() / n;
    let var = y.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / n;
    if !(var.is_finite() && var > 0.0) {
        return None;
    }
    Some([mean, 0.5 * var.ln()])
}

fn moment_start(y: &[f64]) -> [f64; 2] {
    if let Some(start) = closed_form(y) {
        return start;
    }
    let mean = y.iter().sum::<f64>() / y.len().max(1) as f64;
    [if mean.is_finite() { mean } else { 0.0 }, 0.0]
}

/// Normal model over a fixed observation vector, parameterized by `(mean, log_sd)`.
#[derive(Debug, Clone)]
pub struct NormalModel {
    y: Vec<f64>,
    init: [f64; 2],
    parallel: bool,
}

impl NormalModel {
    /// Parameter names, in parameter-vector order.
    pub const PARAMETER_NAMES: [&'static str; 2] = ["mean", "log_sd"];

    /// Create a model for `y`.
    ///
    /// The starting point is the sample moments: the sample mean and the log of
    /// the sample sd. Where those are undefined, `mean` falls back to the data
    /// mean (or 0 for empty data) and `log_sd` to 0.
    pub fn new(y: Vec<f64>) -> Self {
        let init = moment_start(&y);
        Self { y, init, parallel: false }
    }

    /// Set the starting point on the optimizer scale.
    pub fn with_init(mut self, mean: f64, log_sd: f64) -> Self {
        self.init = [mean, log_sd];
        self
    }

    /// Set the starting point from a natural-scale standard deviation.
    pub fn with_natural_init(self, mean: f64, sd: f64) -> Result<Self> {
        if !sd.is_finite() || sd <= 0.0 {
            return Err(Error::Validation(format!("initial sd must be finite and > 0, got {sd}")));
        }
        Ok(self.with_init(mean, ExpBijector.inverse(sd)))
    }

    /// Reduce over observations with rayon.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// The observations.
    pub fn observations(&self) -> &[f64] {
        &self.y
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    /// Standard deviation for a given `log_sd`.
    pub fn sd(log_sd: f64) -> f64 {
        ExpBijector.forward(log_sd)
    }

    /// `(mean, sd)` for a parameter vector `(mean, log_sd)`.
    pub fn natural_scale(params: &[f64]) -> Result<[f64; 2]> {
        match params {
            [mean, log_sd] => Ok([*mean, Self::sd(*log_sd)]),
            _ => Err(Error::Validation(format!("expected 2 parameters, got {}", params.len()))),
        }
    }

    /// Analytic minimizer: sample mean and log of the population-form sample sd.
    ///
    /// `None` for empty data or zero sample variance, where no minimum exists.
    pub fn closed_form_mle(&self) -> Option<[f64; 2]> {
        closed_form(&self.y)
    }

    /// Quantities reported with delta-method standard errors after a fit.
    pub fn derived_quantities() -> Vec<DerivedQuantity> {
        vec![DerivedQuantity::new("sd", |p: &[Dual]| ExpBijector::forward_scalar(p[1]))]
    }

    fn nll_scalar<S: Scalar>(&self, mean: S, log_sd: S) -> S {
        if self.parallel {
            normal_nll_par(&self.y, mean, log_sd)
        } else {
            normal_nll(&self.y, mean, log_sd)
        }
    }
}

impl LogDensityModel for NormalModel {
    fn dim(&self) -> usize {
        2
    }

    fn parameter_names(&self) -> Vec<String> {
        Self::PARAMETER_NAMES.iter().map(|s| s.to_string()).collect()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.init.to_vec()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        vec![(f64::NEG_INFINITY, f64::INFINITY); 2]
    }

    fn parameter_fallback_init(&self) -> Option<Vec<f64>> {
        self.closed_form_mle().map(|p| p.to_vec())
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.check_dim(params)?;
        Ok(self.nll_scalar(params[0], params[1]))
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.check_dim(params)?;
        let (_, g) = dual::gradient(|p: &[Dual]| self.nll_scalar(p[0], p[1]), params);
        Ok(g)
    }
}
