//! Profile likelihood scans.
//!
//! One parameter is pinned at each scan value (by collapsing its bounds to a
//! point) while the rest are re-minimized. The scan reports
//! `2 (nll(value) − nll_hat)`, asymptotically χ²₁ near the true value.

use crate::MaximumLikelihoodEstimator;
use nl_core::traits::LogDensityModel;
use nl_core::{Error, Result};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Single point in a profile likelihood scan.
#[derive(Debug, Clone, Serialize)]
pub struct ProfilePoint {
    /// Pinned parameter value.
    pub value: f64,
    /// Conditional NLL at `value`.
    pub nll: f64,
    /// `2 (nll − nll_hat)`, clipped at 0.
    pub delta_twice_nll: f64,
    /// Conditional fit convergence.
    pub converged: bool,
    /// Conditional fit iterations.
    pub n_iter: u64,
}

/// Profile likelihood scan result.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileScan {
    /// Index of the scanned parameter.
    pub index: usize,
    /// Name of the scanned parameter.
    pub name: String,
    /// Unconditional best-fit value of the scanned parameter.
    pub hat: f64,
    /// Unconditional NLL at the global minimum.
    pub nll_hat: f64,
    /// Per-point results, in scan order.
    pub points: Vec<ProfilePoint>,
}

impl ProfileScan {
    /// Smallest and largest scanned values inside the `level` profile interval.
    ///
    /// `None` if no scanned point falls inside.
    pub fn interval(&self, level: f64) -> Result<Option<(f64, f64)>> {
        if !(level > 0.0 && level < 1.0) {
            return Err(Error::Validation(format!("level must be in (0, 1), got {level}")));
        }
        let chi2 = ChiSquared::new(1.0).map_err(|e| Error::Computation(e.to_string()))?;
        let threshold = chi2.inverse_cdf(level);

        let inside = self.points.iter().filter(|p| p.delta_twice_nll <= threshold).map(|p| p.value);
        Ok(inside.fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        }))
    }
}

/// A model with one parameter held at a fixed value.
struct Pinned<'a, M: ?Sized> {
    inner: &'a M,
    index: usize,
    value: f64,
    init: Vec<f64>,
}

impl<M: LogDensityModel + ?Sized> LogDensityModel for Pinned<'_, M> {
    fn dim(&self) -> usize {
        self.inner.dim()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.inner.parameter_names()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.init.clone()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        let mut bounds = self.inner.parameter_bounds();
        bounds[self.index] = (self.value, self.value);
        bounds
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        self.inner.nll(params)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.inner.grad_nll(params)
    }
}

/// Scan parameter `index` over `values`, re-minimizing the others at each point.
///
/// Each conditional fit warm-starts from the unconditional best fit.
pub fn scan<M: LogDensityModel + ?Sized>(
    mle: &MaximumLikelihoodEstimator,
    model: &M,
    index: usize,
    values: &[f64],
) -> Result<ProfileScan> {
    let names = model.parameter_names();
    let name = names.get(index).cloned().ok_or_else(|| {
        Error::Validation(format!("parameter index {index} out of range for dim {}", model.dim()))
    })?;
    if let Some(v) = values.iter().find(|v| !v.is_finite()) {
        return Err(Error::Validation(format!("scan values must be finite, got {v}")));
    }

    let free = mle.fit_minimum(model)?;
    let hat = free.parameters[index];
    let nll_hat = free.fval;
    log::debug!("profile '{name}': hat={hat:.6}, nll_hat={nll_hat:.6}");

    let mut points = Vec::with_capacity(values.len());
    for &value in values {
        let mut init = free.parameters.clone();
        init[index] = value;
        let pinned = Pinned { inner: model, index, value, init };
        let fixed = mle.fit_minimum(&pinned)?;

        points.push(ProfilePoint {
            value,
            nll: fixed.fval,
            delta_twice_nll: (2.0 * (fixed.fval - nll_hat)).max(0.0),
            converged: fixed.converged,
            n_iter: fixed.n_iter,
        });
    }

    Ok(ProfileScan { index, name, hat, nll_hat, points })
}

/// `n` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}
