//! Delta-method standard errors for quantities derived from fitted parameters.
//!
//! A derived quantity `g(theta)` is written against [`Dual`] so its Jacobian
//! comes from forward-mode AD; its variance is `J Σ Jᵀ` with `Σ` the fit
//! covariance. The typical use is reporting `sd = exp(log_sd)` on the natural
//! scale after fitting on the log scale.

use nalgebra::{DMatrix, DVector};
use nl_ad::dual::{self, Dual};
use nl_core::{Error, FitResult, Result};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};
use std::fmt;

type DerivedFn = dyn Fn(&[Dual]) -> Dual + Send + Sync;

/// A named function of the parameter vector.
pub struct DerivedQuantity {
    name: String,
    f: Box<DerivedFn>,
}

impl DerivedQuantity {
    /// Wrap `f` under `name`.
    pub fn new(
        name: impl Into<String>,
        f: impl Fn(&[Dual]) -> Dual + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), f: Box::new(f) }
    }

    /// Quantity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value and Jacobian row at `params`.
    pub fn value_and_jacobian(&self, params: &[f64]) -> (f64, Vec<f64>) {
        dual::gradient(|p: &[Dual]| (self.f)(p), params)
    }
}

impl fmt::Debug for DerivedQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedQuantity").field("name", &self.name).finish_non_exhaustive()
    }
}

/// One reported quantity.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    /// Quantity name.
    pub name: String,
    /// Point estimate at the best fit.
    pub estimate: f64,
    /// Delta-method standard error.
    pub std_error: f64,
    /// Lower Wald bound.
    pub lower: f64,
    /// Upper Wald bound.
    pub upper: f64,
}

/// Delta-method report over a set of derived quantities.
#[derive(Debug, Clone, Serialize)]
pub struct SdReport {
    /// Two-sided confidence level of the Wald intervals.
    pub level: f64,
    /// Per-quantity results, in input order.
    pub entries: Vec<ReportEntry>,
}

impl SdReport {
    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Standard-normal quantile for a two-sided interval at `level`.
fn wald_z(level: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(Error::Validation(format!("level must be in (0, 1), got {level}")));
    }
    let std_normal = Normal::new(0.0, 1.0).map_err(|e| Error::Computation(e.to_string()))?;
    Ok(std_normal.inverse_cdf(0.5 + 0.5 * level))
}

/// Report each quantity in `quantities` at the best fit of `fit`.
///
/// Requires the fit covariance; a fit without one is rejected.
pub fn sdreport(fit: &FitResult, quantities: &[DerivedQuantity], level: f64) -> Result<SdReport> {
    let z = wald_z(level)?;
    let n = fit.parameters.len();
    let cov_flat = fit
        .covariance
        .as_ref()
        .ok_or_else(|| Error::Validation("sdreport requires a fit with covariance".into()))?;
    if cov_flat.len() != n * n {
        return Err(Error::Validation(format!(
            "covariance has {} entries, expected {}",
            cov_flat.len(),
            n * n
        )));
    }
    let cov = DMatrix::from_row_slice(n, n, cov_flat);

    let entries = quantities
        .iter()
        .map(|q| {
            let (estimate, jac) = q.value_and_jacobian(&fit.parameters);
            let j = DVector::from_vec(jac);
            let var = j.dot(&(&cov * &j));
            let std_error = if var.is_finite() { var.max(0.0).sqrt() } else { f64::NAN };
            ReportEntry {
                name: q.name.clone(),
                estimate,
                std_error,
                lower: estimate - z * std_error,
                upper: estimate + z * std_error,
            }
        })
        .collect();

    Ok(SdReport { level, entries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fit_with_cov(params: Vec<f64>, cov: Vec<f64>) -> FitResult {
        let unc = (0..params.len()).map(|i| cov[i * params.len() + i].sqrt()).collect();
        FitResult::new(params, unc, 0.0, true, 1, 1, 1).with_covariance(cov)
    }

    #[test]
    fn test_wald_z_95() {
        assert_relative_eq!(wald_z(0.95).unwrap(), 1.959_963_984_540_054, epsilon = 1e-9);
        assert!(wald_z(0.0).is_err());
        assert!(wald_z(1.0).is_err());
        assert!(wald_z(f64::NAN).is_err());
    }

    #[test]
    fn test_exp_of_log_scale_parameter() {
        // sd = exp(log_sd); se(sd) = sd * se(log_sd)
        let log_sd = 0.4_f64;
        let se_log_sd = 0.05_f64;
        let fit = fit_with_cov(vec![1.0, log_sd], vec![0.01, 0.0, 0.0, se_log_sd * se_log_sd]);
        let q = [DerivedQuantity::new("sd", |p: &[Dual]| p[1].exp())];

        let report = sdreport(&fit, &q, 0.95).unwrap();
        let sd = report.get("sd").unwrap();
        assert_relative_eq!(sd.estimate, log_sd.exp(), epsilon = 1e-12);
        assert_relative_eq!(sd.std_error, log_sd.exp() * se_log_sd, epsilon = 1e-12);
        assert!(sd.lower < sd.estimate && sd.estimate < sd.upper);
        assert!(report.get("missing").is_none());
    }

    #[test]
    fn test_linear_combination_uses_covariance() {
        // g = a + b: var = var_a + var_b + 2 cov_ab
        let fit = fit_with_cov(vec![2.0, 3.0], vec![0.04, 0.01, 0.01, 0.09]);
        let q = [DerivedQuantity::new("sum", |p: &[Dual]| p[0] + p[1])];
        let e = &sdreport(&fit, &q, 0.9).unwrap().entries[0];
        assert_relative_eq!(e.estimate, 5.0, epsilon = 1e-12);
        assert_relative_eq!(e.std_error, (0.04_f64 + 0.09 + 0.02).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_requires_covariance() {
        let fit = FitResult::new(vec![0.0], vec![1.0], 0.0, true, 1, 1, 1);
        let q = [DerivedQuantity::new("x", |p: &[Dual]| p[0])];
        assert!(matches!(sdreport(&fit, &q, 0.95), Err(Error::Validation(_))));
    }

    #[test]
    fn test_debug_shows_name() {
        let q = DerivedQuantity::new("sd", |p: &[Dual]| p[0]);
        assert!(format!("{q:?}").contains("sd"));
        assert_eq!(q.name(), "sd");
    }
}
