//! Maximum Likelihood Estimation

use crate::optimizer::{LbfgsOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use nalgebra::DMatrix;
use nl_core::traits::LogDensityModel;
use nl_core::{Error, FitResult, Result};

/// Check for identifiability issues based on the Hessian and uncertainties.
///
/// Returns a list of human-readable warning strings (empty if model is well-identified).
pub fn identifiability_warnings(
    hessian: &DMatrix<f64>,
    param_names: &[String],
    uncertainties: &[f64],
) -> Vec<String> {
    let n = hessian.nrows();
    let mut warnings = Vec::new();

    if hessian.iter().any(|v| !v.is_finite()) {
        warnings.push("Hessian has non-finite entries: model is not identifiable".into());
        return warnings;
    }

    if n > 0 {
        match hessian.clone().try_svd(false, false, f64::EPSILON, 1000) {
            Some(svd) => {
                let svals = &svd.singular_values;
                let s_max = svals.iter().fold(0.0_f64, |a, &b| a.max(b));
                let s_min = svals.iter().fold(f64::INFINITY, |a, &b| a.min(b));
                if s_min > 0.0 {
                    let cond = s_max / s_min;
                    if cond > 1e8 {
                        warnings.push(format!(
                            "Hessian condition number = {:.1e}: model may be poorly identified",
                            cond
                        ));
                    }
                } else {
                    warnings.push("Hessian is singular: model is not identifiable".into());
                }
            }
            None => warnings.push("Hessian SVD did not converge".into()),
        }
    }

    for (name, &u) in param_names.iter().zip(uncertainties.iter()) {
        if !u.is_finite() {
            warnings.push(format!("Parameter '{}': uncertainty is {}", name, u));
        }
    }

    for (i, name) in param_names.iter().enumerate().take(n) {
        if hessian[(i, i)].abs() < ZERO_CURVATURE {
            warnings.push(format!(
                "Parameter '{}': near-zero Hessian diagonal, not identifiable",
                name
            ));
        }
    }

    warnings
}

/// Adapts a [`LogDensityModel`] to the optimizer's [`ObjectiveFunction`].
struct ModelObjective<'a, M: ?Sized> {
    model: &'a M,
}

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for ModelObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.model.nll(params)
    }

    fn gradient(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.model.grad_nll(params)
    }
}

/// Maximum Likelihood Estimator
///
/// Fits models by minimizing negative log-likelihood, then estimates the
/// covariance from the inverse Hessian at the minimum.
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create a new MLE with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create MLE with custom optimizer configuration
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Fit any [`LogDensityModel`] from its own starting point.
    ///
    /// Returns best-fit parameters, uncertainties, covariance, and fit diagnostics.
    pub fn fit<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<FitResult> {
        self.fit_from(model, &model.parameter_init())
    }

    /// Fit from an explicit starting point (warm-start) with full Hessian/covariance.
    pub fn fit_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<FitResult> {
        let opt = self.fit_minimum_from(model, initial_params)?;
        let n = opt.parameters.len();

        let hessian = self.compute_hessian(model, &opt.parameters)?;
        let diag_uncertainties = diagonal_uncertainties(&hessian);

        let base = |uncertainties: Vec<f64>| {
            FitResult::new(
                opt.parameters.clone(),
                uncertainties,
                opt.fval,
                opt.converged,
                opt.n_iter as usize,
                opt.n_fev,
                opt.n_gev,
            )
            .with_message(opt.message.clone())
        };

        let mut fr = match invert_hessian(&hessian) {
            Some(covariance) => {
                let variances: Vec<f64> = (0..n).map(|i| covariance[(i, i)]).collect();
                if variances.iter().all(|v| v.is_finite() && *v > 0.0) {
                    // nalgebra storage is column-major; the covariance is symmetric.
                    let cov_flat: Vec<f64> = covariance.iter().copied().collect();
                    base(variances.iter().map(|v| v.sqrt()).collect()).with_covariance(cov_flat)
                } else {
                    log::warn!("Invalid covariance diagonal; omitting covariance matrix");
                    base(diag_uncertainties)
                }
            }
            None => {
                log::warn!("Hessian inversion failed, using diagonal approximation");
                base(diag_uncertainties)
            }
        };

        let param_names = model.parameter_names();
        fr.warnings = identifiability_warnings(&hessian, &param_names, &fr.uncertainties);
        for w in &fr.warnings {
            log::warn!("{w}");
        }
        log::debug!(
            "fit: nll={:.6}, converged={}, n_iter={}, |grad|={:.3e}",
            fr.nll,
            fr.converged,
            fr.n_iter,
            opt.grad_norm()
        );

        Ok(fr)
    }

    /// Minimize NLL and return the optimizer result.
    ///
    /// Fast path: does not compute Hessian/covariance. Intended for repeated
    /// minimizations such as profile scans.
    pub fn fit_minimum<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
    ) -> Result<OptimizationResult> {
        self.fit_minimum_from(model, &model.parameter_init())
    }

    /// Minimize NLL from an explicit starting point (warm-start).
    pub fn fit_minimum_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<OptimizationResult> {
        if initial_params.len() != model.dim() {
            return Err(Error::Validation(format!(
                "fit_minimum_from: initial_params length {} != model.dim() {}",
                initial_params.len(),
                model.dim()
            )));
        }
        let bounds = model.parameter_bounds();
        let objective = ModelObjective { model };
        let optimizer = LbfgsOptimizer::new(self.config.clone());
        let first = optimizer.minimize(&objective, initial_params, &bounds);
        if matches!(&first, Ok(r) if r.converged) {
            return first;
        }

        let fallback = model
            .parameter_fallback_init()
            .filter(|f| f.len() == initial_params.len() && f.as_slice() != initial_params);
        let Some(fallback) = fallback else {
            return first;
        };
        match &first {
            Ok(r) => log::warn!("Fit did not converge ({}); retrying from fallback start", r.message),
            Err(e) => log::warn!("Fit failed ({e}); retrying from fallback start"),
        }

        match (first, optimizer.minimize(&objective, &fallback, &bounds)) {
            (_, Ok(retry)) if retry.converged => Ok(retry),
            (Ok(a), Ok(b)) => Ok(if b.fval < a.fval { b } else { a }),
            (Err(_), Ok(b)) => Ok(b),
            (first, Err(e)) => {
                log::debug!("Fallback fit failed: {e}");
                first
            }
        }
    }

    /// Run multiple independent fits in parallel using Rayon.
    ///
    /// Returns one `FitResult` per model, in input order.
    pub fn fit_batch<M: LogDensityModel>(&self, models: &[M]) -> Vec<Result<FitResult>> {
        use rayon::prelude::*;

        models.par_iter().map(|model| self.fit(model)).collect()
    }

    /// Hessian by forward differences of the analytical gradient, symmetrised.
    ///
    /// `H[:, j] ≈ (g(x + ε·e_j) − g(x)) / ε`, costing `N + 1` gradient evaluations.
    fn compute_hessian<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        best_params: &[f64],
    ) -> Result<DMatrix<f64>> {
        let n = best_params.len();
        let grad_center = model.grad_nll(best_params)?;

        let mut hessian = DMatrix::zeros(n, n);
        let mut shifted = best_params.to_vec();

        for j in 0..n {
            let eps = 1e-4 * best_params[j].abs().max(1.0);
            shifted[j] = best_params[j] + eps;
            let grad_plus = model.grad_nll(&shifted)?;
            shifted[j] = best_params[j];

            for i in 0..n {
                hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }
}

/// Curvature below this magnitude is treated as zero.
const ZERO_CURVATURE: f64 = 1e-12;

/// Smallest-to-largest singular value ratio below which a Hessian is rank deficient.
const RANK_TOLERANCE: f64 = 1e-14;

/// Invert the Hessian via damped Cholesky, falling back to LU.
///
/// Returns `None` if no inverse with positive finite variances exists. A
/// singular Hessian or one with a zero-curvature direction is never damped
/// into an inverse.
fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    let n = hessian.nrows();
    if n == 0 || hessian.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if (0..n).any(|i| hessian[(i, i)].abs() < ZERO_CURVATURE) {
        return None;
    }
    let svd = hessian.clone().try_svd(false, false, f64::EPSILON, 1000)?;
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if s_max.is_nan() || s_max <= 0.0 || s_min <= RANK_TOLERANCE * s_max {
        return None;
    }
    let identity = DMatrix::identity(n, n);

    // A numerically estimated Hessian can be slightly indefinite even at a true
    // minimum; damp the diagonal geometrically, scaled to the Hessian itself.
    let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

    let mut h_damped = hessian.clone();
    let mut damping = 0.0_f64;
    const MAX_ATTEMPTS: usize = 10;

    for attempt in 0..MAX_ATTEMPTS {
        if let Some(chol) = nalgebra::linalg::Cholesky::new(h_damped.clone()) {
            if attempt > 0 {
                log::debug!("Hessian needed diagonal damping {damping:.3e} to factorize");
            }
            return Some(chol.solve(&identity));
        }
        if attempt + 1 == MAX_ATTEMPTS {
            break;
        }
        let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
        for i in 0..n {
            h_damped[(i, i)] += next - damping;
        }
        damping = next;
    }

    let cov = h_damped.lu().try_inverse()?;
    (0..n).all(|i| cov[(i, i)].is_finite() && cov[(i, i)] > 0.0).then_some(cov)
}

/// Uncertainties from the Hessian diagonal alone (fallback).
///
/// A zero-curvature parameter has infinite uncertainty.
fn diagonal_uncertainties(hessian: &DMatrix<f64>) -> Vec<f64> {
    (0..hessian.nrows())
        .map(|i| {
            let h = hessian[(i, i)].abs();
            if h < ZERO_CURVATURE { f64::INFINITY } else { 1.0 / h.sqrt() }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normal_model::NormalModel;
    use approx::assert_relative_eq;

    fn sample() -> Vec<f64> {
        vec![9.8, 10.4, 11.1, 9.2, 10.0, 10.7, 8.9, 10.3, 9.6, 11.5, 10.2, 9.9]
    }

    #[test]
    fn test_fit_recovers_closed_form() {
        let model = NormalModel::new(sample()).with_init(9.0, 0.0);
        let [m_hat, ls_hat] = model.closed_form_mle().unwrap();

        let fr = MaximumLikelihoodEstimator::new().fit(&model).unwrap();
        assert!(fr.converged, "fit should converge: {}", fr.message);
        assert_relative_eq!(fr.parameters[0], m_hat, epsilon = 1e-4);
        assert_relative_eq!(fr.parameters[1], ls_hat, epsilon = 1e-4);
        assert_relative_eq!(fr.nll, crate::evaluate(&sample(), m_hat, ls_hat), epsilon = 1e-7);
        assert!(fr.warnings.is_empty(), "unexpected warnings: {:?}", fr.warnings);
    }

    #[test]
    fn test_fit_uncertainties_match_fisher_information() {
        // At the MLE: Var(mean) = sd^2 / n, Var(log_sd) = 1 / (2n), no correlation.
        let y = sample();
        let n = y.len() as f64;
        let model = NormalModel::new(y).with_init(9.0, 0.0);
        let [_, ls_hat] = model.closed_form_mle().unwrap();
        let sd = ls_hat.exp();

        let fr = MaximumLikelihoodEstimator::new().fit(&model).unwrap();
        assert!(fr.covariance.is_some());
        assert_relative_eq!(fr.uncertainties[0], sd / n.sqrt(), max_relative = 1e-3);
        assert_relative_eq!(fr.uncertainties[1], 1.0 / (2.0 * n).sqrt(), max_relative = 1e-3);
        assert!(fr.correlation(0, 1).unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_fit_from_warm_start() {
        let model = NormalModel::new(sample()).with_init(9.0, 0.0);
        let [m_hat, ls_hat] = model.closed_form_mle().unwrap();
        let mle = MaximumLikelihoodEstimator::new();
        let cold = mle.fit(&model).unwrap();
        let warm = mle.fit_from(&model, &cold.parameters).unwrap();
        assert!(cold.converged && warm.converged);
        // |grad| <= 1e-6 with curvature ~ n / sd^2 pins the minimizer well inside 1e-6.
        assert_relative_eq!(cold.parameters[0], m_hat, epsilon = 1e-6);
        assert_relative_eq!(cold.parameters[1], ls_hat, epsilon = 1e-6);
        assert_relative_eq!(warm.parameters[0], cold.parameters[0], epsilon = 1e-6);
        assert_relative_eq!(warm.parameters[1], cold.parameters[1], epsilon = 1e-6);
        assert!(warm.n_iter <= cold.n_iter);
    }

    #[test]
    fn test_converged_fit_meets_gradient_tolerance() {
        let mle = MaximumLikelihoodEstimator::new();
        let tol = mle.config().tol;
        for init in [(9.0, 0.0), (12.0, 1.5), (10.0, -2.0)] {
            let model = NormalModel::new(sample()).with_init(init.0, init.1);
            let opt = mle.fit_minimum(&model).unwrap();
            assert!(opt.converged, "init {init:?}: {}", opt.message);
            assert!(opt.grad_norm() <= tol, "init {init:?}: |grad|={:.3e}", opt.grad_norm());
        }
    }

    #[test]
    fn test_far_start_recovers_from_fallback() {
        // From (0, 0) the first step toward data near 1e4 overflows exp(log_sd).
        let y: Vec<f64> = sample().iter().map(|v| v + 9_990.0).collect();
        let model = NormalModel::new(y).with_init(0.0, 0.0);
        let [m_hat, ls_hat] = model.closed_form_mle().unwrap();

        let fr = MaximumLikelihoodEstimator::new().fit(&model).unwrap();
        assert!(fr.converged, "{}", fr.message);
        assert_relative_eq!(fr.parameters[0], m_hat, epsilon = 1e-6);
        assert_relative_eq!(fr.parameters[1], ls_hat, epsilon = 1e-6);
        assert!(fr.covariance.is_some());
    }

    #[test]
    fn test_fit_minimum_rejects_wrong_init_length() {
        let model = NormalModel::new(sample());
        let mle = MaximumLikelihoodEstimator::new();
        assert!(matches!(mle.fit_minimum_from(&model, &[0.0]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_data_is_flagged_not_identifiable() {
        let model = NormalModel::new(vec![]);
        let fr = MaximumLikelihoodEstimator::new().fit(&model).unwrap();
        assert_eq!(fr.nll, 0.0);
        assert_eq!(fr.parameters, vec![0.0, 0.0]);
        assert!(fr.covariance.is_none(), "zero Hessian must not yield a covariance");
        assert!(fr.uncertainties.iter().all(|u| u.is_infinite()), "{:?}", fr.uncertainties);
        assert!(fr.warnings.iter().any(|w| w.contains("not identifiable")), "{:?}", fr.warnings);
    }

    #[test]
    fn test_fit_batch_preserves_order() {
        let models: Vec<NormalModel> = (0..4)
            .map(|k| NormalModel::new(sample().iter().map(|v| v + k as f64).collect()))
            .collect();
        let results = MaximumLikelihoodEstimator::new().fit_batch(&models);
        assert_eq!(results.len(), 4);
        for (k, (model, r)) in models.iter().zip(results).enumerate() {
            let fr = r.unwrap();
            let [m_hat, _] = model.closed_form_mle().unwrap();
            assert_relative_eq!(fr.parameters[0], m_hat, epsilon = 1e-4);
            assert_relative_eq!(fr.parameters[0], 10.0 + k as f64, epsilon = 0.5);
        }
    }

    #[test]
    fn test_invert_hessian_diagonal() {
        let h = DMatrix::from_row_slice(2, 2, &[4.0, 0.0, 0.0, 0.25]);
        let cov = invert_hessian(&h).unwrap();
        assert_relative_eq!(cov[(0, 0)], 0.25, epsilon = 1e-12);
        assert_relative_eq!(cov[(1, 1)], 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invert_hessian_refuses_singular() {
        assert!(invert_hessian(&DMatrix::zeros(2, 2)).is_none());
        let rank_one = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        assert!(invert_hessian(&rank_one).is_none());
        let flat_direction = DMatrix::from_row_slice(2, 2, &[3.0, 0.0, 0.0, 0.0]);
        assert!(invert_hessian(&flat_direction).is_none());
        assert_eq!(diagonal_uncertainties(&flat_direction)[1], f64::INFINITY);
    }

    #[test]
    fn test_invert_hessian_rejects_non_finite() {
        let h = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        assert!(invert_hessian(&h).is_none());
        assert!(invert_hessian(&DMatrix::zeros(0, 0)).is_none());
    }

    #[test]
    fn test_identifiability_warnings_singular() {
        let h = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let names = vec!["a".to_string(), "b".to_string()];
        let w = identifiability_warnings(&h, &names, &[1.0, f64::INFINITY]);
        assert!(w.iter().any(|s| s.contains("singular") || s.contains("condition number")));
        assert!(w.iter().any(|s| s.contains("'b'") && s.contains("inf")));
    }

    #[test]
    fn test_identifiability_warnings_non_finite_hessian() {
        let h = DMatrix::from_row_slice(1, 1, &[f64::NAN]);
        let w = identifiability_warnings(&h, &["a".to_string()], &[1.0]);
        assert_eq!(w.len(), 1);
        assert!(w[0].contains("non-finite"));
    }

    #[test]
    fn test_well_conditioned_hessian_has_no_warnings() {
        let h = DMatrix::from_row_slice(2, 2, &[2.0, 0.1, 0.1, 3.0]);
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(identifiability_warnings(&h, &names, &[0.7, 0.6]).is_empty());
    }
}
