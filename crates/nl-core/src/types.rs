//! Common data types for NormLik

use serde::{Deserialize, Serialize};

/// Fit result containing parameter estimates and uncertainties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitResult {
    /// Best-fit parameter values
    pub parameters: Vec<f64>,

    /// Parameter uncertainties (sqrt of covariance diagonal)
    pub uncertainties: Vec<f64>,

    /// Covariance matrix (row-major, N×N). `None` if Hessian inversion failed.
    pub covariance: Option<Vec<f64>>,

    /// Negative log-likelihood at minimum
    pub nll: f64,

    /// Convergence status
    pub converged: bool,

    /// Optimizer iterations
    pub n_iter: usize,

    /// Objective evaluations
    pub n_fev: usize,

    /// Gradient evaluations
    pub n_gev: usize,

    /// Optimizer termination message
    #[serde(default)]
    pub message: String,

    /// Identifiability warnings (empty when the model is well identified)
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl FitResult {
    /// Create a fit result without covariance.
    pub fn new(
        parameters: Vec<f64>,
        uncertainties: Vec<f64>,
        nll: f64,
        converged: bool,
        n_iter: usize,
        n_fev: usize,
        n_gev: usize,
    ) -> Self {
        Self {
            parameters,
            uncertainties,
            covariance: None,
            nll,
            converged,
            n_iter,
            n_fev,
            n_gev,
            message: String::new(),
            warnings: Vec::new(),
        }
    }

    /// Attach a row-major covariance matrix.
    pub fn with_covariance(mut self, covariance: Vec<f64>) -> Self {
        self.covariance = Some(covariance);
        self
    }

    /// Attach the optimizer termination message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Covariance element (i, j). `None` if covariance is unavailable or out of range.
    pub fn covariance_at(&self, i: usize, j: usize) -> Option<f64> {
        let cov = self.covariance.as_ref()?;
        let n = self.parameters.len();
        if i >= n || j >= n {
            return None;
        }
        Some(cov[i * n + j])
    }

    /// Get correlation matrix element (i, j). Returns `None` if covariance is unavailable.
    pub fn correlation(&self, i: usize, j: usize) -> Option<f64> {
        let c = self.covariance_at(i, j)?;
        let sigma_i = self.uncertainties[i];
        let sigma_j = self.uncertainties[j];
        if sigma_i <= 0.0 || sigma_j <= 0.0 {
            return None;
        }
        Some(c / (sigma_i * sigma_j))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_result() {
        let result = FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 123.45, true, 12, 20, 18);
        assert_eq!(result.parameters.len(), 2);
        assert_eq!(result.uncertainties.len(), 2);
        assert!(result.converged);
        assert!(result.covariance.is_none());
        assert!(result.correlation(0, 1).is_none());
    }

    #[test]
    fn test_correlation_from_covariance() {
        let cov = vec![0.01, 0.005, 0.005, 0.04];
        let result = FitResult::new(vec![1.0, 2.0], vec![0.1, 0.2], 0.0, true, 1, 1, 1)
            .with_covariance(cov);

        assert_relative_eq!(result.correlation(0, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(result.correlation(0, 1).unwrap(), 0.25, epsilon = 1e-12);
        assert!(result.correlation(0, 2).is_none());
    }

    #[test]
    fn test_serde_defaults_for_optional_fields() {
        let json = r#"{
            "parameters": [0.5], "uncertainties": [0.1], "covariance": null,
            "nll": 1.0, "converged": true, "n_iter": 3, "n_fev": 4, "n_gev": 4
        }"#;
        let r: FitResult = serde_json::from_str(json).unwrap();
        assert!(r.message.is_empty());
        assert!(r.warnings.is_empty());
    }
}
