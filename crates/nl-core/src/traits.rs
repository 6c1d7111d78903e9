//! Core traits for NormLik
//!
//! Inference code (optimizers, MLE, profile scans) is written against
//! [`LogDensityModel`] only, never against a concrete model type.

use crate::{Error, Result};

/// A model exposing a negative log-likelihood over a flat parameter vector.
pub trait LogDensityModel: Send + Sync {
    /// Number of parameters.
    fn dim(&self) -> usize;

    /// Parameter names, in parameter-vector order.
    fn parameter_names(&self) -> Vec<String>;

    /// Starting point for optimization.
    fn parameter_init(&self) -> Vec<f64>;

    /// Box bounds `(lo, hi)` per parameter. Unbounded parameters use infinities.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Data-driven starting point to retry from when a fit from the requested
    /// start does not converge. `None` if the model has none.
    fn parameter_fallback_init(&self) -> Option<Vec<f64>> {
        None
    }

    /// Negative log-likelihood at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;

    /// Gradient of the negative log-likelihood at `params`.
    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>>;

    /// Reject a parameter vector of the wrong length.
    fn check_dim(&self, params: &[f64]) -> Result<()> {
        if params.len() != self.dim() {
            return Err(Error::Validation(format!(
                "expected {} parameters, got {}",
                self.dim(),
                params.len()
            )));
        }
        Ok(())
    }
}

impl<M: LogDensityModel + ?Sized> LogDensityModel for &M {
    fn dim(&self) -> usize {
        (**self).dim()
    }

    fn parameter_names(&self) -> Vec<String> {
        (**self).parameter_names()
    }

    fn parameter_init(&self) -> Vec<f64> {
        (**self).parameter_init()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        (**self).parameter_bounds()
    }

    fn parameter_fallback_init(&self) -> Option<Vec<f64>> {
        (**self).parameter_fallback_init()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        (**self).nll(params)
    }

    fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
        (**self).grad_nll(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// f(x) = (x - 1)^2 / 2
    struct Parabola;

    impl LogDensityModel for Parabola {
        fn dim(&self) -> usize {
            1
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["x".into()]
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(f64::NEG_INFINITY, f64::INFINITY)]
        }

        fn nll(&self, params: &[f64]) -> Result<f64> {
            self.check_dim(params)?;
            Ok(0.5 * (params[0] - 1.0).powi(2))
        }

        fn grad_nll(&self, params: &[f64]) -> Result<Vec<f64>> {
            self.check_dim(params)?;
            Ok(vec![params[0] - 1.0])
        }
    }

    #[test]
    fn test_check_dim_rejects_wrong_length() {
        let m = Parabola;
        assert!(m.nll(&[1.0]).is_ok());
        assert!(matches!(m.nll(&[1.0, 2.0]), Err(Error::Validation(_))));
        assert!(matches!(m.grad_nll(&[]), Err(Error::Validation(_))));
    }

    #[test]
    fn test_reference_forwards() {
        let m = Parabola;
        let r = &m;
        assert_eq!(r.dim(), 1);
        assert_eq!(r.parameter_names(), vec!["x".to_string()]);
        assert_eq!(r.nll(&[3.0]).unwrap(), 2.0);
        assert!(r.parameter_fallback_init().is_none());
    }
}
