//! Bijective transforms (bijectors) for unconstrained parameterization.
//!
//! Optimizers work in unconstrained space `z ∈ R`. A bijector maps between
//! unconstrained `z` and a constrained parameter `theta`.

use nl_ad::scalar::Scalar;

/// A bijective transform from unconstrained `z` to constrained `theta`.
pub trait Bijector: Send + Sync {
    /// Map unconstrained -> constrained: `theta = forward(z)`
    fn forward(&self, z: f64) -> f64;
    /// Map constrained -> unconstrained: `z = inverse(theta)`
    fn inverse(&self, theta: f64) -> f64;
}

/// Exp: `(-inf, inf) -> (0, inf)`, `theta = exp(z)`.
///
/// This is the map between a log-scale parameter and a positive scale.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExpBijector;

impl ExpBijector {
    /// [`Bijector::forward`] over any [`Scalar`], so AD flows through the map.
    #[inline]
    pub fn forward_scalar<S: Scalar>(z: S) -> S {
        z.exp()
    }
}

impl Bijector for ExpBijector {
    #[inline]
    fn forward(&self, z: f64) -> f64 {
        z.exp()
    }
    #[inline]
    fn inverse(&self, theta: f64) -> f64 {
        theta.ln()
    }
}
