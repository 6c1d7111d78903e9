//! Normal distribution utilities.

use nl_ad::scalar::Scalar;
use nl_core::{Error, Result};

/// Natural log of `sqrt(2π)`.
///
/// `ln(sqrt(2π)) = 0.5*ln(2π)`.
pub const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Log-PDF of a Normal distribution `N(mu, sigma)` at `x`.
///
/// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
pub fn logpdf(x: f64, mu: f64, sigma: f64) -> Result<f64> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(Error::Validation(format!("sigma must be finite and > 0, got {}", sigma)));
    }
    Ok(logpdf_generic(x, mu, sigma))
}

/// Unchecked log-PDF, generic over the scalar type so derivatives flow through
/// `mu` and `sigma`.
///
/// Non-finite or non-positive `sigma` follows IEEE arithmetic (NaN / ±inf).
#[inline]
pub fn logpdf_generic<S: Scalar>(x: f64, mu: S, sigma: S) -> S {
    let z = (S::from_f64(x) - mu) / sigma;
    S::from_f64(-0.5) * z * z - sigma.ln() - S::from_f64(LN_SQRT_2PI)
}
