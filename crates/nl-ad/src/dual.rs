//! Forward-mode automatic differentiation via dual numbers.
//!
//! A [`Dual`] carries a primal value and one tangent. Seeding one input with
//! [`Dual::var`] and the rest with [`Dual::constant`] yields the partial
//! derivative with respect to that input; [`gradient`] repeats this per input.

use std::iter::Sum;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A dual number for forward-mode AD.
///
/// `val` holds the primal value, `dot` holds the derivative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    /// Primal (function) value.
    pub val: f64,
    /// Tangent (derivative) value.
    pub dot: f64,
}

impl Dual {
    /// Create a constant (derivative = 0).
    #[inline]
    pub fn constant(val: f64) -> Self {
        Self { val, dot: 0.0 }
    }

    /// Create an independent variable (derivative = 1).
    #[inline]
    pub fn var(val: f64) -> Self {
        Self { val, dot: 1.0 }
    }

    /// Natural logarithm: d/dx ln(x) = 1/x.
    #[inline]
    pub fn ln(self) -> Self {
        Self { val: self.val.ln(), dot: self.dot / self.val }
    }

    /// Exponential: d/dx exp(x) = exp(x).
    #[inline]
    pub fn exp(self) -> Self {
        let e = self.val.exp();
        Self { val: e, dot: self.dot * e }
    }
}

// --- Arithmetic: Dual op Dual ---

impl Add for Dual {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self { val: self.val + rhs.val, dot: self.dot + rhs.dot }
    }
}

impl Sub for Dual {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self { val: self.val - rhs.val, dot: self.dot - rhs.dot }
    }
}

impl Mul for Dual {
    type Output = Self;
    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self { val: self.val * rhs.val, dot: self.dot * rhs.val + self.val * rhs.dot }
    }
}

impl Div for Dual {
    type Output = Self;
    #[inline]
    fn div(self, rhs: Self) -> Self {
        Self {
            val: self.val / rhs.val,
            dot: (self.dot * rhs.val - self.val * rhs.dot) / (rhs.val * rhs.val),
        }
    }
}

impl Neg for Dual {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self { val: -self.val, dot: -self.dot }
    }
}

// --- Sum ---

impl Sum for Dual {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Dual::constant(0.0), |acc, x| acc + x)
    }
}

/// Value and gradient of `f` at `x` by forward-mode AD.
///
/// Runs `f` once per coordinate, seeding that coordinate as the variable.
/// For an empty `x`, `f` is evaluated once on constants and the gradient is empty.
pub fn gradient<F>(f: F, x: &[f64]) -> (f64, Vec<f64>)
where
    F: Fn(&[Dual]) -> Dual,
{
    let mut seeded: Vec<Dual> = x.iter().map(|&v| Dual::constant(v)).collect();
    if x.is_empty() {
        return (f(&seeded).val, Vec::new());
    }

    let mut value = f64::NAN;
    let mut grad = Vec::with_capacity(x.len());
    for i in 0..x.len() {
        seeded[i].dot = 1.0;
        let out = f(&seeded);
        seeded[i].dot = 0.0;
        value = out.val;
        grad.push(out.dot);
    }
    (value, grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_has_zero_derivative() {
        let c = Dual::constant(5.0);
        assert_eq!(c.val, 5.0);
        assert_eq!(c.dot, 0.0);
    }

    #[test]
    fn test_var_has_unit_derivative() {
        let x = Dual::var(3.0);
        assert_eq!(x.val, 3.0);
        assert_eq!(x.dot, 1.0);
    }

    #[test]
    fn test_ln_exp_derivatives() {
        let y = Dual::var(2.0).ln();
        assert_relative_eq!(y.dot, 0.5, epsilon = 1e-15);

        let y = Dual::var(1.0).exp();
        assert_relative_eq!(y.val, 1.0_f64.exp(), epsilon = 1e-15);
        assert_relative_eq!(y.dot, 1.0_f64.exp(), epsilon = 1e-15);
    }

    #[test]
    fn test_quotient_rule() {
        // d/dx [1 / x^2] = -2 / x^3
        let x = Dual::var(2.0);
        let y = Dual::constant(1.0) / (x * x);
        assert_relative_eq!(y.val, 0.25, epsilon = 1e-15);
        assert_relative_eq!(y.dot, -0.25, epsilon = 1e-15);
    }

    #[test]
    fn test_negation_and_difference() {
        let x = Dual::var(3.0);
        let y = -(x * x) + x * Dual::constant(2.0);
        // -(x^2) + 2x at x = 3: value -3, derivative -2x + 2 = -4
        assert_relative_eq!(y.val, -3.0, epsilon = 1e-15);
        assert_relative_eq!(y.dot, -4.0, epsilon = 1e-15);
        let d = x - Dual::constant(1.0);
        assert_eq!((d.val, d.dot), (2.0, 1.0));
    }

    #[test]
    fn test_sum_starts_from_zero() {
        let empty: Dual = std::iter::empty().sum();
        assert_eq!((empty.val.to_bits(), empty.dot), (0.0_f64.to_bits(), 0.0));
        let total: Dual = [Dual::var(1.0), Dual::constant(2.5)].into_iter().sum();
        assert_eq!((total.val, total.dot), (3.5, 1.0));
    }

    #[test]
    fn test_gradient_of_two_parameter_function() {
        // f(a, b) = a^2 * exp(b); df/da = 2a exp(b), df/db = a^2 exp(b)
        let f = |p: &[Dual]| p[0] * p[0] * p[1].exp();
        let (v, g) = gradient(f, &[3.0, 0.5]);
        let e = 0.5_f64.exp();
        assert_relative_eq!(v, 9.0 * e, epsilon = 1e-12);
        assert_relative_eq!(g[0], 6.0 * e, epsilon = 1e-12);
        assert_relative_eq!(g[1], 9.0 * e, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_of_empty_input() {
        let (v, g) = gradient(|_| Dual::constant(7.0), &[]);
        assert_eq!(v, 7.0);
        assert!(g.is_empty());
    }
}
