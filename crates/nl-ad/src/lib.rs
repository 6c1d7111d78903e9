//! # nl-ad
//!
//! Automatic differentiation (AD) primitives for NormLik.
//!
//! Provides:
//! - **Forward-mode AD** via [`dual::Dual`] numbers (efficient for few parameters)
//! - [`Scalar`](scalar::Scalar) trait for writing an objective once over `f64` and `Dual`
//! - [`dual::gradient`] for the full gradient of a multi-parameter objective

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dual;
pub mod scalar;
