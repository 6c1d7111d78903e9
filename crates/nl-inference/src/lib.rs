//! # nl-inference
//!
//! Maximum-likelihood inference for NormLik.
//!
//! This crate provides:
//! - the normal negative-log-likelihood objective ([`normal_model`])
//! - an L-BFGS optimizer wrapper over argmin ([`optimizer`])
//! - MLE with Hessian-based covariance ([`mle`])
//! - delta-method standard errors for derived quantities ([`sdreport`])
//! - profile likelihood scans ([`profile`])
//!
//! Inference code depends on the `LogDensityModel` trait from nl-core only.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Maximum-likelihood estimation via L-BFGS.
pub mod mle;
/// Normal-distribution NLL objective and model.
pub mod normal_model;
/// Generic numerical optimizer (L-BFGS backend).
pub mod optimizer;
/// Profile likelihood scans.
pub mod profile;
/// Delta-method reports for derived quantities.
pub mod sdreport;

pub use mle::MaximumLikelihoodEstimator;
pub use normal_model::{NormalModel, evaluate, evaluate_par, evaluate_with_grad, normal_nll};
pub use optimizer::{LbfgsOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
pub use profile::{ProfilePoint, ProfileScan};
pub use sdreport::{DerivedQuantity, SdReport, sdreport};
