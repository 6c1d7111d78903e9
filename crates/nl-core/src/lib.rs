//! # nl-core
//!
//! Core types and traits shared by the NormLik crates:
//! - [`Error`] / [`Result`]
//! - [`traits::LogDensityModel`], the seam between models and inference
//! - [`FitResult`], the output of a maximum-likelihood fit

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::FitResult;

/// Workspace version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
