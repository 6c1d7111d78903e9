//! Probability building blocks for NormLik.
//!
//! - the normal log-density, checked (`f64`) and generic over [`nl_ad::scalar::Scalar`]
//! - the exp bijector between `log_sd` and `sd`

pub mod normal;
pub mod transforms;
