//! JSON input mirroring a template's `DATA_VECTOR` / `PARAMETER` blocks.
//!
//! ```json
//! { "data": { "y_i": [1.0, 2.0, 3.0] }, "parameters": { "mean": 0.0, "log_sd": 0.0 } }
//! ```
//!
//! `parameters` is optional; without it the fit starts from the sample moments.

use anyhow::{Context, Result};
use nl_inference::{NormalModel, OptimizerConfig};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataBlock {
    pub y_i: Vec<f64>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterBlock {
    pub mean: f64,
    pub log_sd: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelInput {
    pub data: DataBlock,
    #[serde(default)]
    pub parameters: Option<ParameterBlock>,
}

impl ModelInput {
    pub fn into_model(self) -> NormalModel {
        let model = NormalModel::new(self.data.y_i);
        match self.parameters {
            Some(p) => model.with_init(p.mean, p.log_sd),
            None => model,
        }
    }
}

pub fn load_model(path: &Path, parallel: bool) -> Result<NormalModel> {
    tracing::info!(path = %path.display(), "loading model input");
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    let input: ModelInput = serde_json::from_str(&json)
        .with_context(|| format!("invalid model input {}", path.display()))?;
    let model = input.into_model().with_parallel(parallel);
    tracing::info!(n_obs = model.n_obs(), "model loaded");
    Ok(model)
}

pub fn load_config(path: Option<&Path>) -> Result<OptimizerConfig> {
    let config = match path {
        Some(p) => {
            let json = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config {}", p.display()))?;
            serde_json::from_str(&json)
                .with_context(|| format!("invalid optimizer config {}", p.display()))?
        }
        None => OptimizerConfig::default(),
    };
    config.validate()?;
    tracing::debug!(?config, "optimizer config");
    Ok(config)
}
