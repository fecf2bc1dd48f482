//! Boosting hyper-parameters.

use serde::{Deserialize, Serialize};

use prodcat_core::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoosterParams {
    /// Learning rate applied to every leaf value.
    pub eta: f32,
    pub max_depth: usize,
    /// Fraction of rows sampled per round.
    pub subsample: f32,
    /// Fraction of features sampled per tree.
    pub colsample_bytree: f32,
    pub num_rounds: usize,
    /// L2 regularization on leaf weights.
    pub lambda: f32,
    /// Minimum gain to make a split.
    pub gamma: f32,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f32,
    /// Maximum histogram bins per feature.
    pub max_bin: usize,
    pub seed: u64,
}

impl Default for BoosterParams {
    fn default() -> Self {
        Self {
            eta: 0.1,
            max_depth: 8,
            subsample: 0.8,
            colsample_bytree: 0.8,
            num_rounds: 50,
            lambda: 1.0,
            gamma: 0.0,
            min_child_weight: 1.0,
            max_bin: 256,
            seed: 42,
        }
    }
}

impl BoosterParams {
    pub fn validate(&self) -> Result<()> {
        let fraction = |name: &str, v: f32| {
            if v > 0.0 && v <= 1.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{} must be in (0, 1], got {}", name, v)))
            }
        };
        fraction("subsample", self.subsample)?;
        fraction("colsample_bytree", self.colsample_bytree)?;
        if self.eta <= 0.0 {
            return Err(Error::Config(format!("eta must be positive, got {}", self.eta)));
        }
        if self.max_depth == 0 || self.num_rounds == 0 {
            return Err(Error::Config("max_depth and num_rounds must be positive".into()));
        }
        if self.max_bin < 2 || self.max_bin >= usize::from(u16::MAX) {
            return Err(Error::Config(format!("max_bin must be in [2, 65535), got {}", self.max_bin)));
        }
        if self.lambda < 0.0 || self.gamma < 0.0 || self.min_child_weight < 0.0 {
            return Err(Error::Config("lambda, gamma and min_child_weight must be non-negative".into()));
        }
        Ok(())
    }
}
