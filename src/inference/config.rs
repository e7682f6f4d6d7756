//! Inference configuration

use crate::error::{KolosalError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of the built-in attribution provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Interventional attributions enumerate every feature subset up to this
    /// many features and fall back to permutation sampling beyond it
    pub max_exact_features: usize,

    /// Permutations drawn per record when sampling
    pub n_permutations: usize,

    /// Random seed; `None` draws from entropy
    pub seed: Option<u64>,

    /// Larger backgrounds are subsampled without replacement
    pub max_background_samples: Option<usize>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        Self {
            max_exact_features: 10,
            n_permutations: 200,
            seed: Some(42),
            max_background_samples: Some(1000),
        }
    }
}

impl ExplainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the exact-enumeration feature limit
    pub fn with_max_exact_features(mut self, n: usize) -> Self {
        self.max_exact_features = n;
        self
    }

    /// Builder method to set the number of sampled permutations
    pub fn with_n_permutations(mut self, n: usize) -> Self {
        self.n_permutations = n;
        self
    }

    /// Builder method to set the random seed
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Builder method to cap the background sample size
    pub fn with_max_background_samples(mut self, n: Option<usize>) -> Self {
        self.max_background_samples = n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        // 2^n subsets must stay addressable
        if self.max_exact_features > 20 {
            return Err(KolosalError::ConfigError(format!(
                "max_exact_features must be at most 20, got {}",
                self.max_exact_features
            )));
        }
        if self.n_permutations == 0 {
            return Err(KolosalError::ConfigError(
                "n_permutations must be positive".to_string(),
            ));
        }
        if self.max_background_samples == Some(0) {
            return Err(KolosalError::ConfigError(
                "max_background_samples must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for model inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Number of latency samples kept for percentile statistics
    pub metrics_window: usize,

    /// Attribution settings
    pub explainer: ExplainerConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            metrics_window: 10_000,
            explainer: ExplainerConfig::default(),
        }
    }
}

impl InferenceConfig {
    /// Create a new inference configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the latency window size
    pub fn with_metrics_window(mut self, window: usize) -> Self {
        self.metrics_window = window;
        self
    }

    /// Builder method to set the attribution settings
    pub fn with_explainer(mut self, explainer: ExplainerConfig) -> Self {
        self.explainer = explainer;
        self
    }

    /// Read a JSON configuration file; missing fields take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics_window == 0 {
            return Err(KolosalError::ConfigError(
                "metrics_window must be positive".to_string(),
            ));
        }
        self.explainer.validate()
    }
}
