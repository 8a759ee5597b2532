use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SamplerError};

/// Sampler configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SamplerConfig {
    /// Upper bound on alternating-projection sweeps per sample.
    #[serde(default = "default_max_epochs")]
    pub max_epochs: usize,

    /// Stop once one epoch changes the candidate by less than this, relative
    /// to its norm. `0` runs all `max_epochs`.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Relative singular-value cutoff for the pseudo-inverse.
    /// Unset means `max(B, B)·ε` per batch.
    #[serde(default)]
    pub pinv_rtol: Option<f64>,

    /// Directory for persisted inverse caches. Unset keeps the cache in memory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Seed for the prior draws. Unset draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Sweep independent samples on the rayon pool.
    #[serde(default = "default_parallel_samples")]
    pub parallel_samples: bool,

    /// Show a progress bar while building the inverse cache.
    #[serde(default)]
    pub progress: bool,
}

fn default_max_epochs() -> usize {
    20
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_parallel_samples() -> bool {
    true
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_epochs: default_max_epochs(),
            tolerance: default_tolerance(),
            pinv_rtol: None,
            cache_dir: None,
            seed: None,
            parallel_samples: default_parallel_samples(),
            progress: false,
        }
    }
}

impl SamplerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: SamplerConfig = toml::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_epochs == 0 {
            return Err(SamplerError::Config("max_epochs must be at least 1".into()));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(SamplerError::Config(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        if let Some(rtol) = self.pinv_rtol {
            if !(rtol.is_finite() && rtol >= 0.0) {
                return Err(SamplerError::Config(format!(
                    "pinv_rtol must be finite and non-negative, got {rtol}"
                )));
            }
        }
        Ok(())
    }
}
