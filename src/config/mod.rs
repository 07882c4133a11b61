//! Run configuration, read from RON files. Every field has a default, so a
//! config file only needs to mention what it changes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::optim::Adam;
use crate::util::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub layer_sizes: Vec<usize>,
    pub param_scale: f64,
    pub step_size: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub test_batch_size: usize,
    pub shuffle: bool,
    pub seed: u64,
    pub data_dir: PathBuf,
    pub normalize_mean: f64,
    pub normalize_std: f64,
    /// use only the first `limit` examples of each split
    pub limit: Option<usize>,
    pub checkpoint: Option<PathBuf>,
    pub curves_plot: Option<PathBuf>,
    pub samples_plot: Option<PathBuf>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            layer_sizes: vec![784, 512, 512, 10],
            param_scale: 0.01,
            step_size: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            num_epochs: 8,
            batch_size: 128,
            test_batch_size: 1000,
            shuffle: true,
            seed: 0,
            data_dir: PathBuf::from("data/mnist"),
            normalize_mean: 0.1307,
            normalize_std: 0.3081,
            limit: None,
            checkpoint: None,
            curves_plot: None,
            samples_plot: None,
        }
    }
}

impl TrainConfig {
    pub fn adam(&self) -> Adam {
        Adam {
            step_size: self.step_size,
            beta1: self.beta1,
            beta2: self.beta2,
            eps: self.eps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    pub correlations: Vec<f64>,
    pub sigma_x: f64,
    pub sigma_y: f64,
    pub resolution: usize,
    pub output: PathBuf,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            correlations: vec![-0.8, 0.0, 0.8],
            sigma_x: 1.0,
            sigma_y: 1.0,
            resolution: 60,
            output: PathBuf::from("bivariate_normal.png"),
        }
    }
}

pub fn from_str<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    Ok(ron::from_str(content)?)
}

pub fn load<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    from_str(&fs::read_to_string(path)?)
}

/// `path` if given, defaults otherwise.
pub fn load_or_default<T: for<'de> Deserialize<'de> + Default>(path: Option<&Path>) -> Result<T> {
    match path {
        Some(path) => load(path),
        None => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_fields_use_defaults() {
        let config: TrainConfig = from_str("(num_epochs: 2, layer_sizes: [784, 64, 10], limit: Some(500))").unwrap();
        assert_eq!(config.num_epochs, 2);
        assert_eq!(config.layer_sizes, vec![784, 64, 10]);
        assert_eq!(config.limit, Some(500));
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.data_dir, PathBuf::from("data/mnist"));
    }

    #[test]
    fn density_config_parses() {
        let config: DensityConfig = from_str("(correlations: [0.5], output: \"out.png\")").unwrap();
        assert_eq!(config.correlations, vec![0.5]);
        assert_eq!(config.output, PathBuf::from("out.png"));
        assert_eq!(config.resolution, 60);
    }

    #[test]
    fn malformed_config_is_an_error() {
        assert!(from_str::<TrainConfig>("(num_epochs: \"many\")").is_err());
    }
}
