use std::{env, fs, num::NonZeroUsize, path::PathBuf};

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

/// The environment variable naming an optional JSON configuration file.
pub const CONFIG_VAR: &str = "CONFIG";

/// The optimizer updating the classifier's parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    #[default]
    Adam,
    GradientDescent,
}

/// Every knob of a training session. Missing fields take their default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    pub epochs: NonZeroUsize,
    pub learning_rate: f32,
    pub batch_size: NonZeroUsize,
    pub train_len: usize,
    pub test_len: usize,
    pub num_workers: usize,
    pub seed: Option<u64>,
    pub optimizer: OptimizerKind,
    pub checkpoint: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: NonZeroUsize::new(20).unwrap_or(NonZeroUsize::MIN),
            learning_rate: 1e-3,
            batch_size: NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN),
            train_len: 40_000,
            test_len: 10_000,
            num_workers: 2,
            seed: None,
            optimizer: OptimizerKind::default(),
            checkpoint: PathBuf::from("checkpoint.safetensors"),
        }
    }
}

impl TrainingConfig {
    /// Loads the configuration from the file named by `CONFIG`, or the defaults if it's unset.
    pub fn from_env() -> anyhow::Result<Self> {
        match env::var_os(CONFIG_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    /// Loads and validates the configuration stored as JSON in `path`.
    pub fn from_file(path: PathBuf) -> anyhow::Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;

        Self::from_json(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values serde can't: the learning rate must be a positive number.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }

        Ok(())
    }
}
