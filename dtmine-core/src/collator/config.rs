//! Configuration of [`EpisodeCollator`](super::EpisodeCollator).
use crate::{error::DtError, WindowSpec};
use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_gamma() -> f64 {
    1.0
}

fn default_scale() -> f64 {
    1.0
}

fn default_seed() -> u64 {
    42
}

/// Configuration of [`EpisodeCollator`](super::EpisodeCollator).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CollatorConfig {
    /// Dimension of observation vectors.
    pub state_dim: usize,

    /// Dimension of action vectors.
    pub act_dim: usize,

    /// Number of timesteps in a window.
    pub sequence_length: usize,

    /// Maximum episode length in the dataset.
    pub max_ep_len: usize,

    /// Number of windows drawn from each episode.
    pub minibatch_samples: usize,

    /// Discount factor of returns-to-go.
    #[serde(default = "default_gamma")]
    pub gamma: f64,

    /// Normalization of returns-to-go.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Seed of the random number generator.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for CollatorConfig {
    fn default() -> Self {
        Self {
            state_dim: 1,
            act_dim: 3,
            sequence_length: 20,
            max_ep_len: 4096,
            minibatch_samples: 1,
            gamma: default_gamma(),
            scale: default_scale(),
            seed: default_seed(),
        }
    }
}

impl CollatorConfig {
    /// Creates a configuration with the required dimensions, other values default.
    pub fn new(
        state_dim: usize,
        act_dim: usize,
        sequence_length: usize,
        max_ep_len: usize,
        minibatch_samples: usize,
    ) -> Self {
        Self {
            state_dim,
            act_dim,
            sequence_length,
            max_ep_len,
            minibatch_samples,
            ..Default::default()
        }
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the scale of returns-to-go.
    pub fn scale(mut self, v: f64) -> Self {
        self.scale = v;
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets the number of windows per episode.
    pub fn minibatch_samples(mut self, v: usize) -> Self {
        self.minibatch_samples = v;
        self
    }

    /// Checks the ranges of the values.
    ///
    /// `gamma = 0` is accepted and turns returns-to-go into plain rewards.
    pub fn check(&self) -> Result<(), DtError> {
        let positive = [
            ("state_dim", self.state_dim),
            ("act_dim", self.act_dim),
            ("sequence_length", self.sequence_length),
            ("max_ep_len", self.max_ep_len),
            ("minibatch_samples", self.minibatch_samples),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(DtError::InvalidConfig(format!("{} must be positive", name)));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DtError::InvalidConfig(format!(
                "gamma must be in [0, 1], got {}",
                self.gamma
            )));
        }
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(DtError::InvalidConfig(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Returns the part of the configuration used to cut windows.
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec {
            state_dim: self.state_dim,
            act_dim: self.act_dim,
            sequence_length: self.sequence_length,
            max_ep_len: self.max_ep_len,
            gamma: self.gamma,
            scale: self.scale,
        }
    }

    /// Loads [`CollatorConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of collator from {:?}", path_);
        Ok(b)
    }

    /// Saves [`CollatorConfig`] to YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of collator into {:?}", path_);
        Ok(())
    }
}
