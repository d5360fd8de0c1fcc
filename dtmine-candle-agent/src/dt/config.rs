//! Configuration of [`DtModel`](super::DtModel).
use super::{ActionGroups, SamplingConfig};
use crate::{opt::OptimizerConfig, Device};
use anyhow::Result;
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_seed() -> u64 {
    42
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`DtModel`](super::DtModel).
///
/// The type parameter `C` is the configuration of the backbone.
pub struct DtModelConfig<C> {
    /// Configuration of the backbone. Building fails if `None`.
    pub backbone_config: Option<C>,

    /// Widths of the button, camera and esc logit groups.
    pub action_groups: ActionGroups,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub opt_config: OptimizerConfig,

    /// Upper bound of the global gradient norm. No clipping if `None`.
    #[serde(default)]
    pub max_grad_norm: Option<f64>,

    /// Seed of the random generator used for action sampling.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Device of the parameters, CPU if `None`.
    #[serde(default)]
    pub device: Option<Device>,
}

impl<C> DtModelConfig<C>
where
    C: DeserializeOwned + Serialize + Clone,
{
    /// Creates a configuration with the given action groups and no backbone.
    pub fn new(action_groups: ActionGroups) -> Self {
        Self {
            backbone_config: None,
            action_groups,
            sampling: SamplingConfig::default(),
            opt_config: OptimizerConfig::default(),
            max_grad_norm: None,
            seed: default_seed(),
            device: None,
        }
    }

    /// Sets the configuration of the backbone.
    pub fn backbone_config(mut self, v: C) -> Self {
        self.backbone_config = Some(v);
        self
    }

    /// Sets the sampling configuration.
    pub fn sampling(mut self, v: SamplingConfig) -> Self {
        self.sampling = v;
        self
    }

    /// Sets optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the gradient clipping threshold.
    pub fn max_grad_norm(mut self, v: f64) -> Self {
        self.max_grad_norm = Some(v);
        self
    }

    /// Sets the seed.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Sets device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Constructs [`DtModelConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ = path.as_ref().to_owned();
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        info!("Load config of DT model from {:?}", path_);
        Ok(b)
    }

    /// Saves [`DtModelConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path_ = path.as_ref().to_owned();
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        info!("Save config of DT model into {:?}", path_);
        Ok(())
    }
}
