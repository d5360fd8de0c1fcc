//! Configuration of [`DecisionTransformer`](super::DecisionTransformer).
use anyhow::Result;
use dtmine_core::error::DtError;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

fn default_hidden_size() -> usize {
    128
}

fn default_n_layer() -> usize {
    3
}

fn default_n_head() -> usize {
    1
}

fn default_n_positions() -> usize {
    1024
}

fn default_max_ep_len() -> usize {
    4096
}

fn default_pdrop() -> f32 {
    0.1
}

fn default_layer_norm_epsilon() -> f64 {
    1e-5
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`DecisionTransformer`](super::DecisionTransformer).
pub struct DecisionTransformerConfig {
    /// Dimension of observation vectors.
    pub state_dim: usize,

    /// Dimension of action vectors.
    pub act_dim: usize,

    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,

    /// Number of transformer blocks.
    #[serde(default = "default_n_layer")]
    pub n_layer: usize,

    /// Number of attention heads.
    #[serde(default = "default_n_head")]
    pub n_head: usize,

    /// Width of the MLP in each block, `4 * hidden_size` if `None`.
    #[serde(default)]
    pub n_inner: Option<usize>,

    /// Number of token positions. Three tokens are used per timestep.
    #[serde(default = "default_n_positions")]
    pub n_positions: usize,

    /// Size of the timestep embedding table.
    #[serde(default = "default_max_ep_len")]
    pub max_ep_len: usize,

    #[serde(default = "default_pdrop")]
    pub embd_pdrop: f32,

    #[serde(default = "default_pdrop")]
    pub resid_pdrop: f32,

    #[serde(default = "default_pdrop")]
    pub attn_pdrop: f32,

    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f64,
}

impl DecisionTransformerConfig {
    /// Creates a configuration with default sizes.
    pub fn new(state_dim: usize, act_dim: usize) -> Self {
        Self {
            state_dim,
            act_dim,
            hidden_size: default_hidden_size(),
            n_layer: default_n_layer(),
            n_head: default_n_head(),
            n_inner: None,
            n_positions: default_n_positions(),
            max_ep_len: default_max_ep_len(),
            embd_pdrop: default_pdrop(),
            resid_pdrop: default_pdrop(),
            attn_pdrop: default_pdrop(),
            layer_norm_epsilon: default_layer_norm_epsilon(),
        }
    }

    /// Sets the hidden size.
    pub fn hidden_size(mut self, v: usize) -> Self {
        self.hidden_size = v;
        self
    }

    /// Sets the number of blocks.
    pub fn n_layer(mut self, v: usize) -> Self {
        self.n_layer = v;
        self
    }

    /// Sets the number of attention heads.
    pub fn n_head(mut self, v: usize) -> Self {
        self.n_head = v;
        self
    }

    /// Sets the number of token positions.
    pub fn n_positions(mut self, v: usize) -> Self {
        self.n_positions = v;
        self
    }

    /// Sets the size of the timestep embedding table.
    pub fn max_ep_len(mut self, v: usize) -> Self {
        self.max_ep_len = v;
        self
    }

    /// Sets all dropout probabilities.
    pub fn dropout(mut self, p: f32) -> Self {
        self.embd_pdrop = p;
        self.resid_pdrop = p;
        self.attn_pdrop = p;
        self
    }

    /// Width of the MLP in each block.
    pub fn inner_dim(&self) -> usize {
        self.n_inner.unwrap_or(4 * self.hidden_size)
    }

    /// Checks the ranges of the values.
    pub fn check(&self) -> Result<(), DtError> {
        if self.state_dim == 0 || self.act_dim == 0 {
            return Err(DtError::InvalidConfig(
                "state_dim and act_dim must be positive".into(),
            ));
        }
        if self.n_head == 0 || self.hidden_size % self.n_head != 0 {
            return Err(DtError::InvalidConfig(format!(
                "hidden_size {} is not divisible by n_head {}",
                self.hidden_size, self.n_head
            )));
        }
        if self.n_positions < 3 {
            return Err(DtError::InvalidConfig(format!(
                "n_positions must hold at least one timestep, got {}",
                self.n_positions
            )));
        }
        if self.max_ep_len == 0 {
            return Err(DtError::InvalidConfig("max_ep_len must be positive".into()));
        }
        Ok(())
    }

    /// Constructs [`DecisionTransformerConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DecisionTransformerConfig`] as YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
