//! Recorded episode.
use crate::error::DtError;
use anyhow::Result;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// One recorded trajectory of environment interaction.
///
/// Rows of `obs` and `acts` are timesteps. All four fields share the same number of
/// timesteps; this is checked on construction and again before collation, as episodes
/// may also arrive through deserialization.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Episode {
    obs: Array2<f32>,
    acts: Array2<f32>,
    rewards: Array1<f32>,
    dones: Array1<i8>,
}

impl Episode {
    /// Constructs an episode from arrays.
    pub fn new(
        obs: Array2<f32>,
        acts: Array2<f32>,
        rewards: Array1<f32>,
        dones: Array1<i8>,
    ) -> Result<Self> {
        let episode = Self {
            obs,
            acts,
            rewards,
            dones,
        };
        episode.validate()?;
        Ok(episode)
    }

    /// Constructs an episode from per-timestep vectors.
    ///
    /// Every observation must have `state_dim` elements and every action `act_dim`.
    pub fn from_vecs(
        state_dim: usize,
        act_dim: usize,
        obs: Vec<Vec<f32>>,
        acts: Vec<Vec<f32>>,
        rewards: Vec<f32>,
        dones: Vec<i8>,
    ) -> Result<Self> {
        let obs = rows_to_array("obs", state_dim, obs)?;
        let acts = rows_to_array("acts", act_dim, acts)?;
        Self::new(obs, acts, Array1::from(rewards), Array1::from(dones))
    }

    /// Checks that all fields have the same number of timesteps.
    pub fn validate(&self) -> Result<(), DtError> {
        let n = self.rewards.len();
        if self.obs.nrows() != n {
            return Err(DtError::shape("obs", n, self.obs.nrows()));
        }
        if self.acts.nrows() != n {
            return Err(DtError::shape("acts", n, self.acts.nrows()));
        }
        if self.dones.len() != n {
            return Err(DtError::shape("dones", n, self.dones.len()));
        }
        Ok(())
    }

    /// Checks the feature widths against the given dimensions.
    ///
    /// Empty episodes carry no rows and pass regardless of their column count.
    pub fn check_dims(&self, state_dim: usize, act_dim: usize) -> Result<(), DtError> {
        if self.is_empty() {
            return Ok(());
        }
        if self.obs.ncols() != state_dim {
            return Err(DtError::shape("obs width", state_dim, self.obs.ncols()));
        }
        if self.acts.ncols() != act_dim {
            return Err(DtError::shape("acts width", act_dim, self.acts.ncols()));
        }
        Ok(())
    }

    /// Returns the number of timesteps.
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    /// Returns `true` if the episode has no timesteps.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sum of rewards.
    pub fn total_reward(&self) -> f32 {
        self.rewards.sum()
    }

    /// Observations, one row per timestep.
    pub fn obs(&self) -> &Array2<f32> {
        &self.obs
    }

    /// Actions, one row per timestep.
    pub fn acts(&self) -> &Array2<f32> {
        &self.acts
    }

    /// Rewards.
    pub fn rewards(&self) -> &Array1<f32> {
        &self.rewards
    }

    /// Done flags.
    pub fn dones(&self) -> &Array1<i8> {
        &self.dones
    }
}

fn rows_to_array(field: &str, width: usize, rows: Vec<Vec<f32>>) -> Result<Array2<f32>> {
    let n = rows.len();
    let mut flat = Vec::with_capacity(n * width);
    for row in rows.into_iter() {
        if row.len() != width {
            return Err(DtError::shape(format!("{} width", field), width, row.len()).into());
        }
        flat.extend(row);
    }
    Ok(Array2::from_shape_vec((n, width), flat)?)
}
