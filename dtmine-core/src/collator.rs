//! Batch collation of episodes.
mod config;
use crate::{
    error::DtError, returns::checked_discount_cumsum, window::window_with_returns, DtBatch,
    Episode, Window,
};
use anyhow::Result;
pub use config::CollatorConfig;
use log::{debug, trace};
use rand::{distributions::WeightedIndex, prelude::Distribution, rngs::StdRng, SeedableRng};

/// Builds training batches from a list of episodes.
///
/// For every input episode, `minibatch_samples` start indices are drawn independently
/// with weights `sqrt(i + 1)`, which favours later positions in the episode. Windows
/// are concatenated in input order, so a fixed seed reproduces the batch.
pub struct EpisodeCollator {
    config: CollatorConfig,
    rng: StdRng,
}

impl EpisodeCollator {
    /// Constructs [`EpisodeCollator`].
    pub fn build(config: CollatorConfig) -> Result<Self> {
        config.check()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CollatorConfig {
        &self.config
    }

    /// Collates `episodes` into a batch of `minibatch_samples * episodes.len()` windows.
    ///
    /// A malformed episode fails the whole batch.
    pub fn collate(&mut self, episodes: &[Episode]) -> Result<DtBatch> {
        if episodes.is_empty() {
            return Err(DtError::EmptyBatch.into());
        }
        for ep in episodes.iter() {
            ep.validate()?;
            ep.check_dims(self.config.state_dim, self.config.act_dim)?;
        }

        // Length-proportional episode draw. Its result does not select the episodes
        // processed below; every input episode is used.
        let traj_lens = episodes.iter().map(|ep| ep.len() as f64);
        match WeightedIndex::new(traj_lens) {
            Ok(dist) => {
                let batch_inds = (0..self.config.minibatch_samples)
                    .map(|_| dist.sample(&mut self.rng))
                    .collect::<Vec<_>>();
                trace!("Episode draw (unused): {:?}", batch_inds);
            }
            Err(_) => trace!("All episodes are empty, skip episode draw"),
        }

        let spec = self.config.window_spec();
        let mut windows: Vec<Window> =
            Vec::with_capacity(episodes.len() * self.config.minibatch_samples);

        for ep in episodes.iter() {
            let rtg = checked_discount_cumsum(&ep.rewards().to_vec(), spec.gamma)?;
            let dist = start_index_distribution(ep.len(), spec.sequence_length)?;

            for _ in 0..self.config.minibatch_samples {
                let si = dist.sample(&mut self.rng);
                windows.push(window_with_returns(ep, si, &rtg, &spec)?);
            }
        }

        let batch = DtBatch::from_windows(&windows)?;
        debug!(
            "Collated {} windows from {} episodes",
            batch.len(),
            episodes.len()
        );
        Ok(batch)
    }
}

/// Weighted distribution over start indices `[0, max(1, len - sequence_length))`.
///
/// The population never is empty, so degenerate episodes get the single start index 0.
fn start_index_distribution(len: usize, sequence_length: usize) -> Result<WeightedIndex<f64>> {
    let length = len.saturating_sub(sequence_length).max(1);
    let weights = (1..=length).map(|i| (i as f64).sqrt());
    Ok(WeightedIndex::new(weights)?)
}
