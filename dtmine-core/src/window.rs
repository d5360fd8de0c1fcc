//! Fixed-length training windows.
use crate::{error::DtError, returns::checked_discount_cumsum, Episode};
use anyhow::Result;
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};

/// Value of the done channel at padded positions.
///
/// Real done flags are 0 or 1, so padding stays distinguishable.
pub const DONE_PADDING: i8 = 2;

/// Parameters of window extraction.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowSpec {
    /// Dimension of observation vectors.
    pub state_dim: usize,

    /// Dimension of action vectors.
    pub act_dim: usize,

    /// Number of timesteps in a window.
    pub sequence_length: usize,

    /// Timesteps are clamped to `max_ep_len - 1`.
    pub max_ep_len: usize,

    /// Discount factor of returns-to-go.
    pub gamma: f64,

    /// Returns-to-go are divided by this value.
    pub scale: f64,
}

/// A left-padded slice of one episode.
///
/// Every field has `sequence_length` rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// `[sequence_length, state_dim]`
    pub states: Array2<f32>,

    /// `[sequence_length, act_dim]`
    pub actions: Array2<f32>,

    /// `[sequence_length, 1]`
    pub rewards: Array2<f32>,

    /// `[sequence_length]`, [`DONE_PADDING`] at padded positions.
    pub dones: Array1<i8>,

    /// `[sequence_length, 1]`, already divided by the scale.
    pub returns_to_go: Array2<f32>,

    /// `[sequence_length]`
    pub timesteps: Array1<i64>,

    /// `[sequence_length]`, 1 for real positions and 0 for padding.
    pub attention_mask: Array1<f32>,
}

impl Window {
    /// Number of real (unpadded) timesteps.
    pub fn tlen(&self) -> usize {
        self.attention_mask.iter().filter(|m| **m > 0.0).count()
    }
}

/// Extracts the window starting at `si` from `episode`.
///
/// Returns-to-go are computed over the whole episode before slicing.
pub fn sample_window(episode: &Episode, si: usize, spec: &WindowSpec) -> Result<Window> {
    episode.validate()?;
    episode.check_dims(spec.state_dim, spec.act_dim)?;
    let rtg = checked_discount_cumsum(&episode.rewards().to_vec(), spec.gamma)?;
    window_with_returns(episode, si, &rtg, spec)
}

/// Extracts a window given precomputed returns-to-go of the whole episode.
pub(crate) fn window_with_returns(
    episode: &Episode,
    si: usize,
    rtg: &[f64],
    spec: &WindowSpec,
) -> Result<Window> {
    let n = episode.len();
    if si >= n && !(n == 0 && si == 0) {
        return Err(DtError::StartIndexOutOfRange { index: si, len: n }.into());
    }

    let len = spec.sequence_length;
    let end = (si + len).min(n);
    let tlen = end - si;
    let pad = len - tlen;

    let mut states = Array2::zeros((len, spec.state_dim));
    let mut actions = Array2::zeros((len, spec.act_dim));
    let mut rewards = Array2::zeros((len, 1));
    let mut dones = Array1::from_elem(len, DONE_PADDING);
    if tlen > 0 {
        states
            .slice_mut(s![pad.., ..])
            .assign(&episode.obs().slice(s![si..end, ..]));
        actions
            .slice_mut(s![pad.., ..])
            .assign(&episode.acts().slice(s![si..end, ..]));
        rewards
            .slice_mut(s![pad.., 0])
            .assign(&episode.rewards().slice(s![si..end]));
        dones
            .slice_mut(s![pad..])
            .assign(&episode.dones().slice(s![si..end]));
    }

    // At an episode boundary the returns slice may come up short of the state
    // slice; it is completed with zeros before left padding.
    let mut rtg_slice = rtg[si.min(rtg.len())..(si + len).min(rtg.len())].to_vec();
    rtg_slice.resize(tlen, 0.0);
    let mut returns_to_go = Array2::zeros((len, 1));
    for (i, v) in rtg_slice.iter().enumerate() {
        returns_to_go[[pad + i, 0]] = (v / spec.scale) as f32;
    }

    let last_timestep = spec.max_ep_len.saturating_sub(1) as i64;
    let timesteps = (si..si + len)
        .map(|t| (t as i64).min(last_timestep))
        .collect::<Array1<i64>>();

    let mut attention_mask = Array1::zeros(len);
    attention_mask.slice_mut(s![pad..]).fill(1.0);

    Ok(Window {
        states,
        actions,
        rewards,
        dones,
        returns_to_go,
        timesteps,
        attention_mask,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec(sequence_length: usize, max_ep_len: usize) -> WindowSpec {
        WindowSpec {
            state_dim: 2,
            act_dim: 3,
            sequence_length,
            max_ep_len,
            gamma: 1.0,
            scale: 1.0,
        }
    }

    fn episode(n: usize) -> Episode {
        Episode::from_vecs(
            2,
            3,
            (0..n).map(|t| vec![t as f32, -(t as f32)]).collect(),
            (0..n).map(|t| vec![(t % 5) as f32, 1.0, 0.0]).collect(),
            vec![1.0; n],
            (0..n).map(|t| (t + 1 == n) as i8).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_full_window_has_no_padding() -> Result<()> {
        let ep = episode(10);
        let w = sample_window(&ep, 3, &spec(4, 100))?;
        assert_eq!(w.attention_mask.to_vec(), vec![1.0; 4]);
        assert_eq!(w.tlen(), 4);
        assert_eq!(w.states[[0, 0]], 3.0);
        assert_eq!(w.states[[3, 1]], -6.0);
        assert_eq!(w.timesteps.to_vec(), vec![3, 4, 5, 6]);
        assert!(w.dones.iter().all(|d| *d != DONE_PADDING));
        // undiscounted returns of ten unit rewards
        assert_eq!(w.returns_to_go.column(0).to_vec(), vec![7.0, 6.0, 5.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_short_episode_is_left_padded() -> Result<()> {
        let ep = episode(2);
        let w = sample_window(&ep, 0, &spec(4, 100))?;
        assert_eq!(w.attention_mask.to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(w.dones.to_vec(), vec![2, 2, 0, 1]);
        assert_eq!(w.states.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(w.states.row(3).to_vec(), vec![1.0, -1.0]);
        assert_eq!(w.rewards.column(0).to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(w.returns_to_go.column(0).to_vec(), vec![0.0, 0.0, 2.0, 1.0]);
        // timesteps are not padded
        assert_eq!(w.timesteps.to_vec(), vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_tail_window() -> Result<()> {
        let ep = episode(5);
        let w = sample_window(&ep, 3, &spec(4, 100))?;
        assert_eq!(w.tlen(), 2);
        assert_eq!(w.attention_mask.to_vec(), vec![0.0, 0.0, 1.0, 1.0]);
        assert_eq!(w.dones.to_vec(), vec![2, 2, 0, 1]);
        assert_eq!(w.states.row(2).to_vec(), vec![3.0, -3.0]);
        Ok(())
    }

    #[test]
    fn test_timesteps_are_clamped() -> Result<()> {
        let ep = episode(10);
        let w = sample_window(&ep, 4, &spec(4, 6))?;
        assert_eq!(w.timesteps.to_vec(), vec![4, 5, 5, 5]);
        Ok(())
    }

    #[test]
    fn test_returns_are_scaled_and_discounted() -> Result<()> {
        let ep = episode(3);
        let mut spec = spec(3, 100);
        spec.gamma = 0.5;
        spec.scale = 0.5;
        let w = sample_window(&ep, 0, &spec)?;
        assert_eq!(w.returns_to_go.column(0).to_vec(), vec![3.5, 3.0, 2.0]);
        Ok(())
    }

    #[test]
    fn test_empty_episode_is_all_padding() -> Result<()> {
        let ep = Episode::from_vecs(2, 3, vec![], vec![], vec![], vec![])?;
        let w = sample_window(&ep, 0, &spec(3, 100))?;
        assert_eq!(w.tlen(), 0);
        assert_eq!(w.dones.to_vec(), vec![2, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_start_index_out_of_range() {
        let ep = episode(3);
        let err = sample_window(&ep, 3, &spec(4, 100)).unwrap_err();
        assert_eq!(
            err.downcast::<DtError>().unwrap(),
            DtError::StartIndexOutOfRange { index: 3, len: 3 }
        );
    }
}
