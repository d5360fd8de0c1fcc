//! Batch of windows.
use crate::{error::DtError, Window};
use anyhow::Result;
use ndarray::{stack, Array2, Array3, ArrayView1, ArrayView2, Axis};

/// Windows concatenated along a leading batch axis.
///
/// All fields share the batch dimension; the remaining dimensions are those of
/// [`Window`].
#[derive(Debug, Clone, PartialEq)]
pub struct DtBatch {
    /// `[batch, sequence_length, state_dim]`
    pub states: Array3<f32>,

    /// `[batch, sequence_length, act_dim]`
    pub actions: Array3<f32>,

    /// `[batch, sequence_length, 1]`
    pub rewards: Array3<f32>,

    /// `[batch, sequence_length]`
    pub dones: Array2<i8>,

    /// `[batch, sequence_length, 1]`
    pub returns_to_go: Array3<f32>,

    /// `[batch, sequence_length]`
    pub timesteps: Array2<i64>,

    /// `[batch, sequence_length]`
    pub attention_mask: Array2<f32>,

    /// Asks the model for a training loss. Always `true` for collated batches.
    pub return_loss: bool,
}

impl DtBatch {
    /// Stacks windows in the given order.
    pub fn from_windows(windows: &[Window]) -> Result<Self> {
        if windows.is_empty() {
            return Err(DtError::EmptyBatch.into());
        }

        let states = stack(
            Axis(0),
            &windows.iter().map(|w| w.states.view()).collect::<Vec<ArrayView2<_>>>(),
        )?;
        let actions = stack(
            Axis(0),
            &windows.iter().map(|w| w.actions.view()).collect::<Vec<ArrayView2<_>>>(),
        )?;
        let rewards = stack(
            Axis(0),
            &windows.iter().map(|w| w.rewards.view()).collect::<Vec<ArrayView2<_>>>(),
        )?;
        let dones = stack(
            Axis(0),
            &windows.iter().map(|w| w.dones.view()).collect::<Vec<ArrayView1<_>>>(),
        )?;
        let returns_to_go = stack(
            Axis(0),
            &windows
                .iter()
                .map(|w| w.returns_to_go.view())
                .collect::<Vec<ArrayView2<_>>>(),
        )?;
        let timesteps = stack(
            Axis(0),
            &windows.iter().map(|w| w.timesteps.view()).collect::<Vec<ArrayView1<_>>>(),
        )?;
        let attention_mask = stack(
            Axis(0),
            &windows
                .iter()
                .map(|w| w.attention_mask.view())
                .collect::<Vec<ArrayView1<_>>>(),
        )?;

        Ok(Self {
            states,
            actions,
            rewards,
            dones,
            returns_to_go,
            timesteps,
            attention_mask,
            return_loss: true,
        })
    }

    /// Returns the batch size.
    pub fn len(&self) -> usize {
        self.states.shape()[0]
    }

    /// Returns `true` if the batch holds no windows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of timesteps per window.
    pub fn sequence_length(&self) -> usize {
        self.states.shape()[1]
    }
}
