use crate::{model::SequenceInput, util::array_to_tensor};
use anyhow::Result;
use candle_core::{Device, Tensor};
use dtmine_core::DtBatch;

/// A [`DtBatch`] moved to tensors on a device.
///
/// Floating point fields are f32; `dones` and `timesteps` are i64.
#[derive(Debug, Clone)]
pub struct DtTensorBatch {
    /// `[batch, sequence_length, state_dim]`
    pub states: Tensor,

    /// `[batch, sequence_length, act_dim]`
    pub actions: Tensor,

    /// `[batch, sequence_length, 1]`
    pub rewards: Tensor,

    /// `[batch, sequence_length]`, 2 at padded positions.
    pub dones: Tensor,

    /// `[batch, sequence_length, 1]`
    pub returns_to_go: Tensor,

    /// `[batch, sequence_length]`
    pub timesteps: Tensor,

    /// `[batch, sequence_length]`, 0 at padded positions.
    pub attention_mask: Tensor,

    /// Always `true` for training batches.
    pub return_loss: bool,
}

impl DtTensorBatch {
    /// Copies a batch to `device`.
    pub fn from_batch(batch: &DtBatch, device: &Device) -> Result<Self> {
        Ok(Self {
            states: array_to_tensor(&batch.states, device)?,
            actions: array_to_tensor(&batch.actions, device)?,
            rewards: array_to_tensor(&batch.rewards, device)?,
            dones: array_to_tensor(&batch.dones.mapv(|d| d as i64), device)?,
            returns_to_go: array_to_tensor(&batch.returns_to_go, device)?,
            timesteps: array_to_tensor(&batch.timesteps, device)?,
            attention_mask: array_to_tensor(&batch.attention_mask, device)?,
            return_loss: batch.return_loss,
        })
    }

    /// Returns the batch size.
    pub fn len(&self) -> usize {
        self.states.dims()[0]
    }

    /// Backbone inputs. `dones` and the `return_loss` flag are not passed on.
    pub fn to_input(&self) -> SequenceInput {
        SequenceInput {
            states: self.states.clone(),
            actions: self.actions.clone(),
            rewards: Some(self.rewards.clone()),
            returns_to_go: self.returns_to_go.clone(),
            timesteps: self.timesteps.clone(),
            attention_mask: self.attention_mask.clone(),
        }
    }
}
