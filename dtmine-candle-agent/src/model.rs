//! Interface of sequence backbones.
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::VarBuilder;

/// Inputs of a sequence backbone.
///
/// Shapes are `[batch, timesteps, ..]`; the attention mask is `[batch, timesteps]`
/// with 1 at real positions and 0 at padding.
#[derive(Debug, Clone)]
pub struct SequenceInput {
    /// `[batch, timesteps, state_dim]`, f32.
    pub states: Tensor,

    /// `[batch, timesteps, act_dim]`, f32.
    pub actions: Tensor,

    /// `[batch, timesteps, 1]`, f32. Backbones are free to ignore past rewards.
    pub rewards: Option<Tensor>,

    /// `[batch, timesteps, 1]`, f32.
    pub returns_to_go: Tensor,

    /// `[batch, timesteps]`, i64.
    pub timesteps: Tensor,

    /// `[batch, timesteps]`, f32.
    pub attention_mask: Tensor,
}

/// Outputs of a sequence backbone.
#[derive(Debug, Clone)]
pub struct SequenceOutput {
    /// `[batch, timesteps, state_dim]`
    pub state_preds: Tensor,

    /// `[batch, timesteps, 1]`
    pub return_preds: Tensor,

    /// Hidden states of the state tokens, `[batch, timesteps, hidden_size]`.
    ///
    /// The action head reads these to predict the action taken at each timestep.
    pub state_hidden: Tensor,
}

/// Sequence model not owning its [`VarMap`] internally.
///
/// [`VarMap`]: https://docs.rs/candle-nn/0.8.4/candle_nn/var_map/struct.VarMap.html
pub trait SequenceModel {
    /// Configuration from which [`SequenceModel`] is constructed.
    type Config;

    /// Builds [`SequenceModel`] with [`VarBuilder`] and [`SequenceModel::Config`].
    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Forward pass. Dropout is applied only when `train` is `true`.
    fn forward(&self, input: &SequenceInput, train: bool) -> Result<SequenceOutput>;

    /// Dimension of the hidden states.
    fn hidden_size(&self) -> usize;

    /// Maximum number of token positions.
    fn n_positions(&self) -> usize;

    /// Dimension of observation vectors.
    fn state_dim(&self) -> usize;

    /// Dimension of action vectors.
    fn act_dim(&self) -> usize;
}
