//! Decision Transformer backbone.
use super::{DecisionTransformerConfig, Gpt2Encoder};
use crate::model::{SequenceInput, SequenceModel, SequenceOutput};
use anyhow::Result;
use candle_core::{DType, IndexOp, Module, Tensor};
use candle_nn::{embedding, layer_norm, linear, Embedding, LayerNorm, Linear, VarBuilder};
use dtmine_core::error::DtError;

/// Decision Transformer backbone.
///
/// Each timestep contributes three tokens, in the order return-to-go, state, action.
/// A timestep embedding is added to all three. After encoding, state and return
/// predictions are read from the action tokens, and the hidden states of the state
/// tokens are handed to the action head.
pub struct DecisionTransformer {
    config: DecisionTransformerConfig,
    embed_timestep: Embedding,
    embed_return: Linear,
    embed_state: Linear,
    embed_action: Linear,
    embed_ln: LayerNorm,
    encoder: Gpt2Encoder,
    predict_state: Linear,
    predict_return: Linear,
}

impl DecisionTransformer {
    /// Returns the configuration.
    pub fn config(&self) -> &DecisionTransformerConfig {
        &self.config
    }

    fn check_input(&self, input: &SequenceInput) -> Result<(usize, usize)> {
        let (b, t, state_dim) = input.states.dims3()?;
        if state_dim != self.config.state_dim {
            return Err(DtError::shape("states width", self.config.state_dim, state_dim).into());
        }
        let act_dim = input.actions.dims3()?.2;
        if act_dim != self.config.act_dim {
            return Err(DtError::shape("actions width", self.config.act_dim, act_dim).into());
        }
        for (name, len) in [
            ("actions", input.actions.dim(1)?),
            ("returns_to_go", input.returns_to_go.dim(1)?),
            ("timesteps", input.timesteps.dim(1)?),
            ("attention_mask", input.attention_mask.dim(1)?),
        ]
        .iter()
        {
            if *len != t {
                return Err(DtError::shape(*name, t, *len).into());
            }
        }
        Ok((b, t))
    }
}

impl SequenceModel for DecisionTransformer {
    type Config = DecisionTransformerConfig;

    fn build(vb: VarBuilder, config: Self::Config) -> Result<Self> {
        config.check()?;
        let h = config.hidden_size;

        Ok(Self {
            embed_timestep: embedding(config.max_ep_len, h, vb.pp("embed_timestep"))?,
            embed_return: linear(1, h, vb.pp("embed_return"))?,
            embed_state: linear(config.state_dim, h, vb.pp("embed_state"))?,
            embed_action: linear(config.act_dim, h, vb.pp("embed_action"))?,
            embed_ln: layer_norm(h, config.layer_norm_epsilon, vb.pp("embed_ln"))?,
            encoder: Gpt2Encoder::build(vb.pp("encoder"), &config)?,
            predict_state: linear(h, config.state_dim, vb.pp("predict_state"))?,
            predict_return: linear(h, 1, vb.pp("predict_return"))?,
            config,
        })
    }

    fn forward(&self, input: &SequenceInput, train: bool) -> Result<SequenceOutput> {
        let (b, t) = self.check_input(input)?;
        let h = self.config.hidden_size;

        let time_embeddings = self
            .embed_timestep
            .forward(&input.timesteps.to_dtype(DType::I64)?)?;
        let state_embeddings =
            (self.embed_state.forward(&input.states)? + &time_embeddings)?;
        let action_embeddings =
            (self.embed_action.forward(&input.actions)? + &time_embeddings)?;
        let returns_embeddings =
            (self.embed_return.forward(&input.returns_to_go)? + &time_embeddings)?;

        // (R_1, s_1, a_1, R_2, s_2, a_2, ...)
        let stacked_inputs = Tensor::stack(
            &[&returns_embeddings, &state_embeddings, &action_embeddings],
            1,
        )?
        .permute((0, 2, 1, 3))?
        .reshape((b, 3 * t, h))?;
        let stacked_inputs = self.embed_ln.forward(&stacked_inputs)?;

        let mask = &input.attention_mask;
        let stacked_attention_mask = Tensor::stack(&[mask, mask, mask], 1)?
            .permute((0, 2, 1))?
            .reshape((b, 3 * t))?;

        let xs = self
            .encoder
            .forward(&stacked_inputs, &stacked_attention_mask, train)?
            .reshape((b, t, 3, h))?
            .permute((0, 2, 1, 3))?;

        let state_hidden = xs.i((.., 1))?.contiguous()?;
        let action_hidden = xs.i((.., 2))?.contiguous()?;

        Ok(SequenceOutput {
            state_preds: self.predict_state.forward(&action_hidden)?,
            return_preds: self.predict_return.forward(&action_hidden)?,
            state_hidden,
        })
    }

    fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    fn n_positions(&self) -> usize {
        self.config.n_positions
    }

    fn state_dim(&self) -> usize {
        self.config.state_dim
    }

    fn act_dim(&self) -> usize {
        self.config.act_dim
    }
}
