//! Causal transformer encoder over token embeddings.
use super::DecisionTransformerConfig;
use anyhow::Result;
use candle_core::{DType, Device, Module, Tensor, D};
use candle_nn::{
    embedding, layer_norm, linear, ops::softmax_last_dim, Dropout, Embedding, LayerNorm, Linear,
    VarBuilder,
};
use dtmine_core::error::DtError;

/// Added to attention scores of masked positions.
const MASK_VALUE: f64 = -1e9;

struct Attention {
    c_attn: Linear,
    c_proj: Linear,
    n_head: usize,
    head_dim: usize,
    attn_dropout: Dropout,
    resid_dropout: Dropout,
}

impl Attention {
    fn build(vb: VarBuilder, config: &DecisionTransformerConfig) -> Result<Self> {
        let h = config.hidden_size;
        Ok(Self {
            c_attn: linear(h, 3 * h, vb.pp("c_attn"))?,
            c_proj: linear(h, h, vb.pp("c_proj"))?,
            n_head: config.n_head,
            head_dim: h / config.n_head,
            attn_dropout: Dropout::new(config.attn_pdrop),
            resid_dropout: Dropout::new(config.resid_pdrop),
        })
    }

    fn split_heads(&self, t: &Tensor, b: usize, l: usize) -> Result<Tensor> {
        Ok(t.reshape((b, l, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// `bias` is added to the attention scores, `[batch, 1, len, len]`.
    fn forward(&self, xs: &Tensor, bias: &Tensor, train: bool) -> Result<Tensor> {
        let (b, l, h) = xs.dims3()?;
        let qkv = self.c_attn.forward(xs)?;
        let q = self.split_heads(&qkv.narrow(D::Minus1, 0, h)?, b, l)?;
        let k = self.split_heads(&qkv.narrow(D::Minus1, h, h)?, b, l)?;
        let v = self.split_heads(&qkv.narrow(D::Minus1, 2 * h, h)?, b, l)?;

        let att = (q.matmul(&k.t()?.contiguous()?)? / (self.head_dim as f64).sqrt())?;
        let att = softmax_last_dim(&att.broadcast_add(bias)?)?;
        let att = self.attn_dropout.forward(&att, train)?;

        let ys = att
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, l, h))?;
        let ys = self.c_proj.forward(&ys)?;
        Ok(self.resid_dropout.forward(&ys, train)?)
    }
}

struct Mlp {
    c_fc: Linear,
    c_proj: Linear,
    dropout: Dropout,
}

impl Mlp {
    fn build(vb: VarBuilder, config: &DecisionTransformerConfig) -> Result<Self> {
        let h = config.hidden_size;
        let inner = config.inner_dim();
        Ok(Self {
            c_fc: linear(h, inner, vb.pp("c_fc"))?,
            c_proj: linear(inner, h, vb.pp("c_proj"))?,
            dropout: Dropout::new(config.resid_pdrop),
        })
    }

    fn forward(&self, xs: &Tensor, train: bool) -> Result<Tensor> {
        // tanh approximation of GELU
        let xs = self.c_fc.forward(xs)?.gelu()?;
        let xs = self.c_proj.forward(&xs)?;
        Ok(self.dropout.forward(&xs, train)?)
    }
}

struct Block {
    ln_1: LayerNorm,
    attn: Attention,
    ln_2: LayerNorm,
    mlp: Mlp,
}

impl Block {
    fn build(vb: VarBuilder, config: &DecisionTransformerConfig) -> Result<Self> {
        let h = config.hidden_size;
        let eps = config.layer_norm_epsilon;
        Ok(Self {
            ln_1: layer_norm(h, eps, vb.pp("ln_1"))?,
            attn: Attention::build(vb.pp("attn"), config)?,
            ln_2: layer_norm(h, eps, vb.pp("ln_2"))?,
            mlp: Mlp::build(vb.pp("mlp"), config)?,
        })
    }

    fn forward(&self, xs: &Tensor, bias: &Tensor, train: bool) -> Result<Tensor> {
        let ys = self.attn.forward(&self.ln_1.forward(xs)?, bias, train)?;
        let xs = (xs + ys)?;
        let ys = self.mlp.forward(&self.ln_2.forward(&xs)?, train)?;
        Ok((xs + ys)?)
    }
}

/// Stack of pre-norm transformer blocks with learned position embeddings.
///
/// Attention is causal and ignores key positions where the attention mask is 0.
pub struct Gpt2Encoder {
    wpe: Embedding,
    drop: Dropout,
    blocks: Vec<Block>,
    ln_f: LayerNorm,
    n_positions: usize,
}

impl Gpt2Encoder {
    /// Builds the encoder.
    pub fn build(vb: VarBuilder, config: &DecisionTransformerConfig) -> Result<Self> {
        let h = config.hidden_size;
        let blocks = (0..config.n_layer)
            .map(|i| Block::build(vb.pp(format!("h{}", i)), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            wpe: embedding(config.n_positions, h, vb.pp("wpe"))?,
            drop: Dropout::new(config.embd_pdrop),
            blocks,
            ln_f: layer_norm(h, config.layer_norm_epsilon, vb.pp("ln_f"))?,
            n_positions: config.n_positions,
        })
    }

    /// Encodes `inputs_embeds` of shape `[batch, len, hidden]`.
    ///
    /// `attention_mask` is `[batch, len]` with 1 at real tokens.
    pub fn forward(
        &self,
        inputs_embeds: &Tensor,
        attention_mask: &Tensor,
        train: bool,
    ) -> Result<Tensor> {
        let (b, l, _) = inputs_embeds.dims3()?;
        if l > self.n_positions {
            return Err(DtError::shape("token positions", self.n_positions, l).into());
        }
        let device = inputs_embeds.device();

        let position_ids = Tensor::arange(0u32, l as u32, device)?;
        let xs = inputs_embeds.broadcast_add(&self.wpe.forward(&position_ids)?)?;
        let mut xs = self.drop.forward(&xs, train)?;

        let bias = attention_bias(attention_mask, b, l, device)?;
        for block in self.blocks.iter() {
            xs = block.forward(&xs, &bias, train)?;
        }
        Ok(self.ln_f.forward(&xs)?)
    }
}

/// Additive attention bias combining the causal order and the padding mask.
fn attention_bias(
    attention_mask: &Tensor,
    b: usize,
    l: usize,
    device: &Device,
) -> Result<Tensor> {
    let causal = Tensor::tril2(l, DType::F32, device)?.affine(-MASK_VALUE, MASK_VALUE)?;
    let padding = attention_mask
        .to_dtype(DType::F32)?
        .affine(-MASK_VALUE, MASK_VALUE)?
        .reshape((b, 1, 1, l))?;
    Ok(padding.broadcast_add(&causal)?)
}
