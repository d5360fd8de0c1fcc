//! Action-head model on top of a sequence backbone.
use super::{
    decoder::{build_context, select_action},
    ActionGroups, DtAction, DtModelConfig, SamplingConfig,
};
use crate::{
    model::{SequenceInput, SequenceModel},
    multi_categorical::MultiCategorical,
    opt::Optimizer,
    util::param_stats,
    DtTensorBatch,
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor, D};
use candle_nn::{linear, Linear, VarBuilder, VarMap};
use dtmine_core::{error::DtError, record::Record};
use log::{debug, info};
use rand::{rngs::SmallRng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{convert::TryFrom, path::Path};

/// Outputs of [`DtModel::original_forward`].
#[derive(Debug, Clone)]
pub struct DtOutput {
    /// `[batch, timesteps, state_dim]`
    pub state_preds: Tensor,

    /// Action logits, `[batch, timesteps, action_size]`.
    pub action_preds: Tensor,

    /// `[batch, timesteps, 1]`
    pub return_preds: Tensor,
}

/// Outputs of [`DtModel::forward`].
#[derive(Debug, Clone)]
pub struct DtLoss {
    /// Negative mean log-likelihood of the action targets, a scalar.
    pub loss: Tensor,
}

/// Decision Transformer with a multi-categorical action head.
///
/// The backbone `B` encodes the interleaved sequence; a linear head maps the hidden
/// states to `button | camera | esc` logits. Action targets are read from channels
/// 0, 1 and 2 of the action vectors, so the backbone's `act_dim` must be at least 3.
pub struct DtModel<B>
where
    B: SequenceModel,
{
    device: Device,
    varmap: VarMap,
    backbone: B,
    predict_action: Linear,
    groups: ActionGroups,
    sampling: SamplingConfig,
    opt: Optimizer,
    rng: SmallRng,
    train: bool,
}

impl<B> DtModel<B>
where
    B: SequenceModel,
    B::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`DtModel`] in training mode.
    pub fn build(config: DtModelConfig<B::Config>) -> Result<Self> {
        config.action_groups.check()?;
        config.sampling.check()?;
        let backbone_config = config
            .backbone_config
            .context("backbone_config is not set.")?;
        let device = Device::try_from(config.device.unwrap_or_default())?;
        let varmap = VarMap::new();

        let (backbone, predict_action) = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let backbone = B::build(vb.pp("backbone"), backbone_config)?;
            let predict_action = linear(
                backbone.hidden_size(),
                config.action_groups.action_size(),
                vb.pp("predict_action"),
            )?;
            (backbone, predict_action)
        };
        if backbone.act_dim() < 3 {
            return Err(DtError::InvalidConfig(format!(
                "act_dim must hold button, camera and esc targets, got {}",
                backbone.act_dim()
            ))
            .into());
        }

        let opt = config
            .opt_config
            .build(varmap.all_vars(), config.max_grad_norm)?;

        Ok(Self {
            device,
            varmap,
            backbone,
            predict_action,
            groups: config.action_groups,
            sampling: config.sampling,
            opt,
            rng: SmallRng::seed_from_u64(config.seed),
            train: true,
        })
    }

    /// Runs the backbone and the action head without computing a loss.
    pub fn original_forward(&self, input: &SequenceInput, train: bool) -> Result<DtOutput> {
        let out = self.backbone.forward(input, train)?;
        Ok(DtOutput {
            state_preds: out.state_preds,
            action_preds: self.predict_action.forward(&out.state_hidden)?,
            return_preds: out.return_preds,
        })
    }

    /// Computes the action loss on a training batch.
    ///
    /// Predictions and targets at padded positions are zeroed before the loss, so
    /// padding contributes the log-probability of action `[0, 0, 0]` under uniform
    /// logits.
    pub fn forward(&self, batch: &DtTensorBatch) -> Result<DtLoss> {
        let input = batch.to_input();
        let out = self.original_forward(&input, self.train)?;
        let mask = input.attention_mask.to_dtype(DType::F32)?.unsqueeze(D::Minus1)?;

        let action_preds = out.action_preds.broadcast_mul(&mask)?;
        let (button, camera, esc) = self.groups.split(&action_preds)?;
        let dist = MultiCategorical::new(&button, &camera, &esc)?;

        let targets = input.actions.broadcast_mul(&mask)?;
        let target_button = targets.i((.., .., 0))?.to_dtype(DType::I64)?;
        let target_camera = targets.i((.., .., 1))?.to_dtype(DType::I64)?;
        let target_esc = targets.i((.., .., 2))?.to_dtype(DType::I64)?;

        let log_probs = dist.log_prob(&target_button, &target_camera, &target_esc)?;
        let loss = log_probs.mean_all()?.neg()?;
        Ok(DtLoss { loss })
    }

    /// Updates the parameters with the gradient of `loss`.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Runs one optimization step on `batch` and records the loss.
    pub fn opt(&mut self, batch: &DtTensorBatch) -> Result<Record> {
        let loss = self.forward(batch)?.loss;
        self.backward_step(&loss)?;
        let loss = loss.to_scalar::<f32>()?;
        debug!("Optimization step on {} windows, loss {}", batch.len(), loss);
        Ok(Record::from_scalar("loss", loss))
    }

    /// Decodes the next action from rolling histories.
    ///
    /// Histories of any length are accepted; only the most recent
    /// `n_positions / 3` timesteps are used. The backbone runs without dropout
    /// regardless of the current mode. `temperature_camera` overrides the configured
    /// camera temperature for this call.
    pub fn get_action(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
        rewards: Option<&Tensor>,
        returns_to_go: &Tensor,
        timesteps: &Tensor,
        temperature_camera: Option<f64>,
    ) -> Result<DtAction> {
        let capacity = self.backbone.n_positions() / 3;
        let input = build_context(
            &states.to_device(&self.device)?,
            &actions.to_device(&self.device)?,
            rewards,
            &returns_to_go.to_device(&self.device)?,
            &timesteps.to_device(&self.device)?,
            self.backbone.state_dim(),
            self.backbone.act_dim(),
            capacity,
        )?;
        let out = self.original_forward(&input, false)?;
        select_action(
            &out.action_preds,
            &self.groups,
            &self.sampling,
            temperature_camera,
            &mut self.rng,
        )
    }

    /// Sets the default temperatures of the three action groups.
    pub fn set_default_temperatures(
        &mut self,
        temperature_buttons: f64,
        temperature_camera: f64,
        temperature_esc: f64,
    ) -> Result<()> {
        let sampling = self.sampling.clone().temperatures(
            temperature_buttons,
            temperature_camera,
            temperature_esc,
        );
        sampling.check()?;
        self.sampling = sampling;
        Ok(())
    }

    /// Returns the default temperatures `(buttons, camera, esc)`.
    pub fn default_temperatures(&self) -> (f64, f64, f64) {
        (
            self.sampling.temperature_buttons,
            self.sampling.temperature_camera,
            self.sampling.temperature_esc,
        )
    }

    /// Forces the escape channel of decoded actions to 0 when `true`.
    pub fn set_disable_esc_button(&mut self, disable_esc_button: bool) {
        self.sampling.disable_esc_button = disable_esc_button;
    }

    /// Returns `true` if the escape channel is disabled.
    pub fn disable_esc_button(&self) -> bool {
        self.sampling.disable_esc_button
    }

    /// Reseeds the random generator used for action sampling.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Enables dropout in [`DtModel::forward`].
    pub fn train(&mut self) {
        self.train = true;
    }

    /// Disables dropout in [`DtModel::forward`].
    pub fn eval(&mut self) {
        self.train = false;
    }

    /// Returns `true` in training mode.
    pub fn is_train(&self) -> bool {
        self.train
    }

    /// Returns the backbone.
    pub fn backbone(&self) -> &B {
        &self.backbone
    }

    /// Returns the action groups.
    pub fn action_groups(&self) -> &ActionGroups {
        &self.groups
    }

    /// Returns the device of the parameters.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Returns the variables of the backbone and the action head.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Mean and standard deviation of every parameter.
    pub fn param_stats(&self) -> Result<Record> {
        param_stats(&self.varmap)
    }

    /// Saves the parameters in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save DT model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads parameters saved with [`DtModel::save`].
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load DT model from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        opt::OptimizerConfig,
        transformer::{DecisionTransformer, DecisionTransformerConfig},
    };

    fn build_model(seed: u64) -> Result<DtModel<DecisionTransformer>> {
        let config = DtModelConfig::new(ActionGroups::new(4, 3, 2))
            .backbone_config(
                DecisionTransformerConfig::new(5, 3)
                    .hidden_size(16)
                    .n_head(2)
                    .n_layer(1)
                    .n_positions(12)
                    .max_ep_len(50),
            )
            .opt_config(OptimizerConfig::default().learning_rate(1e-2))
            .max_grad_norm(1.0)
            .seed(seed);
        DtModel::build(config)
    }

    fn batch(b: usize, t: usize) -> Result<DtTensorBatch> {
        let dev = Device::Cpu;
        let button = Tensor::new(&[0f32, 1., 2., 3.], &dev)?
            .repeat(((b * t + 3) / 4,))?
            .narrow(0, 0, b * t)?;
        let actions = Tensor::stack(
            &[
                button.clone(),
                Tensor::ones(b * t, DType::F32, &dev)?,
                Tensor::zeros(b * t, DType::F32, &dev)?,
            ],
            1,
        )?
        .reshape((b, t, 3))?;
        let mask = Tensor::ones((b, t), DType::F32, &dev)?;
        Ok(DtTensorBatch {
            states: Tensor::randn(0f32, 1.0, (b, t, 5), &dev)?,
            actions,
            rewards: Tensor::zeros((b, t, 1), DType::F32, &dev)?,
            dones: Tensor::zeros((b, t), DType::I64, &dev)?,
            returns_to_go: Tensor::ones((b, t, 1), DType::F32, &dev)?,
            timesteps: Tensor::arange(0i64, t as i64, &dev)?
                .unsqueeze(0)?
                .repeat((b, 1))?,
            attention_mask: mask,
            return_loss: true,
        })
    }

    #[test]
    fn test_loss_is_finite_scalar() -> Result<()> {
        let model = build_model(0)?;
        let loss = model.forward(&batch(3, 4)?)?.loss;
        assert_eq!(loss.dims(), &[] as &[usize]);
        let v = loss.to_scalar::<f32>()?;
        assert!(v.is_finite());
        assert!(v > 0.0);
        Ok(())
    }

    #[test]
    fn test_loss_on_padded_batch() -> Result<()> {
        let dev = Device::Cpu;
        let mut model = build_model(1)?;
        model.eval();

        let mut batch = batch(2, 4)?;
        batch.attention_mask = Tensor::new(&[[0f32, 0., 1., 1.], [0., 1., 1., 1.]], &dev)?;
        // Channels are [button, camera, esc], with 4, 3 and 2 categories
        batch.actions = Tensor::new(
            &[
                [[3f32, 2., 1.], [1., 0., 1.], [2., 1., 0.], [0., 2., 1.]],
                [[1f32, 2., 1.], [3., 1., 0.], [2., 0., 1.], [1., 2., 1.]],
            ],
            &dev,
        )?;
        let loss = model.forward(&batch)?.loss.to_scalar::<f32>()? as f64;

        let preds = model
            .original_forward(&batch.to_input(), false)?
            .action_preds
            .to_vec3::<f32>()?;
        let mask = batch.attention_mask.to_vec2::<f32>()?;
        let actions = batch.actions.to_vec3::<f32>()?;
        let groups = [(0usize, 4usize), (4, 3), (7, 2)];

        let mut log_likelihood = 0f64;
        for b in 0..2 {
            for t in 0..4 {
                let m = mask[b][t];
                for (channel, (offset, width)) in groups.iter().enumerate() {
                    let logits = preds[b][t][*offset..offset + width]
                        .iter()
                        .map(|v| (v * m) as f64)
                        .collect::<Vec<_>>();
                    let log_z = logits.iter().map(|v| v.exp()).sum::<f64>().ln();
                    let target = (actions[b][t][channel] * m) as usize;
                    log_likelihood += logits[target] - log_z;
                }
            }
        }
        let expected = -log_likelihood / 8.0;
        assert!((loss - expected).abs() < 1e-4, "{} vs {}", loss, expected);
        Ok(())
    }

    #[test]
    fn test_original_forward_shapes() -> Result<()> {
        let model = build_model(0)?;
        let out = model.original_forward(&batch(2, 4)?.to_input(), false)?;
        assert_eq!(out.state_preds.dims(), &[2, 4, 5]);
        assert_eq!(out.action_preds.dims(), &[2, 4, 9]);
        assert_eq!(out.return_preds.dims(), &[2, 4, 1]);
        Ok(())
    }

    #[test]
    fn test_opt_reduces_loss() -> Result<()> {
        let mut model = build_model(0)?;
        model.eval();
        let batch = batch(2, 4)?;
        let first = model.opt(&batch)?.get_scalar("loss")?;
        let mut last = first;
        for _ in 0..30 {
            last = model.opt(&batch)?.get_scalar("loss")?;
        }
        assert!(last < first);
        Ok(())
    }

    #[test]
    fn test_act_dim_too_small() {
        let config = DtModelConfig::new(ActionGroups::new(4, 3, 2))
            .backbone_config(DecisionTransformerConfig::new(5, 2).hidden_size(8));
        assert!(DtModel::<DecisionTransformer>::build(config).is_err());
    }

    #[test]
    fn test_missing_backbone_config() {
        let config = DtModelConfig::<DecisionTransformerConfig>::new(ActionGroups::new(4, 3, 2));
        assert!(DtModel::<DecisionTransformer>::build(config).is_err());
    }

    #[test]
    fn test_temperatures() -> Result<()> {
        let mut model = build_model(0)?;
        assert_eq!(model.default_temperatures(), (1.0, 1.0, 1.0));
        model.set_default_temperatures(0.5, 2.0, 1.5)?;
        assert_eq!(model.default_temperatures(), (0.5, 2.0, 1.5));
        assert!(model.set_default_temperatures(0.5, -1.0, 1.5).is_err());
        assert_eq!(model.default_temperatures(), (0.5, 2.0, 1.5));
        Ok(())
    }

    #[test]
    fn test_get_action_with_disabled_esc() -> Result<()> {
        let dev = Device::Cpu;
        let mut model = build_model(0)?;
        model.set_disable_esc_button(true);
        assert!(model.disable_esc_button());

        // Longer than the 4-step context
        let states = Tensor::randn(0f32, 1.0, (6, 5), &dev)?;
        let actions = Tensor::zeros((6, 3), DType::F32, &dev)?;
        let rtg = Tensor::ones(6, DType::F32, &dev)?;
        let timesteps = Tensor::arange(0i64, 6, &dev)?;
        for _ in 0..10 {
            let action = model.get_action(&states, &actions, None, &rtg, &timesteps, Some(0.5))?;
            assert_eq!(action.esc, 0);
            assert!((0..4).contains(&action.button));
            assert!((0..3).contains(&action.camera));
        }
        Ok(())
    }

    #[test]
    fn test_get_action_is_seeded() -> Result<()> {
        let dev = Device::Cpu;
        let mut model = build_model(5)?;
        let states = Tensor::randn(0f32, 1.0, (2, 5), &dev)?;
        let actions = Tensor::zeros((1, 3), DType::F32, &dev)?;
        let rtg = Tensor::new(&[3f32, 2.], &dev)?;
        let timesteps = Tensor::new(&[0i64, 1], &dev)?;

        let run = |model: &mut DtModel<DecisionTransformer>| -> Result<Vec<DtAction>> {
            model.reseed(11);
            (0..8)
                .map(|_| model.get_action(&states, &actions, None, &rtg, &timesteps, None))
                .collect()
        };
        let a = run(&mut model)?;
        let b = run(&mut model)?;
        assert_eq!(a, b);
        Ok(())
    }
}
