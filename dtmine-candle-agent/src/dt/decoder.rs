//! Context preparation and action selection for autoregressive decoding.
use super::{ActionGroups, DtAction, SamplingConfig};
use crate::{
    model::SequenceInput,
    multi_categorical::MultiCategorical,
    util::{keep_last, left_pad},
};
use anyhow::Result;
use candle_core::{DType, IndexOp, Tensor};
use dtmine_core::error::DtError;
use log::trace;
use rand::Rng;

/// Reshapes a rolling history to `[1, T, width]`.
fn history(t: &Tensor, width: usize, field: &str) -> Result<Tensor> {
    let n = t.elem_count();
    if n % width != 0 {
        // Nearest whole number of rows below the given element count
        return Err(DtError::shape(format!("{} elements", field), n - n % width, n).into());
    }
    Ok(t.reshape((1, n / width, width))?)
}

/// Builds backbone inputs from rolling histories.
///
/// The most recent `capacity` timesteps are kept and everything is left-padded with
/// zeros up to `capacity`. Actions are padded on their own, so the action history
/// may be shorter than the others.
#[allow(clippy::too_many_arguments)]
pub(super) fn build_context(
    states: &Tensor,
    actions: &Tensor,
    rewards: Option<&Tensor>,
    returns_to_go: &Tensor,
    timesteps: &Tensor,
    state_dim: usize,
    act_dim: usize,
    capacity: usize,
) -> Result<SequenceInput> {
    let states = keep_last(&history(states, state_dim, "states")?, capacity)?;
    let actions = keep_last(&history(actions, act_dim, "actions")?, capacity)?;
    let returns_to_go = keep_last(&history(returns_to_go, 1, "returns_to_go")?, capacity)?;
    let timesteps = keep_last(&timesteps.flatten_all()?.unsqueeze(0)?, capacity)?;

    let len = states.dim(1)?;
    if returns_to_go.dim(1)? != len {
        return Err(DtError::shape("returns_to_go", len, returns_to_go.dim(1)?).into());
    }
    if timesteps.dim(1)? != len {
        return Err(DtError::shape("timesteps", len, timesteps.dim(1)?).into());
    }
    let padding = capacity - len;
    let padding_actions = capacity - actions.dim(1)?;
    trace!("Decoder context: {} steps, {} padding", len, padding);

    let mask = (0..capacity)
        .map(|i| if i < padding { 0f32 } else { 1f32 })
        .collect::<Vec<_>>();
    let attention_mask = Tensor::from_vec(mask, (1, capacity), states.device())?;

    Ok(SequenceInput {
        states: left_pad(&states.to_dtype(DType::F32)?, padding)?,
        actions: left_pad(&actions.to_dtype(DType::F32)?, padding_actions)?,
        rewards: rewards.cloned(),
        returns_to_go: left_pad(&returns_to_go.to_dtype(DType::F32)?, padding)?,
        timesteps: left_pad(&timesteps.to_dtype(DType::I64)?, padding)?,
        attention_mask,
    })
}

/// Samples one action from the logits of the last timestep.
///
/// `action_logits` is `[1, T, action_size]`.
pub(super) fn select_action<R: Rng>(
    action_logits: &Tensor,
    groups: &ActionGroups,
    sampling: &SamplingConfig,
    temperature_camera: Option<f64>,
    rng: &mut R,
) -> Result<DtAction> {
    let t = action_logits.dim(1)?;
    let last = action_logits.i((.., t - 1))?;
    let (button, camera, esc) = groups.split(&last)?;
    let dist = MultiCategorical::new(&button, &camera, &esc)?;

    let temperature_camera = temperature_camera.unwrap_or(sampling.temperature_camera);
    let samples = dist.sample(
        sampling.temperature_buttons,
        temperature_camera,
        sampling.temperature_esc,
        rng,
    )?;
    let [button, camera, esc] = samples.first().copied().ok_or(DtError::EmptyBatch)?;

    Ok(DtAction {
        button,
        camera,
        esc: if sampling.disable_esc_button { 0 } else { esc },
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_short_history_is_left_padded() -> Result<()> {
        let dev = Device::Cpu;
        let states = Tensor::ones((2, 4), DType::F32, &dev)?;
        // One action fewer than states
        let actions = Tensor::ones((1, 3), DType::F32, &dev)?;
        let rtg = Tensor::new(&[5f32, 4.], &dev)?;
        let timesteps = Tensor::new(&[0i64, 1], &dev)?;

        let input = build_context(&states, &actions, None, &rtg, &timesteps, 4, 3, 5)?;
        assert_eq!(input.states.dims(), &[1, 5, 4]);
        assert_eq!(input.actions.dims(), &[1, 5, 3]);
        assert_eq!(input.returns_to_go.dims(), &[1, 5, 1]);
        assert_eq!(
            input.attention_mask.to_vec2::<f32>()?,
            vec![vec![0., 0., 0., 1., 1.]]
        );
        assert_eq!(input.timesteps.to_vec2::<i64>()?, vec![vec![0, 0, 0, 0, 1]]);

        let rtg = input.returns_to_go.flatten_all()?.to_vec1::<f32>()?;
        assert_eq!(rtg, vec![0., 0., 0., 5., 4.]);
        let actions = input.actions.sum(2)?.to_vec2::<f32>()?;
        assert_eq!(actions, vec![vec![0., 0., 0., 0., 3.]]);
        Ok(())
    }

    #[test]
    fn test_long_history_is_truncated() -> Result<()> {
        let dev = Device::Cpu;
        let states = Tensor::arange(0f32, 10., &dev)?.reshape((10, 1))?;
        let actions = Tensor::zeros((10, 3), DType::F32, &dev)?;
        let rtg = Tensor::zeros(10, DType::F32, &dev)?;
        let timesteps = Tensor::arange(0i64, 10, &dev)?;

        let input = build_context(&states, &actions, None, &rtg, &timesteps, 1, 3, 4)?;
        assert_eq!(
            input.states.flatten_all()?.to_vec1::<f32>()?,
            vec![6., 7., 8., 9.]
        );
        assert_eq!(input.timesteps.to_vec2::<i64>()?, vec![vec![6, 7, 8, 9]]);
        assert_eq!(
            input.attention_mask.to_vec2::<f32>()?,
            vec![vec![1., 1., 1., 1.]]
        );
        Ok(())
    }

    #[test]
    fn test_misaligned_history() -> Result<()> {
        let dev = Device::Cpu;
        let states = Tensor::zeros((3, 2), DType::F32, &dev)?;
        let actions = Tensor::zeros((3, 3), DType::F32, &dev)?;
        let rtg = Tensor::zeros(2, DType::F32, &dev)?;
        let timesteps = Tensor::zeros(3, DType::I64, &dev)?;
        assert!(build_context(&states, &actions, None, &rtg, &timesteps, 2, 3, 4).is_err());

        let states = Tensor::zeros(5, DType::F32, &dev)?;
        let err = build_context(&states, &actions, None, &rtg, &timesteps, 2, 3, 4).unwrap_err();
        assert_eq!(
            err.downcast::<DtError>()?,
            DtError::shape("states elements", 4, 5)
        );
        Ok(())
    }

    #[test]
    fn test_select_action_uses_last_timestep() -> Result<()> {
        let dev = Device::Cpu;
        let groups = ActionGroups::new(3, 2, 2);
        // The first timestep favours other actions than the last one
        let logits = Tensor::new(
            &[[
                [50f32, 0., 0., 50., 0., 0., 50.],
                [0f32, 0., 50., 0., 50., 50., 0.],
            ]],
            &dev,
        )?;
        let sampling = SamplingConfig::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let action = select_action(&logits, &groups, &sampling, None, &mut rng)?;
        assert_eq!(
            action,
            DtAction {
                button: 2,
                camera: 1,
                esc: 0
            }
        );
        Ok(())
    }

    #[test]
    fn test_camera_temperature_override() -> Result<()> {
        let dev = Device::Cpu;
        let groups = ActionGroups::new(2, 3, 2);
        // Nearly flat camera logits, index 1 slightly ahead
        let logits = Tensor::new(&[[[0f32, 0., 0., 0.1, 0., 0., 0.]]], &dev)?;
        let mut rng = SmallRng::seed_from_u64(0);

        // The override sharpens the camera group against a default of 1
        let sampling = SamplingConfig::default();
        for _ in 0..20 {
            let action = select_action(&logits, &groups, &sampling, Some(1e-3), &mut rng)?;
            assert_eq!(action.camera, 1);
        }

        // Without an override the configured camera temperature is used
        let sampling = SamplingConfig::default().temperatures(1.0, 1e-3, 1.0);
        for _ in 0..20 {
            let action = select_action(&logits, &groups, &sampling, None, &mut rng)?;
            assert_eq!(action.camera, 1);
        }

        // A hot override wins over the sharp default
        let cameras = (0..60)
            .map(|_| Ok(select_action(&logits, &groups, &sampling, Some(100.0), &mut rng)?.camera))
            .collect::<Result<Vec<_>>>()?;
        assert!(cameras.iter().any(|c| *c != 1));
        Ok(())
    }

    #[test]
    fn test_disable_esc_button() -> Result<()> {
        let dev = Device::Cpu;
        let groups = ActionGroups::new(2, 2, 2);
        let logits = Tensor::new(&[[[0f32, 0., 0., 0., -50., 50.]]], &dev)?;
        let sampling = SamplingConfig::default().disable_esc_button(true);
        let mut rng = SmallRng::seed_from_u64(0);
        for _ in 0..10 {
            let action = select_action(&logits, &groups, &sampling, Some(2.0), &mut rng)?;
            assert_eq!(action.esc, 0);
        }
        Ok(())
    }
}
