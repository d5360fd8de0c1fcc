//! Optimizers.
use anyhow::Result;
use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer as _, ParamsAdamW};
use candle_optimisers::adam::{Adam, ParamsAdam};
use log::trace;
use serde::{Deserialize, Serialize};

/// Configuration of the optimizer updating a Decision Transformer.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum OptimizerConfig {
    /// AdamW optimizer.
    AdamW {
        lr: f64,
        #[serde(default = "default_beta1")]
        beta1: f64,
        #[serde(default = "default_beta2")]
        beta2: f64,
        #[serde(default = "default_eps")]
        eps: f64,
        #[serde(default = "default_weight_decay")]
        weight_decay: f64,
    },

    /// Adam optimizer.
    Adam {
        /// Learning rate.
        lr: f64,
    },
}

fn default_beta1() -> f64 {
    ParamsAdamW::default().beta1
}

fn default_beta2() -> f64 {
    ParamsAdamW::default().beta2
}

fn default_eps() -> f64 {
    ParamsAdamW::default().eps
}

fn default_weight_decay() -> f64 {
    ParamsAdamW::default().weight_decay
}

impl OptimizerConfig {
    /// Constructs an optimizer over `vars`.
    ///
    /// When `max_grad_norm` is given, gradients are rescaled so that their global
    /// L2 norm does not exceed it.
    pub fn build(&self, vars: Vec<Var>, max_grad_norm: Option<f64>) -> Result<Optimizer> {
        let kind = match &self {
            OptimizerConfig::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => {
                let params = ParamsAdamW {
                    lr: *lr,
                    beta1: *beta1,
                    beta2: *beta2,
                    eps: *eps,
                    weight_decay: *weight_decay,
                };
                OptimizerKind::AdamW(AdamW::new(vars.clone(), params)?)
            }
            OptimizerConfig::Adam { lr } => {
                let params = ParamsAdam {
                    lr: *lr,
                    ..ParamsAdam::default()
                };
                OptimizerKind::Adam(Adam::new(vars.clone(), params)?)
            }
        };
        Ok(Optimizer {
            kind,
            vars,
            max_grad_norm,
        })
    }

    /// Override learning rate.
    pub fn learning_rate(self, lr: f64) -> Self {
        match self {
            Self::AdamW {
                lr: _,
                beta1,
                beta2,
                eps,
                weight_decay,
            } => Self::AdamW {
                lr,
                beta1,
                beta2,
                eps,
                weight_decay,
            },
            Self::Adam { lr: _ } => Self::Adam { lr },
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let params = ParamsAdamW::default();
        Self::AdamW {
            lr: 1e-4,
            beta1: params.beta1,
            beta2: params.beta2,
            eps: params.eps,
            weight_decay: params.weight_decay,
        }
    }
}

enum OptimizerKind {
    AdamW(AdamW),
    Adam(Adam),
}

/// Optimizer with optional gradient norm clipping.
pub struct Optimizer {
    kind: OptimizerKind,
    vars: Vec<Var>,
    max_grad_norm: Option<f64>,
}

impl Optimizer {
    /// Applies a backward step pass.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let mut grads = loss.backward()?;
        if let Some(max_norm) = self.max_grad_norm {
            clip_grad_norm(&self.vars, &mut grads, max_norm)?;
        }
        self.step(&grads)
    }

    /// Updates variables with the given gradients.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        match &mut self.kind {
            OptimizerKind::AdamW(opt) => Ok(opt.step(grads)?),
            OptimizerKind::Adam(opt) => Ok(opt.step(grads)?),
        }
    }
}

/// Rescales gradients in place so their global L2 norm is at most `max_norm`.
///
/// Returns the norm before clipping.
pub fn clip_grad_norm(vars: &[Var], grads: &mut GradStore, max_norm: f64) -> Result<f64> {
    let mut sum_sq = 0f64;
    for var in vars.iter() {
        if let Some(g) = grads.get(var.as_tensor()) {
            sum_sq += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    let norm = sum_sq.sqrt();
    trace!("Gradient norm: {}", norm);

    if norm > max_norm {
        let coef = max_norm / (norm + 1e-6);
        for var in vars.iter() {
            if let Some(g) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), (g * coef)?);
            }
        }
    }
    Ok(norm)
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::{DType, Device};

    #[test]
    fn test_clip_grad_norm() -> Result<()> {
        let var = Var::zeros((2,), DType::F32, &Device::Cpu)?;
        let target = Tensor::new(&[3f32, 4.], &Device::Cpu)?;
        // d/dx (x . target) = target, whose norm is 5
        let loss = var.as_tensor().mul(&target)?.sum_all()?;
        let mut grads = loss.backward()?;

        let norm = clip_grad_norm(&[var.clone()], &mut grads, 1.0)?;
        assert!((norm - 5.0).abs() < 1e-5);

        let g = grads.get(var.as_tensor()).unwrap().to_vec1::<f32>()?;
        assert!((g[0] - 0.6).abs() < 1e-4);
        assert!((g[1] - 0.8).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn test_learning_rate_override() {
        let config = OptimizerConfig::default().learning_rate(0.5);
        match config {
            OptimizerConfig::AdamW { lr, .. } => assert_eq!(lr, 0.5),
            _ => panic!("unexpected optimizer"),
        }
    }
}
