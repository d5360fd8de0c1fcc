//! Categorical distributions over discrete action groups.
use anyhow::Result;
use candle_core::{DType, Tensor, D};
use candle_nn::ops::{log_softmax, softmax_last_dim};
use dtmine_core::error::DtError;
use rand::{distributions::WeightedIndex, Rng};

fn check_temperature(temperature: f64) -> Result<(), DtError> {
    if temperature.is_finite() && temperature > 0.0 {
        Ok(())
    } else {
        Err(DtError::InvalidConfig(format!(
            "temperature must be positive, got {}",
            temperature
        )))
    }
}

/// Categorical distribution parameterized by unnormalized logits.
///
/// The last dimension of the logits indexes the categories; all leading dimensions
/// are batch dimensions.
pub struct Categorical {
    logits: Tensor,
}

impl Categorical {
    /// Constructs the distribution from logits.
    pub fn new(logits: &Tensor) -> Result<Self> {
        Ok(Self {
            logits: logits.to_dtype(DType::F32)?,
        })
    }

    /// Number of categories.
    pub fn n_categories(&self) -> Result<usize> {
        Ok(self.logits.dim(D::Minus1)?)
    }

    /// Log-probability of `target`, an integer tensor of the batch shape.
    pub fn log_prob(&self, target: &Tensor) -> Result<Tensor> {
        let logp = log_softmax(&self.logits, D::Minus1)?;
        let ix = target.to_dtype(DType::I64)?.unsqueeze(D::Minus1)?.contiguous()?;
        Ok(logp.gather(&ix, D::Minus1)?.squeeze(D::Minus1)?)
    }

    /// Draws one category per batch row from `softmax(logits / temperature)`.
    ///
    /// Rows are returned in row-major order of the batch dimensions.
    pub fn sample<R: Rng>(&self, temperature: f64, rng: &mut R) -> Result<Vec<i64>> {
        check_temperature(temperature)?;
        let n = self.n_categories()?;
        let rows = self.logits.elem_count() / n.max(1);
        let probs = softmax_last_dim(&(&self.logits / temperature)?)?
            .reshape((rows, n))?
            .to_vec2::<f32>()?;

        probs
            .iter()
            .map(|p| Ok(rng.sample(WeightedIndex::new(p)?) as i64))
            .collect()
    }
}

/// Product of three independent categorical distributions: button, camera and escape.
pub struct MultiCategorical {
    button: Categorical,
    camera: Categorical,
    esc: Categorical,
}

impl MultiCategorical {
    /// Constructs the distribution from the three logit groups.
    pub fn new(button: &Tensor, camera: &Tensor, esc: &Tensor) -> Result<Self> {
        Ok(Self {
            button: Categorical::new(button)?,
            camera: Categorical::new(camera)?,
            esc: Categorical::new(esc)?,
        })
    }

    /// Joint log-probability, the sum of the three group log-probabilities.
    pub fn log_prob(&self, button: &Tensor, camera: &Tensor, esc: &Tensor) -> Result<Tensor> {
        let lp = (self.button.log_prob(button)? + self.camera.log_prob(camera)?)?;
        Ok((lp + self.esc.log_prob(esc)?)?)
    }

    /// Samples `[button, camera, esc]` for every batch row with per-group temperatures.
    pub fn sample<R: Rng>(
        &self,
        temperature_button: f64,
        temperature_camera: f64,
        temperature_esc: f64,
        rng: &mut R,
    ) -> Result<Vec<[i64; 3]>> {
        let b = self.button.sample(temperature_button, rng)?;
        let c = self.camera.sample(temperature_camera, rng)?;
        let e = self.esc.sample(temperature_esc, rng)?;
        Ok(b.into_iter()
            .zip(c.into_iter())
            .zip(e.into_iter())
            .map(|((b, c), e)| [b, c, e])
            .collect())
    }
}
