//! Utilities.
use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor, WithDType};
use candle_nn::VarMap;
use dtmine_core::record::{Record, RecordValue};
use ndarray::{ArrayBase, Data, Dimension};

/// Copies an ndarray array into a tensor of the same shape.
pub fn array_to_tensor<A, S, D>(a: &ArrayBase<S, D>, device: &Device) -> Result<Tensor>
where
    A: WithDType,
    S: Data<Elem = A>,
    D: Dimension,
{
    let v = a.iter().copied().collect::<Vec<_>>();
    Ok(Tensor::from_vec(v, a.shape(), device)?)
}

/// Concatenates `n` zeros in front of `t` along dimension 1.
pub fn left_pad(t: &Tensor, n: usize) -> Result<Tensor> {
    if n == 0 {
        return Ok(t.clone());
    }
    let mut shape = t.dims().to_vec();
    shape[1] = n;
    let zeros = Tensor::zeros(shape, t.dtype(), t.device())?;
    Ok(Tensor::cat(&[&zeros, t], 1)?)
}

/// Keeps at most the last `n` entries of `t` along dimension 1.
pub fn keep_last(t: &Tensor, n: usize) -> Result<Tensor> {
    let len = t.dim(1)?;
    let keep = len.min(n);
    Ok(t.narrow(1, len - keep, keep)?)
}

/// Returns the standard deviation of a tensor.
pub fn std(t: &Tensor) -> Result<f32> {
    Ok(t.broadcast_sub(&t.mean_all()?)?
        .sqr()?
        .mean_all()?
        .sqrt()?
        .to_vec0::<f32>()?)
}

/// Returns the mean and standard deviation of the parameters.
pub fn param_stats(varmap: &VarMap) -> Result<Record> {
    let mut record = Record::empty();
    let data = varmap
        .data()
        .lock()
        .map_err(|e| anyhow!("VarMap lock poisoned: {}", e))?;

    for (k, v) in data.iter() {
        let m: f32 = v.mean_all()?.to_vec0()?;
        record.insert(format!("{}_mean", &k), RecordValue::Scalar(m));
        record.insert(format!("{}_std", &k), RecordValue::Scalar(std(v.as_tensor())?));
    }

    Ok(record)
}
