//! Decision Transformer agent implemented with [candle](https://crates.io/crates/candle-core).
//!
//! [`dt::DtModel`] wraps a sequence backbone with an action head whose output is split
//! into button, camera and escape logit groups. Training batches come from
//! [`dtmine_core::EpisodeCollator`] and are moved to tensors with [`DtTensorBatch`].
pub mod dt;
pub mod model;
pub mod multi_categorical;
pub mod opt;
mod tensor_batch;
pub mod transformer;
pub mod util;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
pub use tensor_batch::DtTensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// A CUDA device with the given ordinal.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl TryFrom<Device> for candle_core::Device {
    type Error = anyhow::Error;

    fn try_from(device: Device) -> Result<Self> {
        match device {
            Device::Cpu => Ok(candle_core::Device::Cpu),
            Device::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
        }
    }
}
