//! Decision Transformer with a multi-categorical action head.
mod action;
mod config;
mod decoder;
mod model;

pub use action::{ActionGroups, DtAction, SamplingConfig};
pub use config::DtModelConfig;
pub use model::{DtLoss, DtModel, DtOutput};
