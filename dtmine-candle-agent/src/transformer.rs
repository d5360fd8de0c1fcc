//! GPT-2 style Decision Transformer backbone.
mod base;
mod config;
mod gpt2;
pub use base::DecisionTransformer;
pub use config::DecisionTransformerConfig;
pub use gpt2::Gpt2Encoder;
