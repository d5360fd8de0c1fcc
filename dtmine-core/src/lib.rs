#![warn(missing_docs)]
//! Episode windowing and batch collation for Decision Transformer training.
//!
//! Recorded episodes are cut into fixed-length windows of
//! states, actions, rewards, done flags, returns-to-go, timesteps and an attention
//! mask, then concatenated into a [`DtBatch`]. The crate is backend independent;
//! conversion to tensors happens in the backend crates.
pub mod error;
pub mod record;

mod batch;
mod collator;
mod episode;
mod returns;
mod window;
pub use batch::DtBatch;
pub use collator::{CollatorConfig, EpisodeCollator};
pub use episode::Episode;
pub use returns::discount_cumsum;
pub use window::{sample_window, Window, WindowSpec, DONE_PADDING};
