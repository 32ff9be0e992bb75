pub mod data;
pub mod error;
pub mod models;
pub mod modules;
pub mod utils;

pub use data::batcher::{BatchConfig, DmmBatcher, FeatureMaskPolicy};
pub use data::dmmitem::{load_from_file, DmmDataset, DmmItem};
pub use data::minibatch::MiniBatch;
pub use data::packed::PackedSequence;
pub use error::BatchError;
pub use utils::{get_mini_batch_mask, pad_and_reverse, reverse_sequences};
