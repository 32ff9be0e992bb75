pub mod batcher;
pub mod dmmitem;
pub mod minibatch;
pub mod packed;
