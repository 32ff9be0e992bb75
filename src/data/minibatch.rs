use burn::tensor::{backend::Backend, Tensor};

use super::packed::PackedSequence;

/// One assembled mini-batch. Every per-example field shares the same row order, sorted by
/// descending sequence length; `source_indices[b]` is the dataset index behind row `b`.
#[derive(Clone, Debug)]
pub struct MiniBatch<B: Backend> {
    pub statics: Tensor<B, 2>,                // [B, S]
    pub sequence: Tensor<B, 3>,               // [B, T, I]
    pub reversed_packed: PackedSequence<B>,   // [sum(L), I] or [sum(L), 2I]
    pub mask: Tensor<B, 2>,                   // [B, T]
    pub sorted_seq_lengths: Vec<usize>,       // [B]
    pub feature_mask: Option<Tensor<B, 3>>,   // [B, T, I]
    pub y: Option<Tensor<B, 1>>,              // [B]
    pub y_mask: Option<Tensor<B, 1>>,         // [B]
    pub source_indices: Vec<usize>,           // [B]
}

impl<B: Backend> MiniBatch<B> {
    pub fn len(&self) -> usize {
        self.source_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_indices.is_empty()
    }

    pub fn max_len(&self) -> usize {
        self.sorted_seq_lengths.first().copied().unwrap_or(0)
    }

    /// Channel count seen by the recurrent guide, doubled when the feature mask is fused in.
    pub fn input_channels(&self) -> usize {
        self.reversed_packed.channels()
    }
}
