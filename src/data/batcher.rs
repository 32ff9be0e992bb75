use burn::config::Config;
use burn::tensor::{backend::Backend, Data, Shape, Tensor};
use tracing::{debug, info};

use super::dmmitem::{DmmDataset, Sequence};
use super::minibatch::MiniBatch;
use super::packed::PackedSequence;
use crate::error::BatchError;
use crate::utils::{get_mini_batch_mask, reverse_sequences};

#[derive(Config, Debug)]
pub struct BatchConfig {
    /// Examples longer than this are dropped before batching.
    #[config(default = 720)]
    max_len: usize,

    #[config(default = 128)]
    batch_size: usize,

    /// Fuse the feature mask into the time-reversed guide input.
    #[config(default = true)]
    use_feature_mask: bool,
}

/// How the observation feature mask flows into a mini-batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeatureMaskPolicy {
    /// No feature mask in the dataset.
    Absent,
    /// Mask is returned for the likelihood but the guide only sees observations.
    LikelihoodOnly,
    /// Mask channels are appended to the observations before reversal and packing.
    Fused,
}

impl FeatureMaskPolicy {
    pub fn select(has_feature_mask: bool, use_feature_mask: bool) -> Self {
        match (has_feature_mask, use_feature_mask) {
            (false, _) => FeatureMaskPolicy::Absent,
            (true, false) => FeatureMaskPolicy::LikelihoodOnly,
            (true, true) => FeatureMaskPolicy::Fused,
        }
    }
}

pub struct DmmBatcher<B: Backend> {
    config: BatchConfig,
    device: Option<B::Device>,
}

impl<B: Backend> DmmBatcher<B> {
    /// `device` selects where batch tensors are placed; `None` keeps the backend default.
    pub fn new(config: BatchConfig, device: Option<B::Device>) -> Self {
        Self { config, device }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Dataset indices with `0 < length <= max_len`, in dataset order.
    pub fn keep_indices(&self, dataset: &DmmDataset) -> Vec<usize> {
        dataset
            .seq_lengths
            .iter()
            .enumerate()
            .filter(|(_, len)| **len > 0 && **len <= self.config.max_len)
            .map(|(index, _)| index)
            .collect()
    }

    /// Lazily assembles the mini-batches of `dataset`, one chunk of `batch_size` kept examples
    /// at a time. Dataset shape errors surface before the first batch is built.
    pub fn iter_batches<'a>(
        &'a self,
        dataset: &'a DmmDataset,
    ) -> Result<impl Iterator<Item = Result<MiniBatch<B>, BatchError>> + 'a, BatchError> {
        if self.config.batch_size == 0 {
            return Err(BatchError::InvalidBatchSize);
        }
        dataset.validate()?;

        let kept = self.keep_indices(dataset);
        let chunks: Vec<Vec<usize>> = kept
            .chunks(self.config.batch_size)
            .map(<[usize]>::to_vec)
            .collect();

        info!(
            kept = kept.len(),
            dropped = dataset.len() - kept.len(),
            batches = chunks.len(),
            "partitioned dataset into mini-batches"
        );

        Ok(chunks
            .into_iter()
            .map(move |indices| self.get_mini_batch(&indices, dataset)))
    }

    /// Filters, partitions and assembles the whole dataset. Fails as a unit: either every
    /// batch is returned or none.
    pub fn batchify(&self, dataset: &DmmDataset) -> Result<Vec<MiniBatch<B>>, BatchError> {
        self.iter_batches(dataset)?.collect()
    }

    pub fn get_mini_batch(
        &self,
        indices: &[usize],
        dataset: &DmmDataset,
    ) -> Result<MiniBatch<B>, BatchError> {
        if indices.is_empty() {
            return Err(BatchError::EmptyBatch);
        }
        dataset.check_columns()?;

        let seq_lengths = indices
            .iter()
            .map(|&index| {
                let length = *dataset
                    .seq_lengths
                    .get(index)
                    .ok_or(BatchError::IndexOutOfRange {
                        index,
                        len: dataset.len(),
                    })?;
                let stored = dataset.sequences[index].len();

                if length == 0 || length > stored {
                    Err(BatchError::InvalidLength {
                        index,
                        length,
                        stored,
                    })
                } else {
                    Ok(length)
                }
            })
            .collect::<Result<Vec<usize>, BatchError>>()?;

        // Stable sort keeps equal-length examples in their original relative order.
        let mut order: Vec<usize> = (0..indices.len()).collect();
        order.sort_by(|&a, &b| seq_lengths[b].cmp(&seq_lengths[a]));

        let sorted_indices: Vec<usize> = order.iter().map(|&i| indices[i]).collect();
        let sorted_seq_lengths: Vec<usize> = order.iter().map(|&i| seq_lengths[i]).collect();

        let batch_size = indices.len();
        let t_max = sorted_seq_lengths[0];

        let sequence = self.pad_sequences(
            "observation width",
            &dataset.sequences,
            &sorted_indices,
            t_max,
            dataset.input_dim,
        )?;

        let mut statics = Vec::with_capacity(batch_size * dataset.static_dim);
        for &index in &sorted_indices {
            let row = &dataset.statics[index];
            if row.len() != dataset.static_dim {
                return Err(BatchError::ShapeMismatch {
                    field: "static width",
                    expected: dataset.static_dim,
                    found: row.len(),
                });
            }
            statics.extend_from_slice(row);
        }
        let statics = self.to_tensor(statics, [batch_size, dataset.static_dim]);

        let mask = self.place(get_mini_batch_mask([batch_size, t_max], &sorted_seq_lengths)?);

        let y = dataset
            .y
            .as_ref()
            .map(|y| self.gather_scalars(y, &sorted_indices));
        let y_mask = dataset
            .y_mask
            .as_ref()
            .map(|y_mask| self.gather_scalars(y_mask, &sorted_indices));

        let policy = FeatureMaskPolicy::select(
            dataset.has_feature_mask(),
            self.config.use_feature_mask,
        );

        let feature_mask = match &dataset.feature_mask {
            Some(feature_mask) => Some(self.pad_sequences(
                "feature_mask width",
                feature_mask,
                &sorted_indices,
                t_max,
                dataset.input_dim,
            )?),
            None => None,
        };

        let guide_input = match (policy, &feature_mask) {
            (FeatureMaskPolicy::Fused, Some(feature_mask)) => {
                Tensor::cat(vec![sequence.clone(), feature_mask.clone()], 2)
            }
            _ => sequence.clone(),
        };

        let reversed = reverse_sequences(guide_input, &sorted_seq_lengths)?;
        let reversed_packed = PackedSequence::pack(reversed, &sorted_seq_lengths)?;

        debug!(
            batch_size,
            t_max,
            ?policy,
            channels = reversed_packed.channels(),
            "assembled mini-batch"
        );

        Ok(MiniBatch {
            statics,
            sequence,
            reversed_packed,
            mask,
            sorted_seq_lengths,
            feature_mask,
            y,
            y_mask,
            source_indices: sorted_indices,
        })
    }

    /// Copies the first `t_max` stored steps of each selected sequence into a zero-filled
    /// `[B, t_max, width]` tensor.
    fn pad_sequences(
        &self,
        field: &'static str,
        sequences: &[Sequence],
        sorted_indices: &[usize],
        t_max: usize,
        width: usize,
    ) -> Result<Tensor<B, 3>, BatchError> {
        let batch_size = sorted_indices.len();
        let mut values = vec![0.0f32; batch_size * t_max * width];

        for (b, &index) in sorted_indices.iter().enumerate() {
            for (t, step) in sequences[index].iter().take(t_max).enumerate() {
                if step.len() != width {
                    return Err(BatchError::ShapeMismatch {
                        field,
                        expected: width,
                        found: step.len(),
                    });
                }
                let start = (b * t_max + t) * width;
                values[start..start + width].copy_from_slice(step);
            }
        }

        Ok(self.to_tensor(values, [batch_size, t_max, width]))
    }

    fn gather_scalars(&self, column: &[f32], sorted_indices: &[usize]) -> Tensor<B, 1> {
        let values: Vec<f32> = sorted_indices.iter().map(|&index| column[index]).collect();
        self.to_tensor(values, [sorted_indices.len()])
    }

    fn to_tensor<const D: usize>(&self, values: Vec<f32>, dims: [usize; D]) -> Tensor<B, D> {
        let data = Data::new(values, Shape::new(dims));
        self.place(Tensor::from_data(data.convert::<B::FloatElem>()))
    }

    fn place<const D: usize>(&self, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match &self.device {
            Some(device) => tensor.to_device(device),
            None => tensor,
        }
    }
}
