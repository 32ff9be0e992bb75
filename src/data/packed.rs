use burn::tensor::{backend::Backend, Tensor};

use crate::error::BatchError;

/// Variable-length batch stored time-major without its padding.
///
/// Row block `t` of `data` holds the `batch_sizes[t]` sequences still active at step `t`
/// (those with `length > t`). Because lengths are sorted in descending order, the active rows
/// of every step are always a prefix of the batch.
#[derive(Clone, Debug)]
pub struct PackedSequence<B: Backend> {
    data: Tensor<B, 2>,        // [sum(lengths), D]
    batch_sizes: Vec<usize>,   // [T_max]
    lengths: Vec<usize>,       // [B], non-increasing
}

impl<B: Backend> PackedSequence<B> {
    pub fn pack(padded: Tensor<B, 3>, lengths: &[usize]) -> Result<Self, BatchError> {
        let [batch, t_max, dim] = padded.dims();

        if batch == 0 {
            return Err(BatchError::EmptyBatch);
        }
        if lengths.len() != batch {
            return Err(BatchError::ShapeMismatch {
                field: "lengths",
                expected: batch,
                found: lengths.len(),
            });
        }
        for (row, &length) in lengths.iter().enumerate() {
            if length == 0 || length > t_max {
                return Err(BatchError::InvalidRowLength {
                    row,
                    length,
                    t_max,
                });
            }
        }
        if let Some(w) = lengths.windows(2).find(|w| w[1] > w[0]) {
            return Err(BatchError::UnsortedLengths {
                prev: w[0],
                next: w[1],
            });
        }

        let batch_sizes: Vec<usize> = (0..lengths[0])
            .map(|t| lengths.iter().take_while(|&&len| len > t).count())
            .collect();

        let steps: Vec<Tensor<B, 2>> = batch_sizes
            .iter()
            .enumerate()
            .map(|(t, &active)| {
                padded
                    .clone()
                    .slice([0..active, t..t + 1, 0..dim])
                    .reshape([active, dim])
            })
            .collect();

        Ok(Self {
            data: Tensor::cat(steps, 0),
            batch_sizes,
            lengths: lengths.to_vec(),
        })
    }

    /// Wraps a step-wise output computed over this sequence's layout, e.g. the hidden states
    /// of a recurrent pass, keeping the same lengths and batch sizes.
    pub fn with_data(&self, data: Tensor<B, 2>) -> Result<Self, BatchError> {
        let [rows, _] = data.dims();
        let expected: usize = self.batch_sizes.iter().sum();

        if rows != expected {
            return Err(BatchError::ShapeMismatch {
                field: "packed data rows",
                expected,
                found: rows,
            });
        }

        Ok(Self {
            data,
            batch_sizes: self.batch_sizes.clone(),
            lengths: self.lengths.clone(),
        })
    }

    pub fn data(&self) -> &Tensor<B, 2> {
        &self.data
    }

    pub fn batch_sizes(&self) -> &[usize] {
        &self.batch_sizes
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn channels(&self) -> usize {
        self.data.dims()[1]
    }

    /// Which batch rows still carry data at step `t`.
    pub fn active_rows(&self, t: usize) -> Vec<bool> {
        self.lengths.iter().map(|&len| len > t).collect()
    }

    /// Iterates `(t, x_t)` with `x_t` of shape `[batch_sizes[t], D]`, skipping padding.
    pub fn steps(&self) -> impl Iterator<Item = (usize, Tensor<B, 2>)> + '_ {
        let dim = self.channels();
        let mut offset = 0;

        self.batch_sizes
            .iter()
            .enumerate()
            .map(move |(t, &active)| {
                let step = self.data.clone().slice([offset..offset + active, 0..dim]);
                offset += active;
                (t, step)
            })
    }

    /// Dense `[B, T_max, D]` view with zeros wherever a row has already ended.
    pub fn unpack(&self) -> Tensor<B, 3> {
        let batch = self.lengths.len();
        let dim = self.channels();
        let device = self.data.device();

        let steps: Vec<Tensor<B, 3>> = self
            .steps()
            .map(|(_, step)| {
                let [active, _] = step.dims();
                let step = if active < batch {
                    let padding: Tensor<B, 2> =
                        Tensor::zeros([batch - active, dim]).to_device(&device);
                    Tensor::cat(vec![step, padding], 0)
                } else {
                    step
                };
                step.reshape([batch, 1, dim])
            })
            .collect();

        Tensor::cat(steps, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Data, Shape};

    type TestBackend = NdArray;

    fn padded() -> Tensor<TestBackend, 3> {
        // [3, 3, 1] with lengths [3, 2, 1]
        let values: Vec<f32> = vec![
            1.0, 2.0, 3.0, //
            4.0, 5.0, 0.0, //
            6.0, 0.0, 0.0,
        ];
        Tensor::from_data(Data::new(values, Shape::new([3, 3, 1])))
    }

    #[test]
    fn pack_is_time_major_without_padding() {
        let packed = PackedSequence::pack(padded(), &[3, 2, 1]).unwrap();

        assert_eq!(packed.batch_sizes(), &[3, 2, 1]);
        assert_eq!(packed.lengths(), &[3, 2, 1]);
        assert_eq!(packed.channels(), 1);
        assert_eq!(
            packed.data().clone().into_data().value,
            vec![1.0, 4.0, 6.0, 2.0, 5.0, 3.0]
        );
    }

    #[test]
    fn unpack_restores_dense_batch() {
        let packed = PackedSequence::pack(padded(), &[3, 2, 1]).unwrap();

        let unpacked = packed.unpack();

        assert_eq!(unpacked.dims(), [3, 3, 1]);
        assert_eq!(unpacked.into_data().value, padded().into_data().value);
    }

    #[test]
    fn unpack_zeroes_values_beyond_length() {
        let values: Vec<f32> = vec![1.0, 2.0, 9.0, 9.0];
        let batch: Tensor<TestBackend, 3> =
            Tensor::from_data(Data::new(values, Shape::new([2, 2, 1])));

        let packed = PackedSequence::pack(batch, &[2, 1]).unwrap();

        assert_eq!(packed.unpack().into_data().value, vec![1.0, 2.0, 9.0, 0.0]);
    }

    #[test]
    fn steps_only_visit_active_rows() {
        let packed = PackedSequence::pack(padded(), &[3, 2, 1]).unwrap();

        let sizes: Vec<(usize, usize)> = packed
            .steps()
            .map(|(t, step)| (t, step.dims()[0]))
            .collect();

        assert_eq!(sizes, vec![(0, 3), (1, 2), (2, 1)]);
        assert_eq!(packed.active_rows(1), vec![true, true, false]);
    }

    #[test]
    fn pack_rejects_unsorted_lengths() {
        let err = PackedSequence::pack(padded(), &[2, 3, 1]).unwrap_err();

        assert_eq!(err, BatchError::UnsortedLengths { prev: 2, next: 3 });
    }

    #[test]
    fn pack_rejects_zero_length() {
        let err = PackedSequence::pack(padded(), &[3, 2, 0]).unwrap_err();

        assert_eq!(
            err,
            BatchError::InvalidRowLength {
                row: 2,
                length: 0,
                t_max: 3
            }
        );
    }

    #[test]
    fn with_data_keeps_layout() {
        let packed = PackedSequence::pack(padded(), &[3, 2, 1]).unwrap();
        let hidden: Tensor<TestBackend, 2> = Tensor::ones([6, 4]);

        let output = packed.with_data(hidden).unwrap();

        assert_eq!(output.channels(), 4);
        assert_eq!(output.unpack().dims(), [3, 3, 4]);
        assert!(packed.with_data(Tensor::ones([5, 4])).is_err());
    }
}
