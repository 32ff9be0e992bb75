use burn::tensor::activation;
use burn::tensor::{backend::Backend, Data, Int, Shape, Tensor};

use crate::data::packed::PackedSequence;
use crate::error::BatchError;

/// Builds the `[B, T]` validity mask of a padded batch: `1.0` for `t < seq_lengths[b]`,
/// `0.0` afterwards.
pub fn get_mini_batch_mask<B: Backend>(
    dims: [usize; 2],
    seq_lengths: &[usize],
) -> Result<Tensor<B, 2>, BatchError> {
    let [batch, t_max] = dims;
    check_lengths(batch, t_max, seq_lengths)?;

    let mut mask = vec![0.0f32; batch * t_max];
    for (b, &len) in seq_lengths.iter().enumerate() {
        mask[b * t_max..b * t_max + len].fill(1.0);
    }

    let data = Data::new(mask, Shape::new([batch, t_max]));
    Ok(Tensor::from_data(data.convert::<B::FloatElem>()))
}

/// Reverses the valid prefix of every row along the time axis (dim 1).
///
/// Row `b` of the output holds `x[b, L-1-t]` for `t < L = seq_lengths[b]` and zeros
/// afterwards, so padding stays at the tail whatever the input held there.
pub fn reverse_sequences<B: Backend>(
    mini_batch: Tensor<B, 3>,
    seq_lengths: &[usize],
) -> Result<Tensor<B, 3>, BatchError> {
    let [batch, t_max, dim] = mini_batch.dims();
    check_lengths(batch, t_max, seq_lengths)?;
    let device = mini_batch.device();

    let rows: Vec<Tensor<B, 3>> = seq_lengths
        .iter()
        .enumerate()
        .map(|(b, &len)| {
            if len == 0 {
                let empty: Tensor<B, 3> = Tensor::zeros([1, t_max, dim]).to_device(&device);
                return empty;
            }

            let time_slice: Vec<i64> = (0..len as i64).rev().collect();
            let time_slice = Data::new(time_slice, Shape::new([len]));
            let time_slice: Tensor<B, 1, Int> =
                Tensor::from_data(time_slice.convert::<B::IntElem>()).to_device(&device);

            let reversed = mini_batch
                .clone()
                .slice([b..b + 1, 0..len, 0..dim])
                .select(1, time_slice);

            if len < t_max {
                let padding: Tensor<B, 3> = Tensor::zeros([1, t_max - len, dim]).to_device(&device);
                Tensor::cat(vec![reversed, padding], 1)
            } else {
                reversed
            }
        })
        .collect();

    Ok(Tensor::cat(rows, 0))
}

/// Restores a dense `[B, T_max, D]` array from the packed output of a recurrent pass over
/// time-reversed input, and flips it back into chronological order.
pub fn pad_and_reverse<B: Backend>(
    rnn_output: &PackedSequence<B>,
    seq_lengths: &[usize],
) -> Result<Tensor<B, 3>, BatchError> {
    let packed_lengths = rnn_output.lengths();
    if seq_lengths.len() != packed_lengths.len() {
        return Err(BatchError::ShapeMismatch {
            field: "seq_lengths",
            expected: packed_lengths.len(),
            found: seq_lengths.len(),
        });
    }
    if let Some((&expected, &found)) = packed_lengths
        .iter()
        .zip(seq_lengths)
        .find(|(packed, given)| packed != given)
    {
        return Err(BatchError::ShapeMismatch {
            field: "seq_lengths value",
            expected,
            found,
        });
    }

    reverse_sequences(rnn_output.unpack(), seq_lengths)
}

/// Softmax along `dim` where positions with `mask == 0` get a large negative score first,
/// leaving them with a weight of (numerically) zero.
pub fn masked_softmax<B: Backend, const D: usize>(
    scores: Tensor<B, D>,
    mask: Tensor<B, D>,
    dim: usize,
) -> Tensor<B, D> {
    let scores = scores.mask_fill(mask.equal_elem(0.0), -1e9);
    activation::softmax(scores, dim)
}

fn check_lengths(batch: usize, t_max: usize, seq_lengths: &[usize]) -> Result<(), BatchError> {
    if seq_lengths.len() != batch {
        return Err(BatchError::ShapeMismatch {
            field: "seq_lengths",
            expected: batch,
            found: seq_lengths.len(),
        });
    }

    match seq_lengths.iter().position(|&len| len > t_max) {
        Some(row) => Err(BatchError::InvalidRowLength {
            row,
            length: seq_lengths[row],
            t_max,
        }),
        None => Ok(()),
    }
}
