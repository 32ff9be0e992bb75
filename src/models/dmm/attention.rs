use std::num::ParseIntError;

use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Distribution, Tensor};

use crate::utils::masked_softmax;

/// Bernoulli outcome model `p(y | z_{1:T})`.
///
/// Each latent `z_t` is projected and scored by cosine similarity against a learned context
/// vector; the scores are softmaxed over the valid steps only, the trajectory is pooled with
/// those weights and an MLP maps the pooled latent to a probability.
#[derive(Module, Debug)]
pub struct PredicterAttention<B: Backend> {
    context: Param<Tensor<B, 2>>, // [att_dim, 1]
    projection: Linear<B>,
    mlp: Vec<Linear<B>>,
    beta: f32,
}

impl<B: Backend> PredicterAttention<B> {
    /// Softmax weights `[N, T]` over time; steps with `mask == 0` receive ~0 weight.
    pub fn attention_weights(&self, z: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch, steps, z_dim] = z.dims();

        let projected = self
            .projection
            .forward(z.reshape([batch * steps, z_dim]))
            .tanh();
        let context = self.context.val();

        let dot = projected.clone().matmul(context.clone());
        let projected_norm = (projected.clone() * projected).sum_dim(1).sqrt();
        let context_norm = (context.clone() * context).sum_dim(0).sqrt();
        let cosine = dot / (projected_norm * context_norm).clamp_min(1e-6);

        let scores = (cosine * self.beta).reshape([batch, steps]);
        masked_softmax(scores, mask, 1)
    }

    /// Returns the outcome probability of each sequence, shape `[N]`.
    pub fn forward(&self, z: Tensor<B, 3>, mask: Tensor<B, 2>) -> Tensor<B, 1> {
        let [batch, _, z_dim] = z.dims();

        let weights: Tensor<B, 3> = self.attention_weights(z.clone(), mask).unsqueeze_dim(2);
        let pooled = (z * weights).sum_dim(1).reshape([batch, z_dim]);

        let last = self.mlp.len() - 1;
        let mut x = pooled;
        for (i, layer) in self.mlp.iter().enumerate() {
            x = layer.forward(x);
            if i < last {
                x = activation::relu(x);
            }
        }

        activation::sigmoid(x).reshape([batch])
    }
}

#[derive(Config, Debug)]
pub struct PredicterAttentionConfig {
    z_dim: usize,
    att_dim: usize,

    #[config(default = "Vec::new()")]
    hidden_dims: Vec<usize>,

    /// Sharpness of the attention softmax.
    #[config(default = 0.1)]
    beta: f32,
}

impl PredicterAttentionConfig {
    /// Reads hidden widths written as `"48-24-12"`; `"-"` means no hidden layer.
    pub fn with_mlp_dims(self, dims: &str) -> Result<Self, ParseIntError> {
        if dims == "-" || dims.is_empty() {
            return Ok(self.with_hidden_dims(Vec::new()));
        }

        let hidden_dims = dims
            .split('-')
            .map(str::parse)
            .collect::<Result<Vec<usize>, _>>()?;

        Ok(self.with_hidden_dims(hidden_dims))
    }

    pub fn init<B: Backend>(&self) -> PredicterAttention<B> {
        let bound = (self.att_dim as f64).sqrt();
        let context: Tensor<B, 2> = Tensor::random([self.att_dim, 1], Distribution::Default);
        let context = context * (2.0 * bound) - bound;

        let widths: Vec<usize> = std::iter::once(self.z_dim)
            .chain(self.hidden_dims.iter().copied())
            .chain(std::iter::once(1))
            .collect();
        let mlp = widths
            .windows(2)
            .map(|w| LinearConfig::new(w[0], w[1]).init())
            .collect();

        PredicterAttention {
            context: Param::from(context),
            projection: LinearConfig::new(self.z_dim, self.att_dim).init(),
            mlp,
            beta: self.beta,
        }
    }
}
