use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};

use crate::modules::softplus::{Softplus, SoftplusConfig};

/// Gaussian observation model `p(x_t | z_t)`, optionally conditioned on which features of
/// `x_t` were observed.
#[derive(Module, Debug)]
pub struct Emitter<B: Backend> {
    gate_hidden: Linear<B>,
    gate_out: Linear<B>,
    proposed_hidden: Linear<B>,
    proposed_out: Linear<B>,
    scale_proj: Linear<B>,
    loc_proj: Linear<B>,
    softplus: Softplus,
    min_x_scale: f32,
}

impl<B: Backend> Emitter<B> {
    /// Returns `(loc, scale)` of shape `[B, input_dim]`. `feature_mask_t` must be given iff the
    /// emitter was configured with `use_feature_mask`.
    pub fn forward(
        &self,
        z_t: Tensor<B, 2>,
        feature_mask_t: Option<Tensor<B, 2>>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let input = match feature_mask_t {
            Some(mask) => Tensor::cat(vec![z_t, mask], 1),
            None => z_t,
        };

        let gate = activation::relu(self.gate_hidden.forward(input.clone()));
        let gate = activation::sigmoid(self.gate_out.forward(gate));

        let proposed = activation::relu(self.proposed_hidden.forward(input.clone()));
        let proposed = self.proposed_out.forward(proposed);

        let loc = (gate.clone().neg() + 1.0) * self.loc_proj.forward(input) + gate * proposed.clone();

        let scale = self
            .softplus
            .forward(self.scale_proj.forward(activation::relu(proposed)));
        let scale = scale + self.min_x_scale;

        (loc, scale)
    }
}

#[derive(Config, Debug)]
pub struct EmitterConfig {
    input_dim: usize,
    z_dim: usize,
    emission_dim: usize,

    #[config(default = false)]
    use_feature_mask: bool,

    /// Lower bound added to the scale so the density stays bounded.
    #[config(default = 0.0)]
    min_x_scale: f32,
}

impl EmitterConfig {
    pub fn init<B: Backend>(&self) -> Emitter<B> {
        let d_cond = if self.use_feature_mask {
            self.z_dim + self.input_dim
        } else {
            self.z_dim
        };

        Emitter {
            gate_hidden: LinearConfig::new(d_cond, self.emission_dim).init(),
            gate_out: LinearConfig::new(self.emission_dim, self.input_dim).init(),
            proposed_hidden: LinearConfig::new(d_cond, self.emission_dim).init(),
            proposed_out: LinearConfig::new(self.emission_dim, self.input_dim).init(),
            scale_proj: LinearConfig::new(self.input_dim, self.input_dim).init(),
            loc_proj: LinearConfig::new(d_cond, self.input_dim).init(),
            softplus: SoftplusConfig::new().init(),
            min_x_scale: self.min_x_scale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn emits_input_shaped_gaussian() {
        let emitter = EmitterConfig::new(3, 4, 8).init::<TestBackend>();
        let z: Tensor<TestBackend, 2> = Tensor::random([5, 4], Distribution::Default);

        let (loc, scale) = emitter.forward(z, None);

        assert_eq!(loc.dims(), [5, 3]);
        assert_eq!(scale.dims(), [5, 3]);
    }

    #[test]
    fn conditions_on_feature_mask() {
        let emitter = EmitterConfig::new(3, 4, 8)
            .with_use_feature_mask(true)
            .with_min_x_scale(0.25)
            .init::<TestBackend>();
        let z: Tensor<TestBackend, 2> = Tensor::random([2, 4], Distribution::Default);
        let mask: Tensor<TestBackend, 2> = Tensor::ones([2, 3]);

        let (loc, scale) = emitter.forward(z, Some(mask));

        assert_eq!(loc.dims(), [2, 3]);
        assert!(scale.into_data().value.iter().all(|&s| s >= 0.25));
    }
}
