use burn::config::Config;
use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Data, Shape, Tensor};

use crate::modules::softplus::{Softplus, SoftplusConfig};

/// Latent transition `p(z_t | z_{t-1}, s)`: a gated mix of a linear map of `z_{t-1}` and a
/// nonlinear proposal conditioned on the static covariates.
#[derive(Module, Debug)]
pub struct GatedTransition<B: Backend> {
    gate_hidden: Linear<B>,
    gate_out: Linear<B>,
    proposed_hidden: Linear<B>,
    proposed_out: Linear<B>,
    scale_proj: Linear<B>,
    loc_proj: Linear<B>,
    softplus: Softplus,
}

impl<B: Backend> GatedTransition<B> {
    pub fn forward(
        &self,
        z_prev: Tensor<B, 2>,
        statics: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let concat = Tensor::cat(vec![z_prev.clone(), statics], 1);

        let gate = activation::relu(self.gate_hidden.forward(concat.clone()));
        let gate = activation::sigmoid(self.gate_out.forward(gate));

        let proposed = activation::relu(self.proposed_hidden.forward(concat));
        let proposed = self.proposed_out.forward(proposed);

        let loc = (gate.clone().neg() + 1.0) * self.loc_proj.forward(z_prev) + gate * proposed.clone();
        let scale = self
            .softplus
            .forward(self.scale_proj.forward(activation::relu(proposed)));

        (loc, scale)
    }
}

#[derive(Config, Debug)]
pub struct GatedTransitionConfig {
    z_dim: usize,
    static_dim: usize,
    transition_dim: usize,
}

impl GatedTransitionConfig {
    pub fn init<B: Backend>(&self) -> GatedTransition<B> {
        let d_concat = self.z_dim + self.static_dim;

        // z_{t-1} -> loc starts out as the identity map
        let mut loc_proj = LinearConfig::new(self.z_dim, self.z_dim).init();
        loc_proj.weight = Param::from(identity::<B>(self.z_dim));
        loc_proj.bias = Some(Param::from(Tensor::zeros([self.z_dim])));

        GatedTransition {
            gate_hidden: LinearConfig::new(d_concat, self.transition_dim).init(),
            gate_out: LinearConfig::new(self.transition_dim, self.z_dim).init(),
            proposed_hidden: LinearConfig::new(d_concat, self.transition_dim).init(),
            proposed_out: LinearConfig::new(self.transition_dim, self.z_dim).init(),
            scale_proj: LinearConfig::new(self.z_dim, self.z_dim).init(),
            loc_proj,
            softplus: SoftplusConfig::new().init(),
        }
    }
}

fn identity<B: Backend>(size: usize) -> Tensor<B, 2> {
    let mut values = vec![0.0f32; size * size];
    for i in 0..size {
        values[i * size + i] = 1.0;
    }

    let data = Data::new(values, Shape::new([size, size]));
    Tensor::from_data(data.convert::<B::FloatElem>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn loc_projection_starts_as_identity() {
        let transition = GatedTransitionConfig::new(3, 2, 6).init::<TestBackend>();
        let z: Tensor<TestBackend, 2> = Tensor::random([4, 3], Distribution::Default);

        let projected = transition.loc_proj.forward(z.clone());

        let expected = z.into_data().value;
        for (a, b) in projected.into_data().value.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn transitions_keep_latent_shape() {
        let transition = GatedTransitionConfig::new(3, 2, 6).init::<TestBackend>();
        let z: Tensor<TestBackend, 2> = Tensor::random([4, 3], Distribution::Default);
        let statics: Tensor<TestBackend, 2> = Tensor::ones([4, 2]);

        let (loc, scale) = transition.forward(z, statics);

        assert_eq!(loc.dims(), [4, 3]);
        assert_eq!(scale.dims(), [4, 3]);
        assert!(scale.into_data().value.iter().all(|&s| s > 0.0));
    }
}
