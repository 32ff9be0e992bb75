use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::{backend::Backend, Tensor};

use crate::modules::softplus::{Softplus, SoftplusConfig};

/// Guide building block `q(z_t | z_{t-1}, x_{t:T}, s)`. The future observations enter through
/// `h_rnn`, the hidden state of a recurrent pass over the time-reversed batch.
#[derive(Module, Debug)]
pub struct Combiner<B: Backend> {
    z_to_hidden: Linear<B>,
    hidden_to_loc: Linear<B>,
    hidden_to_scale: Linear<B>,
    softplus: Softplus,
}

impl<B: Backend> Combiner<B> {
    pub fn forward(
        &self,
        z_prev: Tensor<B, 2>,
        statics: Tensor<B, 2>,
        h_rnn: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let concat = Tensor::cat(vec![z_prev, statics], 1);
        let h_combined = (self.z_to_hidden.forward(concat).tanh() + h_rnn) * 0.5;

        let loc = self.hidden_to_loc.forward(h_combined.clone());
        let scale = self.softplus.forward(self.hidden_to_scale.forward(h_combined));

        (loc, scale)
    }
}

#[derive(Config, Debug)]
pub struct CombinerConfig {
    z_dim: usize,
    static_dim: usize,
    rnn_dim: usize,
}

impl CombinerConfig {
    pub fn init<B: Backend>(&self) -> Combiner<B> {
        Combiner {
            z_to_hidden: LinearConfig::new(self.z_dim + self.static_dim, self.rnn_dim).init(),
            hidden_to_loc: LinearConfig::new(self.rnn_dim, self.z_dim).init(),
            hidden_to_scale: LinearConfig::new(self.rnn_dim, self.z_dim).init(),
            softplus: SoftplusConfig::new().init(),
        }
    }
}
