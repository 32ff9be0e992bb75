use burn::config::Config;
use burn::module::Module;
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};

/// `log(1 + exp(beta * x)) / beta`, evaluated as `relu(y) + log(1 + exp(-|y|))` so large
/// inputs do not overflow.
#[derive(Module, Debug, Clone)]
pub struct Softplus {
    beta: f32,
}

impl Softplus {
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        let x = x * self.beta;
        let tail = (x.clone().abs().neg().exp() + 1.0).log();

        (activation::relu(x) + tail) / self.beta
    }
}

#[derive(Config, Debug)]
pub struct SoftplusConfig {
    #[config(default = 1.0)]
    beta: f32,
}

impl SoftplusConfig {
    pub fn init(&self) -> Softplus {
        Softplus { beta: self.beta }
    }
}
