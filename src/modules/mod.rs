pub mod softplus;
