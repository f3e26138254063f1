//! Neural-network building blocks: the dense layer and its activations.

pub mod activation;
pub mod dense;

pub use activation::Activation;
pub use dense::Dense;
