//! Optimizers for learnable loss parameters

mod optimizer;
mod sgd;

pub use optimizer::Optimizer;
pub use sgd::SGD;
