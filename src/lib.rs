//! # Destila: feature-map distillation losses
//!
//! Destila provides the channel-wise divergence (CWD) distillation loss on
//! top of a small tape-based autograd engine, so the loss can be evaluated
//! and back-propagated inside a Rust training loop.
//!
//! ## Architecture
//!
//! - **autograd**: Shaped tensors with gradient tape (pooling, 1x1 conv, softmax)
//! - **distill**: Channel-wise divergence loss and the loss registry
//! - **optim**: SGD for the loss's learnable projection
//! - **config**: Declarative YAML configuration and CLI arguments

pub mod autograd;
pub mod config;
pub mod distill;
pub mod optim;

pub mod error;

// Re-export commonly used types
pub use autograd::{backward, Tensor};
pub use distill::{ChannelWiseDivergence, DistillLoss, LossRegistry};
pub use error::{Error, Result};
