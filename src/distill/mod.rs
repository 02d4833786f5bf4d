//! Feature-map knowledge distillation
//!
//! Losses that pull a student network's intermediate feature maps toward a
//! teacher's, used alongside the task loss inside an external training loop.
//!
//! ## Features
//!
//! - **Channel-wise divergence**: per-channel spatial softmax with temperature,
//!   cross-entropy against the teacher, `tau²` rescaling
//! - **Parity-aware downsampling**: student maps at twice the teacher
//!   resolution (odd sizes rounded up) are pooled to the teacher's size
//! - **Channel projection**: learned 1x1 convolution when channel counts differ
//! - **Registry**: build losses by configuration key
//!
//! ## Example
//!
//! ```
//! use destila::distill::ChannelWiseDivergence;
//! use destila::{backward, Tensor};
//!
//! let loss_fn = ChannelWiseDivergence::with_seed(8, 4, 1.0, 1.0, 0)?;
//! let data: Vec<f32> = (0..8 * 8 * 8).map(|i| (i % 7) as f32 * 0.1).collect();
//! let student = Tensor::from_shape_vec(&[1, 8, 8, 8], data, true)?;
//! let teacher = Tensor::from_shape_vec(&[1, 4, 4, 4], vec![0.2; 64], false)?;
//!
//! let mut loss = loss_fn.forward(&student, &teacher)?;
//! backward(&mut loss, None);
//! assert!(loss_fn.parameters()[0].grad().is_some());
//! # Ok::<(), destila::Error>(())
//! ```

mod cwd;
mod pool;
mod registry;

#[cfg(test)]
mod tests;

pub use cwd::{ChannelWiseDivergence, SoftTargets};
pub use pool::{downsample, downsampled_hw, parity_padding, PadEdge};
pub use registry::{DistillLoss, LossBuilder, LossRegistry};
