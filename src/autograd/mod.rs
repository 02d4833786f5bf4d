//! Tape-based autograd engine
//!
//! Every op records a [`BackwardOp`] on its output; calling [`backward`] on
//! a scalar loss walks that chain and accumulates gradients into every
//! tensor created with `requires_grad = true`.
//!
//! The op set covers what feature-map distillation needs: average pooling,
//! 1x1 convolution, row-wise (log-)softmax, element-wise multiply, scale
//! and sum.

mod backward;
mod ops;
mod tensor;


pub use backward::BackwardOp;
pub use ops::*;
pub use tensor::Tensor;

/// Perform backward pass on a tensor
///
/// With `grad_output = None` the seed gradient is all ones, which is what a
/// scalar loss needs.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    if let Some(op) = tensor.backward_op() {
        op.backward();
    }
}
