//! Autograd operations with backward passes

use super::{BackwardOp, Tensor};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use std::cell::RefCell;
use std::rc::Rc;

type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

/// Multiply two tensors element-wise
///
/// Both operands must have the same shape.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(Error::ShapeMismatch {
            expected: a.shape().to_vec(),
            got: b.shape().to_vec(),
        });
    }

    let data = a.data() * b.data();
    let requires_grad = a.requires_grad() || b.requires_grad();

    let mut result = Tensor::new(data, requires_grad).with_shape(a.shape());

    if requires_grad {
        let backward_op = Rc::new(MulBackward {
            a: a.clone(),
            b: b.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct MulBackward {
    a: Tensor,
    b: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for MulBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            // ∂(a*b)/∂a = b, ∂(a*b)/∂b = a
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.b.data());
            }
            if self.b.requires_grad() {
                self.b.accumulate_grad(grad * self.a.data());
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
            if let Some(op) = self.b.backward_op() {
                op.backward();
            }
        }
    }
}

/// Multiply every element by a constant
pub fn scale(a: &Tensor, factor: f32) -> Tensor {
    let data = a.data() * factor;
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad).with_shape(a.shape());

    if requires_grad {
        let backward_op = Rc::new(ScaleBackward {
            a: a.clone(),
            factor,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct ScaleBackward {
    a: Tensor,
    factor: f32,
    result_grad: GradCell,
}

impl BackwardOp for ScaleBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * self.factor);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Sum all elements into a `[1]` tensor
pub fn sum(a: &Tensor) -> Tensor {
    let data = Array1::from(vec![a.data().sum()]);
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SumBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SumBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SumBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // ∂L/∂a = ∂L/∂sum * 1 (broadcast)
                self.a.accumulate_grad(Array1::from_elem(self.a.len(), grad[0]));
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Zero padding added around a 2-D feature map before pooling
///
/// Each side is independent, so asymmetric padding (e.g. one extra column
/// on the trailing edge only) is expressible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Padding2d {
    pub top: usize,
    pub bottom: usize,
    pub left: usize,
    pub right: usize,
}

/// Window geometry shared by the pooling forward and backward passes
#[derive(Debug, Clone, Copy)]
struct PoolGeometry {
    planes: usize,
    in_hw: (usize, usize),
    out_hw: (usize, usize),
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: Padding2d,
}

impl PoolGeometry {
    fn new(
        planes: usize,
        in_hw: (usize, usize),
        kernel: (usize, usize),
        stride: (usize, usize),
        padding: Padding2d,
    ) -> Result<Self> {
        if kernel.0 == 0 || kernel.1 == 0 || stride.0 == 0 || stride.1 == 0 {
            return Err(Error::InvalidParameter(format!(
                "pooling kernel {:?} and stride {:?} must be positive",
                kernel, stride
            )));
        }
        let padded_h = in_hw.0 + padding.top + padding.bottom;
        let padded_w = in_hw.1 + padding.left + padding.right;
        if padded_h < kernel.0 || padded_w < kernel.1 {
            return Err(Error::InvalidParameter(format!(
                "padded input {}x{} is smaller than pooling kernel {:?}",
                padded_h, padded_w, kernel
            )));
        }
        let out_hw = (
            (padded_h - kernel.0) / stride.0 + 1,
            (padded_w - kernel.1) / stride.1 + 1,
        );
        Ok(Self {
            planes,
            in_hw,
            out_hw,
            kernel,
            stride,
            padding,
        })
    }

    fn area(&self) -> f32 {
        (self.kernel.0 * self.kernel.1) as f32
    }

    /// Call `f(out_index, in_index)` for every real input cell of every window
    ///
    /// Cells that fall into the padding are skipped; they contribute zero.
    fn visit(&self, mut f: impl FnMut(usize, usize)) {
        let (h, w) = self.in_hw;
        let (oh, ow) = self.out_hw;
        for plane in 0..self.planes {
            let in_base = plane * h * w;
            let out_base = plane * oh * ow;
            for oy in 0..oh {
                for ox in 0..ow {
                    let out_index = out_base + oy * ow + ox;
                    for ky in 0..self.kernel.0 {
                        let py = oy * self.stride.0 + ky;
                        if py < self.padding.top || py - self.padding.top >= h {
                            continue;
                        }
                        let iy = py - self.padding.top;
                        for kx in 0..self.kernel.1 {
                            let px = ox * self.stride.1 + kx;
                            if px < self.padding.left || px - self.padding.left >= w {
                                continue;
                            }
                            let ix = px - self.padding.left;
                            f(out_index, in_base + iy * w + ix);
                        }
                    }
                }
            }
        }
    }
}

/// 2-D average pooling over a `[N, C, H, W]` tensor
///
/// Padding cells count as zeros and the divisor is always the full kernel
/// area, so a border window that overlaps the padding is averaged over
/// `kernel.0 * kernel.1` cells.
pub fn avg_pool2d(
    x: &Tensor,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: Padding2d,
) -> Result<Tensor> {
    let (n, c, h, w) = x.dims4()?;
    let geometry = PoolGeometry::new(n * c, (h, w), kernel, stride, padding)?;
    let (oh, ow) = geometry.out_hw;
    let area = geometry.area();

    let input = x.data();
    let mut out = vec![0.0f32; n * c * oh * ow];
    geometry.visit(|o, i| out[o] += input[i]);
    out.iter_mut().for_each(|v| *v /= area);

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_shape_vec(&[n, c, oh, ow], out, requires_grad)?;

    if requires_grad {
        let backward_op = Rc::new(AvgPoolBackward {
            x: x.clone(),
            geometry,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct AvgPoolBackward {
    x: Tensor,
    geometry: PoolGeometry,
    result_grad: GradCell,
}

impl BackwardOp for AvgPoolBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.x.requires_grad() {
                let area = self.geometry.area();
                let mut grad_x = Array1::<f32>::zeros(self.x.len());
                self.geometry
                    .visit(|o, i| grad_x[i] += grad_output[o] / area);
                self.x.accumulate_grad(grad_x);
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// 1x1 convolution (stride 1, no padding)
///
/// - `x` is `[N, C_in, H, W]`
/// - `weight` is `[C_out, C_in, 1, 1]`
/// - `bias`, if given, holds `C_out` values
///
/// Each output pixel is `Σ_i weight[o, i] * x[n, i, p] + bias[o]`.
pub fn conv2d_1x1(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>) -> Result<Tensor> {
    let (n, c_in, h, w) = x.dims4()?;
    let (c_out, w_in, kh, kw) = weight.dims4()?;
    if w_in != c_in || kh != 1 || kw != 1 {
        return Err(Error::ShapeMismatch {
            expected: vec![c_out, c_in, 1, 1],
            got: weight.shape().to_vec(),
        });
    }
    if let Some(b) = bias {
        if b.len() != c_out {
            return Err(Error::ShapeMismatch {
                expected: vec![c_out],
                got: b.shape().to_vec(),
            });
        }
    }

    let hw = h * w;
    let xd = x.data();
    let wd = weight.data();
    let mut out = vec![0.0f32; n * c_out * hw];
    for s in 0..n {
        for o in 0..c_out {
            let offset = bias.map_or(0.0, |b| b.data()[o]);
            let out_row = &mut out[(s * c_out + o) * hw..(s * c_out + o + 1) * hw];
            out_row.iter_mut().for_each(|v| *v = offset);
            for i in 0..c_in {
                let k = wd[o * c_in + i];
                let in_base = (s * c_in + i) * hw;
                for (p, v) in out_row.iter_mut().enumerate() {
                    *v += k * xd[in_base + p];
                }
            }
        }
    }

    let requires_grad = x.requires_grad()
        || weight.requires_grad()
        || bias.is_some_and(|b| b.requires_grad());
    let mut result = Tensor::from_shape_vec(&[n, c_out, h, w], out, requires_grad)?;

    if requires_grad {
        let backward_op = Rc::new(Conv1x1Backward {
            x: x.clone(),
            weight: weight.clone(),
            bias: bias.cloned(),
            dims: (n, c_in, c_out, hw),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct Conv1x1Backward {
    x: Tensor,
    weight: Tensor,
    bias: Option<Tensor>,
    /// (batch, in channels, out channels, pixels per plane)
    dims: (usize, usize, usize, usize),
    result_grad: GradCell,
}

impl BackwardOp for Conv1x1Backward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let (n, c_in, c_out, hw) = self.dims;
            let xd = self.x.data();
            let wd = self.weight.data();

            // ∂L/∂x[s,i,p] = Σ_o w[o,i] * g[s,o,p]
            if self.x.requires_grad() {
                let mut grad_x = Array1::<f32>::zeros(self.x.len());
                for s in 0..n {
                    for o in 0..c_out {
                        let g_base = (s * c_out + o) * hw;
                        for i in 0..c_in {
                            let k = wd[o * c_in + i];
                            let x_base = (s * c_in + i) * hw;
                            for p in 0..hw {
                                grad_x[x_base + p] += k * grad_output[g_base + p];
                            }
                        }
                    }
                }
                self.x.accumulate_grad(grad_x);
            }

            // ∂L/∂w[o,i] = Σ_{s,p} g[s,o,p] * x[s,i,p]
            if self.weight.requires_grad() {
                let mut grad_w = Array1::<f32>::zeros(self.weight.len());
                for s in 0..n {
                    for o in 0..c_out {
                        let g_base = (s * c_out + o) * hw;
                        for i in 0..c_in {
                            let x_base = (s * c_in + i) * hw;
                            let mut acc = 0.0;
                            for p in 0..hw {
                                acc += grad_output[g_base + p] * xd[x_base + p];
                            }
                            grad_w[o * c_in + i] += acc;
                        }
                    }
                }
                self.weight.accumulate_grad(grad_w);
            }

            // ∂L/∂b[o] = Σ_{s,p} g[s,o,p]
            if let Some(bias) = self.bias.as_ref().filter(|b| b.requires_grad()) {
                let mut grad_b = Array1::<f32>::zeros(c_out);
                for s in 0..n {
                    for o in 0..c_out {
                        let g_base = (s * c_out + o) * hw;
                        grad_b[o] += (g_base..g_base + hw).map(|j| grad_output[j]).sum::<f32>();
                    }
                }
                bias.accumulate_grad(grad_b);
            }

            if let Some(op) = self.x.backward_op() {
                op.backward();
            }
        }
    }
}

/// Row-wise softmax of a 2-D array
///
/// softmax(x)_i = exp(x_i - max) / Σ exp(x_j - max)
pub fn softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        row.mapv_inplace(|v| (v - max_val).exp());

        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }

    result
}

/// Row-wise log-softmax of a 2-D array
///
/// log_softmax(x)_i = x_i - max - ln Σ exp(x_j - max)
pub fn log_softmax_2d(x: &Array2<f32>) -> Array2<f32> {
    let mut result = x.clone();

    for mut row in result.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let log_sum = row.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln();
        row.mapv_inplace(|v| v - max_val - log_sum);
    }

    result
}

/// Softmax along the last axis of a `[rows, cols]` tensor
pub fn softmax_rows(a: &Tensor) -> Result<Tensor> {
    let probs = softmax_2d(&a.to_array2()?);

    let requires_grad = a.requires_grad();
    let mut result = Tensor::from_array2(probs, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SoftmaxRowsBackward {
            a: a.clone(),
            output: result.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct SoftmaxRowsBackward {
    a: Tensor,
    output: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SoftmaxRowsBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // Per row: ∂L/∂x = y ⊙ (∂L/∂y - (y · ∂L/∂y))
                let cols = self.a.shape().last().copied().unwrap_or(1).max(1);
                let y = self.output.data();
                let mut grad_a = Array1::<f32>::zeros(y.len());
                for start in (0..y.len()).step_by(cols) {
                    let row = start..start + cols;
                    let dot: f32 = row.clone().map(|j| y[j] * grad_output[j]).sum();
                    for j in row {
                        grad_a[j] = y[j] * (grad_output[j] - dot);
                    }
                }
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}

/// Log-softmax along the last axis of a `[rows, cols]` tensor
///
/// Computed directly rather than as `ln(softmax(x))`, so large logits do
/// not underflow to `ln(0)`.
pub fn log_softmax_rows(a: &Tensor) -> Result<Tensor> {
    let log_probs = log_softmax_2d(&a.to_array2()?);

    let requires_grad = a.requires_grad();
    let mut result = Tensor::from_array2(log_probs, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(LogSoftmaxRowsBackward {
            a: a.clone(),
            output: result.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    Ok(result)
}

struct LogSoftmaxRowsBackward {
    a: Tensor,
    output: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for LogSoftmaxRowsBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // Per row: ∂L/∂x = ∂L/∂y - softmax(x) * Σ ∂L/∂y
                let cols = self.a.shape().last().copied().unwrap_or(1).max(1);
                let y = self.output.data();
                let mut grad_a = Array1::<f32>::zeros(y.len());
                for start in (0..y.len()).step_by(cols) {
                    let row = start..start + cols;
                    let total: f32 = row.clone().map(|j| grad_output[j]).sum();
                    for j in row {
                        grad_a[j] = grad_output[j] - y[j].exp() * total;
                    }
                }
                self.a.accumulate_grad(grad_a);
            }

            if let Some(op) = self.a.backward_op() {
                op.backward();
            }
        }
    }
}
