//! Shaped tensor with gradient tracking

use super::BackwardOp;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use std::cell::RefCell;
use std::rc::Rc;

/// Tensor with automatic differentiation support
///
/// Storage is a flat row-major `Array1<f32>`; `shape` gives its logical
/// layout. Feature maps use `[N, C, H, W]`, flattened distributions use
/// `[rows, cols]` and scalar losses use `[1]`.
///
/// Cloning a tensor shares its gradient cell and backward op, so a clone
/// handed to an op still receives gradients on behalf of the original.
#[derive(Clone)]
pub struct Tensor {
    data: Array1<f32>,
    shape: Vec<usize>,
    grad: Rc<RefCell<Option<Array1<f32>>>>,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a 1-D tensor with data
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        let shape = vec![data.len()];
        Self {
            data,
            shape,
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a 1-D tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Create a tensor with an explicit shape
    ///
    /// Fails if the product of `shape` differs from `data.len()`.
    pub fn from_shape_vec(shape: &[usize], data: Vec<f32>, requires_grad: bool) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(Error::ShapeMismatch {
                expected: shape.to_vec(),
                got: vec![data.len()],
            });
        }
        let mut tensor = Self::new(Array1::from(data), requires_grad);
        tensor.shape = shape.to_vec();
        Ok(tensor)
    }

    /// Wrap a 2-D array as a `[rows, cols]` tensor
    pub fn from_array2(array: Array2<f32>, requires_grad: bool) -> Self {
        let (rows, cols) = array.dim();
        let data: Vec<f32> = array.iter().copied().collect();
        let mut tensor = Self::from_vec(data, requires_grad);
        tensor.shape = vec![rows, cols];
        tensor
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize], requires_grad: bool) -> Self {
        let numel: usize = shape.iter().product();
        let mut tensor = Self::new(Array1::zeros(numel), requires_grad);
        tensor.shape = shape.to_vec();
        tensor
    }

    /// Get reference to data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Get mutable reference to data
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Logical shape
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Unpack a 4-D `[N, C, H, W]` shape
    pub fn dims4(&self) -> Result<(usize, usize, usize, usize)> {
        match self.shape.as_slice() {
            &[n, c, h, w] => Ok((n, c, h, w)),
            other => Err(Error::InvalidParameter(format!(
                "expected a 4-D [N, C, H, W] tensor, got shape {:?}",
                other
            ))),
        }
    }

    /// Unpack a 2-D `[rows, cols]` shape
    pub fn dims2(&self) -> Result<(usize, usize)> {
        match self.shape.as_slice() {
            &[rows, cols] => Ok((rows, cols)),
            other => Err(Error::InvalidParameter(format!(
                "expected a 2-D [rows, cols] tensor, got shape {:?}",
                other
            ))),
        }
    }

    /// Copy a 2-D tensor into an `Array2`
    pub fn to_array2(&self) -> Result<Array2<f32>> {
        let (rows, cols) = self.dims2()?;
        Ok(Array2::from_shape_vec((rows, cols), self.data.to_vec())?)
    }

    /// View the same storage under a different shape
    ///
    /// The view shares the gradient cell and backward op with `self`.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != self.data.len() {
            return Err(Error::ShapeMismatch {
                expected: self.shape.clone(),
                got: shape.to_vec(),
            });
        }
        let mut view = self.clone();
        view.shape = shape.to_vec();
        Ok(view)
    }

    /// Relabel a freshly built tensor whose element count already matches
    pub(crate) fn with_shape(mut self, shape: &[usize]) -> Self {
        debug_assert_eq!(shape.iter().product::<usize>(), self.data.len());
        self.shape = shape.to_vec();
        self
    }

    /// Copy of the data with no gradient tracking
    pub fn detach(&self) -> Self {
        let mut tensor = Self::new(self.data.clone(), false);
        tensor.shape = self.shape.clone();
        tensor
    }

    /// First element, for scalar losses
    pub fn item(&self) -> f32 {
        self.data.first().copied().unwrap_or(0.0)
    }

    /// Get gradient (if computed)
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Set gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Accumulate gradient (for when tensor is used multiple times)
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut grad_ref = self.grad.borrow_mut();
        if let Some(existing) = grad_ref.as_mut() {
            *existing += &grad;
        } else {
            *grad_ref = Some(grad);
        }
    }

    /// Zero out gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Check if requires gradient
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Get reference to gradient cell (for backward operations)
    pub fn grad_cell(&self) -> Rc<RefCell<Option<Array1<f32>>>> {
        self.grad.clone()
    }

    /// Set backward operation
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    /// Get backward operation
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl std::fmt::Debug for Tensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("data", &self.data)
            .field("grad", &self.grad.borrow())
            .field("requires_grad", &self.requires_grad)
            .finish()
    }
}
