//! Tensor type with gradient tracking

use super::BackwardOp;
use ndarray::Array1;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Shared gradient slot of a tensor
pub type GradCell = Rc<RefCell<Option<Array1<f32>>>>;

/// Flat f32 tensor that records the operation that produced it
///
/// Data is reference counted, so cloning a tensor into a backward closure is
/// cheap. Clones share the gradient cell: a gradient accumulated through any
/// clone is visible on the original parameter.
#[derive(Clone)]
pub struct Tensor {
    data: Rc<Array1<f32>>,
    grad: GradCell,
    backward_op: Option<Rc<dyn BackwardOp>>,
    requires_grad: bool,
}

impl Tensor {
    /// Create a tensor from an owned array
    pub fn new(data: Array1<f32>, requires_grad: bool) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        Self {
            data: Rc::new(data),
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad,
        }
    }

    /// Create a tensor from a vector
    pub fn from_vec(data: Vec<f32>, requires_grad: bool) -> Self {
        Self::new(Array1::from(data), requires_grad)
    }

    /// Tensor of zeros
    pub fn zeros(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::zeros(len), requires_grad)
    }

    /// Tensor of ones
    pub fn ones(len: usize, requires_grad: bool) -> Self {
        Self::new(Array1::ones(len), requires_grad)
    }

    /// Borrow the data
    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    /// Borrow the data as a contiguous slice
    pub fn as_slice(&self) -> &[f32] {
        // Constructors normalize to standard layout.
        self.data.as_slice().unwrap_or(&[])
    }

    /// Mutable access to the data, copying it first if a graph still holds it
    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        Rc::make_mut(&mut self.data)
    }

    /// Current gradient, if any
    pub fn grad(&self) -> Option<Array1<f32>> {
        self.grad.borrow().clone()
    }

    /// Overwrite the gradient
    pub fn set_grad(&self, grad: Array1<f32>) {
        *self.grad.borrow_mut() = Some(grad);
    }

    /// Add to the gradient, initializing it on first use
    pub fn accumulate_grad(&self, grad: Array1<f32>) {
        let mut slot = self.grad.borrow_mut();
        match slot.as_mut() {
            Some(existing) => *existing += &grad,
            None => *slot = Some(grad),
        }
    }

    /// Clear the gradient
    pub fn zero_grad(&self) {
        *self.grad.borrow_mut() = None;
    }

    /// Shared gradient cell, captured by backward operations
    pub fn grad_cell(&self) -> GradCell {
        Rc::clone(&self.grad)
    }

    /// Operation that produced this tensor
    pub fn backward_op(&self) -> Option<Rc<dyn BackwardOp>> {
        self.backward_op.clone()
    }

    /// Record the operation that produced this tensor
    pub fn set_backward_op(&mut self, op: Rc<dyn BackwardOp>) {
        self.backward_op = Some(op);
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
    }

    /// Same data, cut from the graph
    pub fn detach(&self) -> Self {
        Self {
            data: Rc::clone(&self.data),
            grad: Rc::new(RefCell::new(None)),
            backward_op: None,
            requires_grad: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Identity of the graph node, stable across clones
    pub(crate) fn node_id(&self) -> usize {
        Rc::as_ptr(&self.grad) as *const () as usize
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("len", &self.len())
            .field("requires_grad", &self.requires_grad)
            .field("has_grad", &self.grad.borrow().is_some())
            .field("has_backward_op", &self.backward_op.is_some())
            .finish()
    }
}
