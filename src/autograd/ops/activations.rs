//! Activation function autograd operations: silu, dropout

use crate::autograd::{BackwardOp, Context, GradCell, Tensor};
use ndarray::Array1;
use rand::Rng;
use std::rc::Rc;

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// SiLU activation: x * sigmoid(x)
pub fn silu(a: &Tensor) -> Tensor {
    let data = a.data().mapv(|x| x * sigmoid(x));
    let requires_grad = a.requires_grad();

    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(SiluBackward {
            a: a.clone(),
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct SiluBackward {
    a: Tensor,
    result_grad: GradCell,
}

impl BackwardOp for SiluBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                // d/dx [x σ(x)] = σ(x) (1 + x (1 - σ(x)))
                let local = self.a.data().mapv(|x| {
                    let s = sigmoid(x);
                    s * (1.0 + x * (1.0 - s))
                });
                self.a.accumulate_grad(grad * &local);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}

/// Inverted dropout
///
/// In training mode each element is zeroed with probability `p` and the
/// survivors are scaled by `1 / (1 - p)`. In evaluation mode, or with `p == 0`,
/// the input is returned unchanged.
pub fn dropout(a: &Tensor, p: f32, ctx: &mut Context) -> Tensor {
    if !ctx.is_training() || p <= 0.0 {
        return a.clone();
    }
    let keep = 1.0 - p;
    let rng = ctx.rng_mut();
    let mask: Array1<f32> =
        (0..a.len()).map(|_| if rng.random::<f32>() < keep { 1.0 / keep } else { 0.0 }).collect();

    let data = a.data() * &mask;
    let requires_grad = a.requires_grad();
    let mut result = Tensor::new(data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(DropoutBackward {
            a: a.clone(),
            mask,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct DropoutBackward {
    a: Tensor,
    mask: Array1<f32>,
    result_grad: GradCell,
}

impl BackwardOp for DropoutBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if self.a.requires_grad() {
                self.a.accumulate_grad(grad * &self.mask);
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone()]
    }
}
