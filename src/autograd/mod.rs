//! Tape-based autograd engine
//!
//! Provides automatic differentiation over flat f32 tensors. Each differentiable
//! operation records a [`BackwardOp`]; [`backward`] replays them in reverse
//! topological order so shared subgraphs are differentiated once.

mod backward;
mod context;
mod ops;
mod tensor;

#[cfg(test)]
mod tests;

pub use backward::BackwardOp;
pub use context::Context;
pub use ops::*;
pub use tensor::{GradCell, Tensor};

/// Perform backward pass on a tensor
///
/// Without an explicit `grad_output` the seed gradient is all ones, which is
/// what a scalar loss needs.
pub fn backward(tensor: &mut Tensor, grad_output: Option<ndarray::Array1<f32>>) {
    if let Some(grad) = grad_output {
        tensor.set_grad(grad);
    } else {
        let ones = ndarray::Array1::ones(tensor.data().len());
        tensor.set_grad(ones);
    }

    for op in backward::topological_order(tensor).iter().rev() {
        op.backward();
    }
}
