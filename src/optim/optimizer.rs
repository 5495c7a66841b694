//! Optimizer trait

use crate::Tensor;

/// Trait for optimization algorithms
///
/// Parameters are borrowed from the model on every step, so optimizers keep
/// per-parameter state by position.
pub trait Optimizer {
    /// Perform a single optimization step
    fn step(&mut self, params: &mut [&mut Tensor]);

    /// Zero out all gradients
    fn zero_grad(&mut self, params: &mut [&mut Tensor]) {
        for param in params.iter_mut() {
            param.zero_grad();
        }
    }

    /// Get learning rate
    fn lr(&self) -> f32;

    /// Set learning rate
    fn set_lr(&mut self, lr: f32);
}
