//! Gradient clipping utilities

use crate::Tensor;

/// Clip gradients by global norm
///
/// Computes the global L2 norm over every gradient and, when it exceeds
/// `max_norm`, scales all gradients by `max_norm / (norm + 1e-6)`.
///
/// # Returns
/// The global norm before clipping
pub fn clip_grad_norm(params: &mut [&mut Tensor], max_norm: f32) -> f32 {
    let total_norm_sq: f32 = params
        .iter()
        .filter_map(|p| p.grad())
        .map(|g| g.iter().map(|&x| x * x).sum::<f32>())
        .sum();
    let global_norm = total_norm_sq.sqrt();

    let clip_coef = max_norm / (global_norm + 1e-6);
    if clip_coef < 1.0 {
        for param in params.iter_mut() {
            if let Some(grad) = param.grad() {
                param.set_grad(grad * clip_coef);
            }
        }
    }

    global_norm
}
