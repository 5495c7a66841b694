//! RMS normalization layer

use crate::autograd::rms_norm;
use crate::Tensor;

/// Frozen RMSNorm with a learned per-channel scale
pub struct RmsNorm {
    weight: Tensor,
    eps: f32,
}

impl RmsNorm {
    pub fn new(weight: Vec<f32>, eps: f32) -> Self {
        Self { weight: Tensor::from_vec(weight, false), eps }
    }

    /// Normalize every row of `x` (rows × hidden)
    pub fn forward(&self, x: &Tensor) -> Tensor {
        rms_norm(x, &self.weight, self.weight.len(), self.eps)
    }

    pub fn hidden_size(&self) -> usize {
        self.weight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rows_normalized_independently() {
        let norm = RmsNorm::new(vec![1.0, 1.0], 0.0);
        let y = norm.forward(&Tensor::from_vec(vec![3.0, 4.0, 1.0, 1.0], false));
        let r0 = (12.5f32).sqrt();
        assert_abs_diff_eq!(y.as_slice()[0], 3.0 / r0, epsilon = 1e-6);
        assert_abs_diff_eq!(y.as_slice()[2], 1.0, epsilon = 1e-6);
        assert!(!y.requires_grad());
    }
}
