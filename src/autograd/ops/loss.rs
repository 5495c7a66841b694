//! Cross-entropy loss

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// Mean cross-entropy of `logits` (rows × vocab) against class indices
///
/// Returns a single-element tensor. With zero rows the mean is `0/0`, i.e. NaN,
/// matching a loss over a batch where every label is ignored.
pub fn cross_entropy(logits: &Tensor, targets: &[usize], vocab: usize) -> Tensor {
    assert_eq!(logits.len(), targets.len() * vocab, "cross_entropy: logits size");
    let rows = targets.len();
    let xs = logits.as_slice();

    let mut log_norms = Vec::with_capacity(rows);
    let mut total = 0.0f64;
    for (r, &t) in targets.iter().enumerate() {
        assert!(t < vocab, "cross_entropy: target {t} out of vocab {vocab}");
        let row = &xs[r * vocab..(r + 1) * vocab];
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let sum_exp: f32 = row.iter().map(|&v| (v - max).exp()).sum();
        let log_norm = max + sum_exp.ln();
        log_norms.push(log_norm);
        total += f64::from(log_norm - row[t]);
    }
    let loss = (total / rows as f64) as f32;

    let requires_grad = logits.requires_grad();
    let mut result = Tensor::from_vec(vec![loss], requires_grad);

    if requires_grad && rows > 0 {
        let backward_op = Rc::new(CrossEntropyBackward {
            logits: logits.clone(),
            targets: targets.to_vec(),
            log_norms,
            vocab,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct CrossEntropyBackward {
    logits: Tensor,
    targets: Vec<usize>,
    log_norms: Vec<f32>,
    vocab: usize,
    result_grad: GradCell,
}

impl BackwardOp for CrossEntropyBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if !self.logits.requires_grad() {
                return;
            }
            let upstream = grad[0] / self.targets.len() as f32;
            let xs = self.logits.as_slice();
            let v = self.vocab;

            // ∂L/∂z = (softmax(z) − onehot(t)) / rows
            let mut grad_z = vec![0.0f32; xs.len()];
            for (r, (&t, &log_norm)) in self.targets.iter().zip(&self.log_norms).enumerate() {
                for c in 0..v {
                    grad_z[r * v + c] = (xs[r * v + c] - log_norm).exp() * upstream;
                }
                grad_z[r * v + t] -= upstream;
            }
            self.logits.accumulate_grad(Array1::from(grad_z));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.logits.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let logits = Tensor::from_vec(vec![0.0; 8], false);
        let loss = cross_entropy(&logits, &[1, 3], 4);
        assert_abs_diff_eq!(loss.as_slice()[0], 4.0f32.ln(), epsilon = 1e-6);
    }

    #[test]
    fn test_empty_targets_is_nan() {
        let logits = Tensor::from_vec(vec![], true);
        let loss = cross_entropy(&logits, &[], 4);
        assert!(loss.as_slice()[0].is_nan());
    }

    #[test]
    fn test_gradient_rows_sum_to_zero() {
        let logits = Tensor::from_vec(vec![1.0, 2.0, 0.5, -1.0, 0.0, 3.0], true);
        let mut loss = cross_entropy(&logits, &[0, 2], 3);
        backward(&mut loss, None);
        let g = logits.grad().unwrap();
        assert_abs_diff_eq!(g[0] + g[1] + g[2], 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(g[3] + g[4] + g[5], 0.0, epsilon = 1e-6);
        assert!(g[0] < 0.0 && g[5] < 0.0);
    }
}
