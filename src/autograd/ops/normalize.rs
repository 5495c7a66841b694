//! RMS normalization autograd operation

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// Row-wise RMS normalization
///
/// For each row of `x` (rows × hidden): `y = x / sqrt(mean(x²) + eps) * weight`.
pub fn rms_norm(x: &Tensor, weight: &Tensor, hidden: usize, eps: f32) -> Tensor {
    assert_eq!(weight.len(), hidden, "rms_norm: weight length mismatch");
    assert_eq!(x.len() % hidden, 0, "rms_norm: input not a multiple of hidden");
    let rows = x.len() / hidden;
    let xs = x.as_slice();
    let w = weight.as_slice();

    let mut inv_rms = Vec::with_capacity(rows);
    let mut out = vec![0.0f32; x.len()];
    for r in 0..rows {
        let row = &xs[r * hidden..(r + 1) * hidden];
        let mean_sq = row.iter().map(|v| v * v).sum::<f32>() / hidden as f32;
        let inv = 1.0 / (mean_sq + eps).sqrt();
        inv_rms.push(inv);
        for (c, &v) in row.iter().enumerate() {
            out[r * hidden + c] = v * inv * w[c];
        }
    }

    let requires_grad = x.requires_grad() || weight.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(RmsNormBackward {
            x: x.clone(),
            weight: weight.clone(),
            inv_rms,
            hidden,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct RmsNormBackward {
    x: Tensor,
    weight: Tensor,
    inv_rms: Vec<f32>,
    hidden: usize,
    result_grad: GradCell,
}

impl BackwardOp for RmsNormBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            let g = grad.as_slice().unwrap_or(&[]);
            let xs = self.x.as_slice();
            let w = self.weight.as_slice();
            let h = self.hidden;

            if self.x.requires_grad() {
                // dx = r·(g⊙w) − x·r³/h · Σ(g⊙w⊙x)
                let mut grad_x = vec![0.0f32; xs.len()];
                for (r, &inv) in self.inv_rms.iter().enumerate() {
                    let row = r * h..(r + 1) * h;
                    let dot: f32 =
                        row.clone().map(|i| g[i] * w[i - r * h] * xs[i]).sum::<f32>();
                    let coef = inv * inv * inv / h as f32 * dot;
                    for i in row {
                        grad_x[i] = inv * g[i] * w[i - r * h] - xs[i] * coef;
                    }
                }
                self.x.accumulate_grad(Array1::from(grad_x));
            }

            if self.weight.requires_grad() {
                let mut grad_w = vec![0.0f32; h];
                for (r, &inv) in self.inv_rms.iter().enumerate() {
                    for (c, gw) in grad_w.iter_mut().enumerate() {
                        *gw += g[r * h + c] * xs[r * h + c] * inv;
                    }
                }
                self.weight.accumulate_grad(Array1::from(grad_w));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone(), self.weight.clone()]
    }
}
