//! Rotary position embedding as an autograd operation

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// Per-token cos/sin tables, `tokens × head_dim`, halves duplicated
#[derive(Clone, Debug)]
pub struct RotaryTables {
    pub cos: Rc<[f32]>,
    pub sin: Rc<[f32]>,
    pub head_dim: usize,
}

/// Rotate every head of `x` (tokens × heads·head_dim)
///
/// Uses the split-half convention: `x·cos + rotate_half(x)·sin` with
/// `rotate_half([a, b]) = [-b, a]`.
pub fn rope(x: &Tensor, tables: &RotaryTables, num_heads: usize) -> Tensor {
    let hd = tables.head_dim;
    let half = hd / 2;
    let width = num_heads * hd;
    assert_eq!(x.len() % width, 0, "rope: input not a multiple of heads*head_dim");
    let tokens = x.len() / width;
    assert_eq!(tables.cos.len(), tokens * hd, "rope: table covers wrong token count");

    let xs = x.as_slice();
    let mut out = vec![0.0f32; xs.len()];
    for t in 0..tokens {
        let cos = &tables.cos[t * hd..(t + 1) * hd];
        let sin = &tables.sin[t * hd..(t + 1) * hd];
        for h in 0..num_heads {
            let base = t * width + h * hd;
            for d in 0..half {
                let x1 = xs[base + d];
                let x2 = xs[base + d + half];
                out[base + d] = x1 * cos[d] - x2 * sin[d];
                out[base + d + half] = x2 * cos[d + half] + x1 * sin[d + half];
            }
        }
    }

    let requires_grad = x.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(RopeBackward {
            x: x.clone(),
            tables: tables.clone(),
            num_heads,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct RopeBackward {
    x: Tensor,
    tables: RotaryTables,
    num_heads: usize,
    result_grad: GradCell,
}

impl BackwardOp for RopeBackward {
    fn backward(&self) {
        if let Some(grad) = self.result_grad.borrow().as_ref() {
            if !self.x.requires_grad() {
                return;
            }
            let g = grad.as_slice().unwrap_or(&[]);
            let hd = self.tables.head_dim;
            let half = hd / 2;
            let width = self.num_heads * hd;
            let tokens = g.len() / width;

            let mut grad_x = vec![0.0f32; g.len()];
            for t in 0..tokens {
                let cos = &self.tables.cos[t * hd..(t + 1) * hd];
                let sin = &self.tables.sin[t * hd..(t + 1) * hd];
                for h in 0..self.num_heads {
                    let base = t * width + h * hd;
                    for d in 0..half {
                        let g1 = g[base + d];
                        let g2 = g[base + d + half];
                        grad_x[base + d] = g1 * cos[d] + g2 * sin[d + half];
                        grad_x[base + d + half] = g2 * cos[d + half] - g1 * sin[d];
                    }
                }
            }
            self.x.accumulate_grad(Array1::from(grad_x));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.x.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rope_identity_at_zero_angle() {
        let tables = RotaryTables {
            cos: Rc::from(vec![1.0; 4]),
            sin: Rc::from(vec![0.0; 4]),
            head_dim: 4,
        };
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let y = rope(&x, &tables, 1);
        assert_eq!(y.as_slice(), x.as_slice());
    }

    #[test]
    fn test_rope_quarter_turn() {
        // angle π/2 on both frequency pairs: [a, b, c, d] -> [-c, -d, a, b]
        let tables = RotaryTables {
            cos: Rc::from(vec![0.0; 4]),
            sin: Rc::from(vec![1.0; 4]),
            head_dim: 4,
        };
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
        let y = rope(&x, &tables, 1);
        let expected = [-3.0, -4.0, 1.0, 2.0];
        for (a, b) in y.as_slice().iter().zip(expected.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }
}
