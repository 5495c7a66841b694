//! Causal scaled dot-product attention with grouped-query heads

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::Array1;
use std::rc::Rc;

/// Dimensions of one attention call
///
/// Queries cover the last `q_len` positions of a `kv_len` long key sequence,
/// so query `i` may attend to keys `0..=kv_len - q_len + i`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttentionShape {
    pub batch: usize,
    pub q_len: usize,
    pub kv_len: usize,
    pub num_heads: usize,
    pub num_kv_heads: usize,
    pub head_dim: usize,
}

impl AttentionShape {
    fn q_width(&self) -> usize {
        self.num_heads * self.head_dim
    }

    fn kv_width(&self) -> usize {
        self.num_kv_heads * self.head_dim
    }

    fn group(&self) -> usize {
        self.num_heads / self.num_kv_heads
    }
}

/// Attention over flattened projections
///
/// - `q`: `batch·q_len × num_heads·head_dim`
/// - `k`, `v`: `batch·kv_len × num_kv_heads·head_dim`
/// - `key_mask`: `batch·kv_len`, `false` marks padding keys
///
/// A query row with no visible key (left padding) produces zeros.
pub fn causal_attention(
    q: &Tensor,
    k: &Tensor,
    v: &Tensor,
    key_mask: Rc<[bool]>,
    shape: AttentionShape,
) -> Tensor {
    assert_eq!(q.len(), shape.batch * shape.q_len * shape.q_width(), "attention: q size");
    assert_eq!(k.len(), shape.batch * shape.kv_len * shape.kv_width(), "attention: k size");
    assert_eq!(v.len(), k.len(), "attention: v size");
    assert_eq!(key_mask.len(), shape.batch * shape.kv_len, "attention: mask size");
    assert!(shape.kv_len >= shape.q_len, "attention: fewer keys than queries");
    assert_eq!(shape.num_heads % shape.num_kv_heads, 0, "attention: heads not divisible");

    let mut out = vec![0.0f32; q.len()];
    let mut probs = vec![0.0f32; shape.kv_len];
    for b in 0..shape.batch {
        for h in 0..shape.num_heads {
            for i in 0..shape.q_len {
                if row_probs(q.as_slice(), k.as_slice(), &key_mask, &shape, b, h, i, &mut probs) {
                    let o = (b * shape.q_len + i) * shape.q_width() + h * shape.head_dim;
                    let kvh = h / shape.group();
                    for (j, &p) in probs.iter().enumerate() {
                        if p == 0.0 {
                            continue;
                        }
                        let vo = (b * shape.kv_len + j) * shape.kv_width() + kvh * shape.head_dim;
                        for d in 0..shape.head_dim {
                            out[o + d] += p * v.as_slice()[vo + d];
                        }
                    }
                }
            }
        }
    }

    let requires_grad = q.requires_grad() || k.requires_grad() || v.requires_grad();
    let mut result = Tensor::from_vec(out, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(AttentionBackward {
            q: q.clone(),
            k: k.clone(),
            v: v.clone(),
            key_mask,
            shape,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Softmax probabilities of one query row; `false` when no key is visible
#[allow(clippy::too_many_arguments)]
fn row_probs(
    q: &[f32],
    k: &[f32],
    key_mask: &[bool],
    shape: &AttentionShape,
    b: usize,
    h: usize,
    i: usize,
    probs: &mut [f32],
) -> bool {
    let hd = shape.head_dim;
    let scale = 1.0 / (hd as f32).sqrt();
    let kvh = h / shape.group();
    let qo = (b * shape.q_len + i) * shape.q_width() + h * hd;
    let last_visible = shape.kv_len - shape.q_len + i;

    let mut max = f32::NEG_INFINITY;
    for (j, p) in probs.iter_mut().enumerate() {
        if j > last_visible || !key_mask[b * shape.kv_len + j] {
            *p = f32::NEG_INFINITY;
            continue;
        }
        let ko = (b * shape.kv_len + j) * shape.kv_width() + kvh * hd;
        let s = (0..hd).map(|d| q[qo + d] * k[ko + d]).sum::<f32>() * scale;
        *p = s;
        max = max.max(s);
    }
    if max == f32::NEG_INFINITY {
        probs.iter_mut().for_each(|p| *p = 0.0);
        return false;
    }

    let mut total = 0.0;
    for p in probs.iter_mut() {
        *p = if *p == f32::NEG_INFINITY { 0.0 } else { (*p - max).exp() };
        total += *p;
    }
    for p in probs.iter_mut() {
        *p /= total;
    }
    true
}

struct AttentionBackward {
    q: Tensor,
    k: Tensor,
    v: Tensor,
    key_mask: Rc<[bool]>,
    shape: AttentionShape,
    result_grad: GradCell,
}

impl BackwardOp for AttentionBackward {
    fn backward(&self) {
        let grad_ref = self.result_grad.borrow();
        let Some(grad) = grad_ref.as_ref() else {
            return;
        };
        let g = grad.as_slice().unwrap_or(&[]);
        let s = &self.shape;
        let hd = s.head_dim;
        let scale = 1.0 / (hd as f32).sqrt();
        let (qs, ks, vs) = (self.q.as_slice(), self.k.as_slice(), self.v.as_slice());

        let mut dq = vec![0.0f32; qs.len()];
        let mut dk = vec![0.0f32; ks.len()];
        let mut dv = vec![0.0f32; vs.len()];
        let mut probs = vec![0.0f32; s.kv_len];
        let mut dprobs = vec![0.0f32; s.kv_len];

        for b in 0..s.batch {
            for h in 0..s.num_heads {
                let kvh = h / s.group();
                for i in 0..s.q_len {
                    if !row_probs(qs, ks, &self.key_mask, s, b, h, i, &mut probs) {
                        continue;
                    }
                    let o = (b * s.q_len + i) * s.q_width() + h * hd;
                    let d_out = &g[o..o + hd];

                    // dP_j = dO · v_j ; dV_j += P_j dO
                    let mut weighted = 0.0;
                    for (j, &p) in probs.iter().enumerate() {
                        if p == 0.0 {
                            dprobs[j] = 0.0;
                            continue;
                        }
                        let vo = (b * s.kv_len + j) * s.kv_width() + kvh * hd;
                        let dp: f32 = (0..hd).map(|d| d_out[d] * vs[vo + d]).sum();
                        dprobs[j] = dp;
                        weighted += p * dp;
                        for d in 0..hd {
                            dv[vo + d] += p * d_out[d];
                        }
                    }

                    // dS_j = P_j (dP_j − Σ P dP), then through S = q·k · scale
                    for (j, &p) in probs.iter().enumerate() {
                        if p == 0.0 {
                            continue;
                        }
                        let ds = p * (dprobs[j] - weighted) * scale;
                        let ko = (b * s.kv_len + j) * s.kv_width() + kvh * hd;
                        for d in 0..hd {
                            dq[o + d] += ds * ks[ko + d];
                            dk[ko + d] += ds * qs[o + d];
                        }
                    }
                }
            }
        }
        drop(grad_ref);

        if self.q.requires_grad() {
            self.q.accumulate_grad(Array1::from(dq));
        }
        if self.k.requires_grad() {
            self.k.accumulate_grad(Array1::from(dk));
        }
        if self.v.requires_grad() {
            self.v.accumulate_grad(Array1::from(dv));
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.q.clone(), self.k.clone(), self.v.clone()]
    }
}
