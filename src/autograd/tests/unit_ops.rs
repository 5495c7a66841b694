//! Unit tests for autograd operations (forward and backward)

use super::test_utils::{check_gradient, det_values};
use crate::autograd::{
    add, backward, causal_attention, cross_entropy, matmul_nt, mul, rms_norm, rope, scale,
    silu, AttentionShape, RotaryTables, Tensor,
};
use approx::assert_abs_diff_eq;
use std::rc::Rc;

#[test]
fn test_tensor_creation() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
    assert_eq!(t.len(), 3);
    assert!(t.requires_grad());
    assert!(t.grad().is_none());
}

#[test]
fn test_tensor_grad_accumulation() {
    let t = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);

    t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
    let grad1 = t.grad().expect("gradient should be available");
    assert_eq!(grad1[0], 1.0);

    t.accumulate_grad(ndarray::arr1(&[1.0, 1.0, 1.0]));
    let grad2 = t.grad().expect("gradient should be available");
    assert_eq!(grad2[0], 2.0);
}

#[test]
fn test_detach_cuts_graph() {
    let a = Tensor::from_vec(vec![1.0, 2.0], true);
    let b = scale(&a, 3.0).detach();
    assert!(!b.requires_grad());
    assert!(b.backward_op().is_none());
    assert_eq!(b.as_slice(), &[3.0, 6.0]);
}

#[test]
fn test_add_mul_backward() {
    let a = Tensor::from_vec(vec![1.0, 2.0, 3.0], true);
    let b = Tensor::from_vec(vec![4.0, 5.0, 6.0], true);
    let c = mul(&a, &b);
    let mut d = add(&c, &a);

    backward(&mut d, None);

    let grad_a = a.grad().expect("gradient should be available");
    let grad_b = b.grad().expect("gradient should be available");
    assert_abs_diff_eq!(grad_a[0], 5.0);
    assert_abs_diff_eq!(grad_b[2], 3.0);
}

#[test]
fn test_frozen_input_gets_no_gradient() {
    let w = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], false);
    let x = Tensor::from_vec(vec![0.5, -0.5], true);
    let mut y = matmul_nt(&x, &w, 1, 2, 2);
    backward(&mut y, None);
    assert!(w.grad().is_none());
    assert!(x.grad().is_some());
}

#[test]
fn test_rms_norm_forward_unit_rms() {
    let x = Tensor::from_vec(vec![3.0, -4.0, 0.0, 0.0], false);
    let w = Tensor::ones(2, false);
    let y = rms_norm(&x, &w, 2, 0.0);
    // rms of [3, -4] is sqrt(12.5)
    let r = 12.5f32.sqrt();
    assert_abs_diff_eq!(y.as_slice()[0], 3.0 / r, epsilon = 1e-6);
    assert_abs_diff_eq!(y.as_slice()[1], -4.0 / r, epsilon = 1e-6);
}

#[test]
fn test_rms_norm_gradient() {
    let x = det_values(12, 1, 1.5);
    let w = Tensor::from_vec(det_values(4, 2, 1.0), false);
    check_gradient(|t| rms_norm(t, &w, 4, 1e-5), &x, 12, 2e-2);
}

#[test]
fn test_rms_norm_weight_gradient() {
    let x = Tensor::from_vec(det_values(8, 3, 1.0), false);
    let w = det_values(4, 4, 1.0);
    check_gradient(|t| rms_norm(&x, t, 4, 1e-5), &w, 8, 2e-2);
}

#[test]
fn test_silu_gradient() {
    let x = det_values(10, 5, 3.0);
    check_gradient(silu, &x, 10, 1e-2);
}

#[test]
fn test_matmul_nt_weight_gradient() {
    let x = Tensor::from_vec(det_values(6, 6, 1.0), false);
    let w = det_values(12, 7, 1.0);
    // x: 2×3, w: 4×3 => 2×4
    check_gradient(|t| matmul_nt(&x, t, 2, 3, 4), &w, 8, 1e-2);
}

#[test]
fn test_rope_gradient() {
    let angles = det_values(6, 8, 3.0);
    // 3 tokens, head_dim 4, halves duplicated
    let mut cos = Vec::new();
    let mut sin = Vec::new();
    for t in 0..3 {
        for _ in 0..2 {
            cos.extend([angles[2 * t].cos(), angles[2 * t + 1].cos()]);
            sin.extend([angles[2 * t].sin(), angles[2 * t + 1].sin()]);
        }
    }
    let tables = RotaryTables { cos: Rc::from(cos), sin: Rc::from(sin), head_dim: 4 };
    let x = det_values(24, 9, 1.0);
    check_gradient(|t| rope(t, &tables, 2), &x, 24, 1e-2);
}

fn gqa_shape() -> AttentionShape {
    AttentionShape { batch: 2, q_len: 3, kv_len: 3, num_heads: 4, num_kv_heads: 2, head_dim: 2 }
}

fn gqa_mask() -> Rc<[bool]> {
    // First sequence is left padded by one position
    Rc::from(vec![false, true, true, true, true, true])
}

#[test]
fn test_attention_query_gradient() {
    let s = gqa_shape();
    let k = Tensor::from_vec(det_values(2 * 3 * 4, 11, 1.0), false);
    let v = Tensor::from_vec(det_values(2 * 3 * 4, 12, 1.0), false);
    let q = det_values(2 * 3 * 8, 13, 1.0);
    check_gradient(|t| causal_attention(t, &k, &v, gqa_mask(), s), &q, 48, 2e-2);
}

#[test]
fn test_attention_key_gradient() {
    let s = gqa_shape();
    let q = Tensor::from_vec(det_values(2 * 3 * 8, 14, 1.0), false);
    let v = Tensor::from_vec(det_values(2 * 3 * 4, 15, 1.0), false);
    let k = det_values(2 * 3 * 4, 16, 1.0);
    check_gradient(|t| causal_attention(&q, t, &v, gqa_mask(), s), &k, 48, 2e-2);
}

#[test]
fn test_attention_value_gradient() {
    let s = gqa_shape();
    let q = Tensor::from_vec(det_values(2 * 3 * 8, 17, 1.0), false);
    let k = Tensor::from_vec(det_values(2 * 3 * 4, 18, 1.0), false);
    let v = det_values(2 * 3 * 4, 19, 1.0);
    check_gradient(|t| causal_attention(&q, &k, t, gqa_mask(), s), &v, 48, 2e-2);
}

#[test]
fn test_attention_masked_row_has_zero_output() {
    let s = gqa_shape();
    let q = Tensor::from_vec(det_values(48, 20, 1.0), false);
    let k = Tensor::from_vec(det_values(24, 21, 1.0), false);
    let v = Tensor::from_vec(det_values(24, 22, 1.0), false);
    let out = causal_attention(&q, &k, &v, gqa_mask(), s);
    // batch 0, query 0 only sees the padding key
    assert!(out.as_slice()[0..8].iter().all(|&x| x == 0.0));
    assert!(out.as_slice()[8..16].iter().any(|&x| x != 0.0));
}

#[test]
fn test_cross_entropy_gradient() {
    let logits = det_values(15, 23, 2.0);
    check_gradient(|t| cross_entropy(t, &[0, 4, 2], 5), &logits, 1, 1e-2);
}
