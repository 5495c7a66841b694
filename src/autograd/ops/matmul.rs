//! Matrix multiplication autograd operations
//!
//! Matrices are row-major and flattened. The products go through
//! `ndarray::linalg::general_mat_mul`.

use crate::autograd::{BackwardOp, GradCell, Tensor};
use ndarray::linalg::general_mat_mul;
use ndarray::{Array1, ArrayView2, ArrayViewMut2};
use std::rc::Rc;

fn view(data: &[f32], rows: usize, cols: usize) -> ArrayView2<'_, f32> {
    ArrayView2::from_shape((rows, cols), data).expect("matrix length checked by caller")
}

/// C = A @ B with A (m×k) and B (k×n)
pub fn matmul_compute(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    let mut c_view =
        ArrayViewMut2::from_shape((m, n), c.as_mut_slice()).expect("output sized m*n");
    general_mat_mul(1.0, &view(a, m, k), &view(b, k, n), 0.0, &mut c_view);
    c
}

/// C = A @ Bᵀ with A (m×k) and B (n×k)
///
/// This is the layout of a `nn.Linear` weight `[out, in]`.
pub fn matmul_nt_compute(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    let mut c_view =
        ArrayViewMut2::from_shape((m, n), c.as_mut_slice()).expect("output sized m*n");
    general_mat_mul(1.0, &view(a, m, k), &view(b, n, k).t(), 0.0, &mut c_view);
    c
}

/// C = Aᵀ @ B with A (k×m) and B (k×n)
pub fn matmul_tn_compute(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    let mut c_view =
        ArrayViewMut2::from_shape((m, n), c.as_mut_slice()).expect("output sized m*n");
    general_mat_mul(1.0, &view(a, k, m).t(), &view(b, k, n), 0.0, &mut c_view);
    c
}

/// Matrix multiplication
///
/// Computes C = A @ B where:
/// - A is m×k (flattened to length m*k)
/// - B is k×n (flattened to length k*n)
/// - C is m×n (flattened to length m*n)
pub fn matmul(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), k * n, "Matrix B size mismatch");

    let result_data = matmul_compute(a.as_slice(), b.as_slice(), m, k, n);
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::from_vec(result_data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            transposed_b: false,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

/// Matrix multiplication against a transposed right operand
///
/// Computes C = A @ Bᵀ where A is m×k and B is n×k. Linear layers store their
/// weight as `[out, in]`, so `y = x @ Wᵀ` is `matmul_nt(x, w, rows, in, out)`.
pub fn matmul_nt(a: &Tensor, b: &Tensor, m: usize, k: usize, n: usize) -> Tensor {
    assert_eq!(a.len(), m * k, "Matrix A size mismatch");
    assert_eq!(b.len(), n * k, "Matrix B size mismatch");

    let result_data = matmul_nt_compute(a.as_slice(), b.as_slice(), m, k, n);
    let requires_grad = a.requires_grad() || b.requires_grad();
    let mut result = Tensor::from_vec(result_data, requires_grad);

    if requires_grad {
        let backward_op = Rc::new(MatmulBackward {
            a: a.clone(),
            b: b.clone(),
            m,
            k,
            n,
            transposed_b: true,
            result_grad: result.grad_cell(),
        });
        result.set_backward_op(backward_op);
    }

    result
}

struct MatmulBackward {
    a: Tensor,
    b: Tensor,
    m: usize,
    k: usize,
    n: usize,
    transposed_b: bool,
    result_grad: GradCell,
}

impl BackwardOp for MatmulBackward {
    fn backward(&self) {
        if let Some(grad_output) = self.result_grad.borrow().as_ref() {
            let grad_c = grad_output.as_slice().unwrap_or(&[]);
            let (m, k, n) = (self.m, self.k, self.n);

            if self.a.requires_grad() {
                // ∂L/∂A = ∂L/∂C @ Bᵀ, or ∂L/∂C @ B when B was given transposed
                let grad_a = if self.transposed_b {
                    matmul_compute(grad_c, self.b.as_slice(), m, n, k)
                } else {
                    matmul_nt_compute(grad_c, self.b.as_slice(), m, n, k)
                };
                self.a.accumulate_grad(Array1::from(grad_a));
            }

            if self.b.requires_grad() {
                // ∂L/∂B = Aᵀ @ ∂L/∂C  (k×n), or its transpose ∂L/∂Cᵀ @ A  (n×k)
                let grad_b = if self.transposed_b {
                    matmul_tn_compute(grad_c, self.a.as_slice(), n, m, k)
                } else {
                    matmul_tn_compute(self.a.as_slice(), grad_c, k, m, n)
                };
                self.b.accumulate_grad(Array1::from(grad_b));
            }
        }
    }

    fn inputs(&self) -> Vec<Tensor> {
        vec![self.a.clone(), self.b.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_matmul_compute_2x3_3x2() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let c = matmul_compute(&a, &b, 2, 3, 2);
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_nt_matches_explicit_transpose() {
        // B is 2x3, so Bᵀ is 3x2
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let b = [7.0, 9.0, 11.0, 8.0, 10.0, 12.0];
        let c = matmul_nt_compute(&a, &b, 2, 3, 2);
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_tn() {
        // Aᵀ where A is 3x2
        let a = [1.0, 4.0, 2.0, 5.0, 3.0, 6.0];
        let b = [7.0, 8.0, 9.0, 10.0, 11.0, 12.0];
        let c = matmul_tn_compute(&a, &b, 2, 3, 2);
        assert_eq!(c, vec![58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_nt_backward_matches_matmul() {
        let a_vals = vec![0.5, -1.0, 2.0, 0.25, 1.5, -0.5];
        let b_vals = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]; // 3x2 for matmul
        let bt_vals = vec![1.0, 3.0, 5.0, 2.0, 4.0, 6.0]; // 2x3 for matmul_nt

        let a1 = Tensor::from_vec(a_vals.clone(), true);
        let b1 = Tensor::from_vec(b_vals, true);
        let mut c1 = matmul(&a1, &b1, 2, 3, 2);
        backward(&mut c1, None);

        let a2 = Tensor::from_vec(a_vals, true);
        let b2 = Tensor::from_vec(bt_vals, true);
        let mut c2 = matmul_nt(&a2, &b2, 2, 3, 2);
        backward(&mut c2, None);

        for (x, y) in c1.as_slice().iter().zip(c2.as_slice()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
        let ga1 = a1.grad().unwrap();
        let ga2 = a2.grad().unwrap();
        for (x, y) in ga1.iter().zip(ga2.iter()) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
        // grad of B (3x2) must equal transpose of grad of Bᵀ (2x3)
        let gb1 = b1.grad().unwrap();
        let gb2 = b2.grad().unwrap();
        for r in 0..3 {
            for c in 0..2 {
                assert_abs_diff_eq!(gb1[r * 2 + c], gb2[c * 3 + r], epsilon = 1e-6);
            }
        }
    }
}
