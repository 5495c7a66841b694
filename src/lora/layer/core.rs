//! LoRA (Low-Rank Adaptation) adapter layer

use crate::autograd::{dropout, matmul_compute, matmul_nt, scale, Context};
use crate::lora::AdapterError;
use crate::Tensor;
use ndarray::Array1;
use rand::Rng;

/// Trainable low-rank update attached to a frozen projection
///
/// Holds `A ∈ ℝ^(r × d_in)` and `B ∈ ℝ^(d_out × r)`, row-major, and computes
/// `scale · (dropout(x) Aᵀ) Bᵀ`, the amount added to the frozen output.
#[derive(Clone)]
pub struct LoRALayer {
    /// LoRA matrix A stored as 1D [r * d_in] - downprojection
    lora_a: Tensor,
    /// LoRA matrix B stored as 1D [d_out * r] - upprojection
    lora_b: Tensor,
    d_out: usize,
    d_in: usize,
    rank: usize,
    /// Scaling factor (alpha/rank)
    scale: f32,
    dropout: f32,
}

impl LoRALayer {
    /// Create a new adapter
    ///
    /// A is drawn from `U(-1/√d_in, 1/√d_in)` (Kaiming-uniform with `a = √5`)
    /// and B is zero, so the adapted layer starts out equal to the frozen one.
    pub fn new<R: Rng>(
        d_out: usize,
        d_in: usize,
        rank: usize,
        alpha: f32,
        dropout: f32,
        rng: &mut R,
    ) -> Self {
        let bound = 1.0 / (d_in as f32).sqrt();
        let lora_a_data: Vec<f32> =
            (0..rank * d_in).map(|_| rng.random_range(-bound..bound)).collect();

        Self {
            lora_a: Tensor::from_vec(lora_a_data, true),
            lora_b: Tensor::zeros(d_out * rank, true),
            d_out,
            d_in,
            rank,
            scale: alpha / rank as f32,
            dropout,
        }
    }

    /// Adapter output for `rows` input rows of width `d_in`
    pub fn forward(&self, x: &Tensor, rows: usize, ctx: &mut Context) -> Tensor {
        assert_eq!(x.len(), rows * self.d_in, "Input size must match rows * d_in");

        let x = dropout(x, self.dropout, ctx);
        // (rows × d_in) @ Aᵀ -> rows × r
        let down = matmul_nt(&x, &self.lora_a, rows, self.d_in, self.rank);
        // (rows × r) @ Bᵀ -> rows × d_out
        let up = matmul_nt(&down, &self.lora_b, rows, self.rank, self.d_out);
        scale(&up, self.scale)
    }

    /// `scale · B @ A` as a dense `[d_out, d_in]` matrix
    pub fn delta_weight(&self) -> Vec<f32> {
        let mut delta = matmul_compute(
            self.lora_b.as_slice(),
            self.lora_a.as_slice(),
            self.d_out,
            self.rank,
            self.d_in,
        );
        delta.iter_mut().for_each(|v| *v *= self.scale);
        delta
    }

    /// Replace A and B, e.g. with weights read from an adapter file
    pub fn set_weights(&mut self, lora_a: Vec<f32>, lora_b: Vec<f32>) -> Result<(), AdapterError> {
        if lora_a.len() != self.rank * self.d_in {
            return Err(AdapterError::DimensionMismatch {
                expected: format!("lora_A [{}, {}]", self.rank, self.d_in),
                actual: format!("{} values", lora_a.len()),
            });
        }
        if lora_b.len() != self.d_out * self.rank {
            return Err(AdapterError::DimensionMismatch {
                expected: format!("lora_B [{}, {}]", self.d_out, self.rank),
                actual: format!("{} values", lora_b.len()),
            });
        }
        *self.lora_a.data_mut() = Array1::from(lora_a);
        *self.lora_b.data_mut() = Array1::from(lora_b);
        Ok(())
    }

    /// Get reference to LoRA A matrix
    pub fn lora_a(&self) -> &Tensor {
        &self.lora_a
    }

    /// Get mutable reference to LoRA A matrix
    pub fn lora_a_mut(&mut self) -> &mut Tensor {
        &mut self.lora_a
    }

    /// Get reference to LoRA B matrix
    pub fn lora_b(&self) -> &Tensor {
        &self.lora_b
    }

    /// Get mutable reference to LoRA B matrix
    pub fn lora_b_mut(&mut self) -> &mut Tensor {
        &mut self.lora_b
    }

    /// Get trainable parameters (A and B)
    pub fn trainable_params(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.lora_a, &mut self.lora_b]
    }

    /// Number of trainable values
    pub fn num_params(&self) -> usize {
        self.lora_a.len() + self.lora_b.len()
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn d_out(&self) -> usize {
        self.d_out
    }

    pub fn d_in(&self) -> usize {
        self.d_in
    }
}
