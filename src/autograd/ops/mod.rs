//! Autograd operations with backward passes
//!
//! This module provides differentiable operations for automatic differentiation.

mod activations;
mod attention;
mod basic;
mod loss;
mod matmul;
mod normalize;
mod rope;

// Re-export all public operations
pub use activations::{dropout, silu};
pub use attention::{causal_attention, AttentionShape};
pub use basic::{add, mul, scale, select_rows, sum};
pub use loss::cross_entropy;
pub use matmul::{matmul, matmul_compute, matmul_nt, matmul_nt_compute, matmul_tn_compute};
pub use normalize::rms_norm;
pub use rope::{rope, RotaryTables};
