//! Quantization of frozen weights for QLoRA
//!
//! - NF4 block-wise 4-bit quantization
//! - Double quantization of the block statistics with the 8-bit dynamic map

mod dynamic;
mod nf4;

pub use dynamic::{dequantize_blockwise, dynamic_map, quantize_blockwise, Blockwise8, DYNAMIC_BLOCK_SIZE};
pub use nf4::{Absmax, ComputeDtype, Nf4Config, Nf4Tensor, NF4_BLOCK_SIZE, NF4_CODE};
