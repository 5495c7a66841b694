//! 4-bit NormalFloat quantization for QLoRA
//!
//! Block-wise absmax quantization against the 16-value NF4 code book, whose
//! entries are quantiles of a standard normal distribution scaled to `[-1, 1]`.
//! Frozen base weights stored this way take ~0.5 bytes per value.
//!
//! Each block of `blocksize` values has:
//! - 1 absmax (f32, or an 8-bit code when double quantized)
//! - `blocksize` codes, packed two per byte with the first value in the high nibble

use super::dynamic::{
    dequantize_blockwise, dynamic_map, nearest_code, quantize_blockwise, Blockwise8,
    DYNAMIC_BLOCK_SIZE,
};
use half::f16;
use serde::{Deserialize, Serialize};

/// Default block size (64 elements per block)
pub const NF4_BLOCK_SIZE: usize = 64;

/// NF4 code book
pub const NF4_CODE: [f32; 16] = [
    -1.0,
    -0.696_192_8,
    -0.525_073_05,
    -0.394_917_5,
    -0.284_441_38,
    -0.184_773_43,
    -0.091_050_036,
    0.0,
    0.079_580_3,
    0.160_930_2,
    0.246_112_3,
    0.337_915_24,
    0.440_709_83,
    0.562_617,
    0.722_956_84,
    1.0,
];

/// Precision dequantized weights are materialized in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDtype {
    #[default]
    F16,
    F32,
}

/// Quantization settings for frozen linear weights
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nf4Config {
    pub blocksize: usize,
    pub double_quant: bool,
    pub compute_dtype: ComputeDtype,
}

impl Default for Nf4Config {
    fn default() -> Self {
        Self { blocksize: NF4_BLOCK_SIZE, double_quant: true, compute_dtype: ComputeDtype::F16 }
    }
}

/// Per-block scale factors
#[derive(Clone, Debug, PartialEq)]
pub enum Absmax {
    /// One f32 per block
    Plain(Vec<f32>),
    /// Mean-centred absmax stored as 8-bit dynamic codes
    Double { quantized: Blockwise8, offset: f32 },
}

impl Absmax {
    fn values(&self) -> Vec<f32> {
        match self {
            Absmax::Plain(v) => v.clone(),
            Absmax::Double { quantized, offset } => {
                let map = dynamic_map();
                dequantize_blockwise(quantized, &map).into_iter().map(|v| v + offset).collect()
            }
        }
    }

    fn bytes(&self) -> usize {
        match self {
            Absmax::Plain(v) => v.len() * 4,
            // codes + second-level f32 absmax + offset
            Absmax::Double { quantized, .. } => {
                quantized.codes.len() + quantized.absmax.len() * 4 + 4
            }
        }
    }
}

/// NF4 representation of a frozen tensor
#[derive(Clone, Debug)]
pub struct Nf4Tensor {
    /// Packed codes: 2 values per byte
    pub data: Vec<u8>,
    pub absmax: Absmax,
    /// Original number of elements
    pub len: usize,
    pub config: Nf4Config,
}

impl Nf4Tensor {
    /// Quantize f32 values
    pub fn quantize(values: &[f32], config: Nf4Config) -> Self {
        let len = values.len();
        let mut scales = Vec::with_capacity(len.div_ceil(config.blocksize));
        let mut data = vec![0u8; len.div_ceil(2)];

        for (block_idx, block) in values.chunks(config.blocksize).enumerate() {
            let max_abs = block.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            scales.push(max_abs);

            for (i, &val) in block.iter().enumerate() {
                let normalized = if max_abs > 0.0 { val / max_abs } else { 0.0 };
                let code = nearest_code(&NF4_CODE, normalized);
                let pos = block_idx * config.blocksize + i;
                if pos % 2 == 0 {
                    data[pos / 2] |= code << 4;
                } else {
                    data[pos / 2] |= code;
                }
            }
        }

        let absmax = if config.double_quant {
            let offset = if scales.is_empty() {
                0.0
            } else {
                scales.iter().sum::<f32>() / scales.len() as f32
            };
            let centred: Vec<f32> = scales.iter().map(|s| s - offset).collect();
            let quantized = quantize_blockwise(&centred, &dynamic_map(), DYNAMIC_BLOCK_SIZE);
            Absmax::Double { quantized, offset }
        } else {
            Absmax::Plain(scales)
        };

        Self { data, absmax, len, config }
    }

    /// Dequantize to f32 in the configured compute precision
    pub fn dequantize(&self) -> Vec<f32> {
        let scales = self.absmax.values();
        let round = self.config.compute_dtype == ComputeDtype::F16;

        (0..self.len)
            .map(|pos| {
                let byte = self.data[pos / 2];
                let code = if pos % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                let value = NF4_CODE[code as usize] * scales[pos / self.config.blocksize];
                if round {
                    f16::from_f32(value).to_f32()
                } else {
                    value
                }
            })
            .collect()
    }

    /// Get memory usage in bytes
    pub fn memory_bytes(&self) -> usize {
        self.data.len() + self.absmax.bytes()
    }

    /// Get compression ratio vs f32
    pub fn compression_ratio(&self) -> f32 {
        (self.len * 4) as f32 / self.memory_bytes() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn plain() -> Nf4Config {
        Nf4Config { double_quant: false, compute_dtype: ComputeDtype::F32, ..Default::default() }
    }

    #[test]
    fn test_code_book_values_are_exact() {
        let values: Vec<f32> = NF4_CODE.iter().map(|c| c * 2.0).collect();
        let q = Nf4Tensor::quantize(&values, plain());
        let back = q.dequantize();
        for (a, b) in values.iter().zip(&back) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_nibble_order_high_first() {
        // -1 maps to code 0, +1 maps to code 15
        let q = Nf4Tensor::quantize(&[-1.0, 1.0], plain());
        assert_eq!(q.data, vec![0x0F]);
        let q = Nf4Tensor::quantize(&[1.0, -1.0], plain());
        assert_eq!(q.data, vec![0xF0]);
    }

    #[test]
    fn test_zero_block() {
        let q = Nf4Tensor::quantize(&[0.0; 64], plain());
        assert!(q.dequantize().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_odd_length_and_partial_block() {
        let values: Vec<f32> = (0..77).map(|i| (i as f32 * 0.3).cos()).collect();
        let q = Nf4Tensor::quantize(&values, plain());
        assert_eq!(q.data.len(), 39);
        assert_eq!(q.dequantize().len(), 77);
        match &q.absmax {
            Absmax::Plain(s) => assert_eq!(s.len(), 2),
            Absmax::Double { .. } => panic!("expected plain absmax"),
        }
    }

    #[test]
    fn test_double_quant_memory() {
        let values: Vec<f32> = (0..64 * 512).map(|i| ((i % 97) as f32 - 48.0) / 100.0).collect();
        let single = Nf4Tensor::quantize(&values, plain());
        let double = Nf4Tensor::quantize(&values, Nf4Config::default());
        assert!(double.memory_bytes() < single.memory_bytes());
        assert!(double.compression_ratio() > 7.5);
    }

    #[test]
    fn test_f16_compute_rounds() {
        let values = vec![0.123_456_79f32; 64];
        let config = Nf4Config { double_quant: false, ..Default::default() };
        let back = Nf4Tensor::quantize(&values, config).dequantize();
        assert_eq!(back[0], f16::from_f32(back[0]).to_f32());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_error_within_half_code_gap(
            values in proptest::collection::vec(-4.0f32..4.0, 1..300),
            double in any::<bool>(),
        ) {
            let config = Nf4Config { double_quant: double, compute_dtype: ComputeDtype::F32, ..Default::default() };
            let q = Nf4Tensor::quantize(&values, config);
            let back = q.dequantize();
            prop_assert_eq!(back.len(), values.len());
            let global = values.iter().fold(0.0f32, |m, v| m.max(v.abs()));
            for (block, deq) in values.chunks(64).zip(back.chunks(64)) {
                let max = block.iter().fold(0.0f32, |m, v| m.max(v.abs()));
                // Widest NF4 half gap is (0.6962 - 1) / 2; the 8-bit absmax
                // error is relative to the largest centred absmax
                let bound = max * 0.16 + global * 0.01 + 1e-5;
                for (a, b) in block.iter().zip(deq) {
                    prop_assert!((a - b).abs() <= bound, "{} vs {} (bound {})", a, b, bound);
                }
            }
        }
    }
}
