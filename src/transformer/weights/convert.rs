//! Tensor format conversion from SafeTensors to f32

use half::{bf16, f16};
use safetensors::tensor::TensorView;
use safetensors::Dtype;

/// Convert SafeTensors tensor view to f32 Vec
///
/// Handles bf16, fp16, and fp32 formats. Returns `None` for any other dtype.
pub(crate) fn tensor_to_f32_vec(tensor: &TensorView<'_>) -> Option<Vec<f32>> {
    let numel: usize = tensor.shape().iter().product();
    if numel == 0 {
        return Some(Vec::new());
    }

    let data = tensor.data();
    match tensor.dtype() {
        Dtype::F32 => Some(
            data.chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect(),
        ),
        Dtype::F16 => Some(
            data.chunks_exact(2)
                .map(|chunk| f16::from_bits(u16::from_le_bytes([chunk[0], chunk[1]])).to_f32())
                .collect(),
        ),
        Dtype::BF16 => Some(
            data.chunks_exact(2)
                .map(|chunk| bf16::from_bits(u16::from_le_bytes([chunk[0], chunk[1]])).to_f32())
                .collect(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bf16_and_f16_decode() {
        let bf: Vec<u8> = [1.5f32, -2.0]
            .iter()
            .flat_map(|v| bf16::from_f32(*v).to_bits().to_le_bytes())
            .collect();
        let view = TensorView::new(Dtype::BF16, vec![2], &bf).unwrap();
        assert_eq!(tensor_to_f32_vec(&view), Some(vec![1.5, -2.0]));

        let h: Vec<u8> = [0.25f32].iter().flat_map(|v| f16::from_f32(*v).to_bits().to_le_bytes()).collect();
        let view = TensorView::new(Dtype::F16, vec![1], &h).unwrap();
        assert_eq!(tensor_to_f32_vec(&view), Some(vec![0.25]));
    }

    #[test]
    fn test_integer_dtype_unsupported() {
        let bytes = [0u8; 8];
        let view = TensorView::new(Dtype::I64, vec![1], &bytes).unwrap();
        assert!(tensor_to_f32_vec(&view).is_none());
    }
}
