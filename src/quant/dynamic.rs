//! Signed 8-bit dynamic quantization map and blockwise 8-bit quantization
//!
//! Used for double quantization: the per-block absmax statistics of an NF4
//! tensor are themselves stored as 8-bit codes against this map.

/// Block size used when quantizing absmax statistics
pub const DYNAMIC_BLOCK_SIZE: usize = 256;

/// Build the signed dynamic map with 7 exponent bits and 8 total bits
///
/// For each exponent `i` in `0..7`, the midpoints of `linspace(0.1, 1, 2^i + 1)`
/// are scaled by `10^(i - 6)` and added with both signs. `0` and `1` complete
/// the 256 entries, which are returned sorted.
pub fn dynamic_map() -> [f32; 256] {
    let max_exponent_bits = 7i32;
    let mut data: Vec<f32> = Vec::with_capacity(256);

    for i in 0..max_exponent_bits {
        let fraction_items = (1usize << i) + 1;
        let step = 0.9f64 / (fraction_items - 1) as f64;
        let magnitude = 10f64.powi(-(max_exponent_bits - 1) + i);
        for j in 0..fraction_items - 1 {
            let lo = 0.1 + step * j as f64;
            let hi = 0.1 + step * (j + 1) as f64;
            let mean = (lo + hi) / 2.0;
            data.push((magnitude * mean) as f32);
            data.push((-magnitude * mean) as f32);
        }
    }
    data.push(0.0);
    data.push(1.0);
    data.sort_by(f32::total_cmp);

    let mut map = [0.0f32; 256];
    map.copy_from_slice(&data);
    map
}

/// Index of the code closest to `x` in a sorted code table
///
/// Exact midpoints resolve to the lower code.
pub(crate) fn nearest_code(table: &[f32], x: f32) -> u8 {
    let idx = table.partition_point(|&c| c < x);
    if idx == 0 {
        return 0;
    }
    if idx == table.len() {
        return (table.len() - 1) as u8;
    }
    let (lo, hi) = (table[idx - 1], table[idx]);
    if x - lo <= hi - x {
        (idx - 1) as u8
    } else {
        idx as u8
    }
}

/// 8-bit blockwise quantized values
#[derive(Clone, Debug, PartialEq)]
pub struct Blockwise8 {
    pub codes: Vec<u8>,
    pub absmax: Vec<f32>,
    pub blocksize: usize,
}

/// Quantize with per-block absmax scaling against the dynamic map
pub fn quantize_blockwise(values: &[f32], map: &[f32; 256], blocksize: usize) -> Blockwise8 {
    let mut codes = Vec::with_capacity(values.len());
    let mut absmax = Vec::with_capacity(values.len().div_ceil(blocksize));

    for block in values.chunks(blocksize) {
        let max = block.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        absmax.push(max);
        for &v in block {
            let normalized = if max > 0.0 { v / max } else { 0.0 };
            codes.push(nearest_code(map, normalized));
        }
    }

    Blockwise8 { codes, absmax, blocksize }
}

/// Inverse of [`quantize_blockwise`]
pub fn dequantize_blockwise(q: &Blockwise8, map: &[f32; 256]) -> Vec<f32> {
    q.codes
        .iter()
        .enumerate()
        .map(|(i, &c)| map[c as usize] * q.absmax[i / q.blocksize])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamic_map_shape() {
        let map = dynamic_map();
        assert_eq!(map.len(), 256);
        assert_eq!(map[255], 1.0);
        assert!(map.windows(2).all(|w| w[0] <= w[1]));
        assert!(map.contains(&0.0));
        // Smallest magnitude is the first midpoint at exponent 1e-6
        let smallest = map.iter().filter(|v| **v > 0.0).fold(f32::INFINITY, |a, &b| a.min(b));
        assert!((smallest - 0.55e-6).abs() < 1e-9);
    }

    #[test]
    fn test_nearest_code_picks_closest() {
        let table = [-1.0, 0.0, 0.5, 1.0];
        assert_eq!(nearest_code(&table, -2.0), 0);
        assert_eq!(nearest_code(&table, 0.2), 1);
        assert_eq!(nearest_code(&table, 0.25), 1);
        assert_eq!(nearest_code(&table, 0.3), 2);
        assert_eq!(nearest_code(&table, 3.0), 3);
    }

    #[test]
    fn test_blockwise_error_is_small() {
        let map = dynamic_map();
        let values: Vec<f32> = (0..600).map(|i| ((i as f32) * 0.37).sin() * 0.02).collect();
        let q = quantize_blockwise(&values, &map, DYNAMIC_BLOCK_SIZE);
        assert_eq!(q.absmax.len(), 3);
        let back = dequantize_blockwise(&q, &map);
        for (a, b) in values.iter().zip(&back) {
            assert!((a - b).abs() < 0.02 * 0.05, "{a} vs {b}");
        }
    }
}
