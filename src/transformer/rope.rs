//! Rotary position embedding frequencies, including Llama 3 scaling

use super::config::LlamaConfig;
use crate::autograd::RotaryTables;
use std::f32::consts::PI;
use std::rc::Rc;

/// Inverse frequencies of the rotary embedding
#[derive(Debug, Clone)]
pub struct RotaryEmbedding {
    inv_freq: Vec<f32>,
    head_dim: usize,
}

impl RotaryEmbedding {
    pub fn new(config: &LlamaConfig) -> Self {
        let head_dim = config.head_dim();
        let mut inv_freq: Vec<f32> = (0..head_dim / 2)
            .map(|i| 1.0 / config.rope_theta.powf((2 * i) as f32 / head_dim as f32))
            .collect();

        if let Some(scaling) = &config.rope_scaling {
            match scaling.rope_type.as_str() {
                "linear" => inv_freq.iter_mut().for_each(|f| *f /= scaling.factor),
                "llama3" => {
                    let old_len = scaling.original_max_position_embeddings as f32;
                    let low_freq_wavelen = old_len / scaling.low_freq_factor;
                    let high_freq_wavelen = old_len / scaling.high_freq_factor;
                    for f in inv_freq.iter_mut() {
                        let wavelen = 2.0 * PI / *f;
                        if wavelen > low_freq_wavelen {
                            *f /= scaling.factor;
                        } else if wavelen >= high_freq_wavelen {
                            // Interpolate between scaled and unscaled
                            let smooth = (old_len / wavelen - scaling.low_freq_factor)
                                / (scaling.high_freq_factor - scaling.low_freq_factor);
                            *f = (1.0 - smooth) * *f / scaling.factor + smooth * *f;
                        }
                    }
                }
                _ => {}
            }
        }

        Self { inv_freq, head_dim }
    }

    pub fn inv_freq(&self) -> &[f32] {
        &self.inv_freq
    }

    /// Cos/sin tables for one position per token row
    pub fn tables(&self, positions: &[usize]) -> RotaryTables {
        let hd = self.head_dim;
        let half = hd / 2;
        let mut cos = vec![0.0f32; positions.len() * hd];
        let mut sin = vec![0.0f32; positions.len() * hd];
        for (t, &pos) in positions.iter().enumerate() {
            for (i, &f) in self.inv_freq.iter().enumerate() {
                let angle = pos as f32 * f;
                let (s, c) = angle.sin_cos();
                cos[t * hd + i] = c;
                cos[t * hd + i + half] = c;
                sin[t * hd + i] = s;
                sin[t * hd + i + half] = s;
            }
        }
        RotaryTables { cos: Rc::from(cos), sin: Rc::from(sin), head_dim: hd }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::config::RopeScaling;
    use approx::assert_relative_eq;

    #[test]
    fn test_unscaled_frequencies() {
        let config = LlamaConfig::tiny();
        let rope = RotaryEmbedding::new(&config);
        assert_eq!(rope.inv_freq().len(), 2);
        assert_relative_eq!(rope.inv_freq()[0], 1.0);
        assert_relative_eq!(rope.inv_freq()[1], 0.01, max_relative = 1e-5);
    }

    #[test]
    fn test_llama3_scaling_bands() {
        let mut config = LlamaConfig::tiny();
        config.hidden_size = 128;
        config.num_attention_heads = 2;
        config.num_key_value_heads = Some(2);
        config.rope_theta = 500000.0;
        config.rope_scaling = Some(RopeScaling {
            rope_type: "llama3".to_string(),
            factor: 32.0,
            low_freq_factor: 1.0,
            high_freq_factor: 4.0,
            original_max_position_embeddings: 8192,
        });
        let scaled = RotaryEmbedding::new(&config);
        config.rope_scaling = None;
        let plain = RotaryEmbedding::new(&config);

        // Highest frequency (short wavelength) is untouched
        assert_eq!(scaled.inv_freq()[0], plain.inv_freq()[0]);
        // Lowest frequency (wavelength beyond 8192) is divided by the factor
        let last = plain.inv_freq().len() - 1;
        assert_relative_eq!(scaled.inv_freq()[last], plain.inv_freq()[last] / 32.0, max_relative = 1e-6);
        // Everything stays within [f / factor, f]
        for (s, p) in scaled.inv_freq().iter().zip(plain.inv_freq()) {
            assert!(*s <= *p && *s >= p / 32.0 - 1e-12);
        }
    }

    #[test]
    fn test_tables_duplicate_halves() {
        let rope = RotaryEmbedding::new(&LlamaConfig::tiny());
        let tables = rope.tables(&[0, 3]);
        assert_eq!(tables.cos.len(), 8);
        assert_eq!(&tables.cos[0..4], &[1.0, 1.0, 1.0, 1.0]);
        assert_eq!(tables.sin[4], tables.sin[6]);
        assert_relative_eq!(tables.sin[4], 3.0f32.sin());
    }
}
