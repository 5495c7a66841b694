//! Generation settings and stop-token resolution

use crate::error::{Error, Result};
use crate::transformer::{LlamaConfig, TokenIds};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decoding strategy selected by a [`GenerationConfig`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingMode {
    Greedy,
    Sample,
    BeamSearch,
}

/// Knobs passed to `generate`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_new_tokens: usize,
    pub min_new_tokens: usize,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_k: Option<usize>,
    pub top_p: Option<f32>,
    pub num_beams: usize,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
    pub num_return_sequences: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 64,
            min_new_tokens: 1,
            do_sample: false,
            temperature: 0.0,
            top_k: None,
            top_p: None,
            num_beams: 1,
            repetition_penalty: 1.0,
            length_penalty: 1.0,
            num_return_sequences: 1,
        }
    }
}

impl GenerationConfig {
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    pub fn mode(&self) -> DecodingMode {
        if self.num_beams > 1 {
            DecodingMode::BeamSearch
        } else if self.do_sample {
            DecodingMode::Sample
        } else {
            DecodingMode::Greedy
        }
    }

    /// Reject combinations no decoding mode can honour
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::Generation(msg));
        if self.max_new_tokens == 0 {
            return fail("max_new_tokens must be positive".into());
        }
        if self.num_beams == 0 {
            return fail("num_beams must be at least 1".into());
        }
        if self.num_return_sequences == 0 {
            return fail("num_return_sequences must be at least 1".into());
        }
        if self.repetition_penalty <= 0.0 || !self.repetition_penalty.is_finite() {
            return fail(format!("repetition_penalty must be positive, got {}", self.repetition_penalty));
        }
        if let Some(p) = self.top_p {
            if !(p > 0.0 && p <= 1.0) {
                return fail(format!("top_p must be in (0, 1], got {p}"));
            }
        }
        if self.top_k == Some(0) {
            return fail("top_k must be positive".into());
        }

        match self.mode() {
            DecodingMode::Greedy if self.num_return_sequences > 1 => fail(format!(
                "greedy decoding returns one sequence, got num_return_sequences={}",
                self.num_return_sequences
            )),
            DecodingMode::Sample if self.temperature <= 0.0 => fail(format!(
                "sampling needs a strictly positive temperature, got {}",
                self.temperature
            )),
            DecodingMode::BeamSearch if self.do_sample => {
                fail("sampling inside beam search is not supported".into())
            }
            DecodingMode::BeamSearch if self.num_return_sequences > self.num_beams => fail(format!(
                "num_return_sequences ({}) must not exceed num_beams ({})",
                self.num_return_sequences, self.num_beams
            )),
            _ => Ok(()),
        }
    }
}

/// Token ids read from a model's `generation_config.json`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerationDefaults {
    #[serde(default)]
    pub eos_token_id: Option<TokenIds>,
    #[serde(default)]
    pub pad_token_id: Option<u32>,
    #[serde(default)]
    pub bos_token_id: Option<u32>,
}

impl GenerationDefaults {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Ids that end a sequence and fill finished rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTokens {
    pub eos_ids: Vec<u32>,
    pub pad_id: u32,
}

impl StopTokens {
    /// EOS ids from `generation_config.json`, else `config.json`, else the tokenizer
    pub fn resolve(
        defaults: Option<&GenerationDefaults>,
        model: &LlamaConfig,
        tokenizer_eos: Option<u32>,
        pad_id: u32,
    ) -> Self {
        let eos_ids = defaults
            .and_then(|d| d.eos_token_id.as_ref())
            .or(model.eos_token_id.as_ref())
            .map(TokenIds::to_vec)
            .or_else(|| tokenizer_eos.map(|id| vec![id]))
            .unwrap_or_default();
        Self { eos_ids, pad_id }
    }

    pub fn is_eos(&self, token: u32) -> bool {
        self.eos_ids.contains(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_greedy_decoding() {
        let config = GenerationConfig::default();
        assert_eq!(config.mode(), DecodingMode::Greedy);
        assert_eq!(config.min_new_tokens, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sampling_needs_positive_temperature() {
        let config = GenerationConfig { do_sample: true, ..Default::default() };
        assert!(matches!(config.validate(), Err(Error::Generation(_))));
        let config = GenerationConfig { do_sample: true, temperature: 0.7, num_return_sequences: 4, ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_return_sequences_bounded_by_mode() {
        let greedy = GenerationConfig { num_return_sequences: 2, ..Default::default() };
        assert!(greedy.validate().is_err());
        let beams = GenerationConfig { num_beams: 3, num_return_sequences: 3, ..Default::default() };
        assert!(beams.validate().is_ok());
        let beams = GenerationConfig { num_beams: 3, num_return_sequences: 4, ..Default::default() };
        assert!(beams.validate().is_err());
    }

    #[test]
    fn test_stop_tokens_prefer_generation_config() {
        let mut model = LlamaConfig::tiny();
        model.eos_token_id = Some(TokenIds::One(7));
        let defaults: GenerationDefaults =
            serde_json::from_str(r#"{"eos_token_id": [2, 9], "do_sample": true}"#).unwrap();

        assert_eq!(StopTokens::resolve(Some(&defaults), &model, Some(3), 0).eos_ids, vec![2, 9]);
        assert_eq!(StopTokens::resolve(None, &model, Some(3), 0).eos_ids, vec![7]);
        model.eos_token_id = None;
        assert_eq!(StopTokens::resolve(None, &model, Some(3), 0).eos_ids, vec![3]);
    }
}
