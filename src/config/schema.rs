//! YAML schema definitions for a fine-tuning experiment

use crate::error::{Error, Result};
use crate::generate::GenerationConfig;
use crate::lora::LoRAConfig;
use crate::quant::{ComputeDtype, Nf4Config};
use crate::train::TrainerConfig;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

/// Deserialize a bool from either a YAML boolean (`true`) or a quoted string (`"true"`)
fn deserialize_bool_lenient<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum BoolOrString {
        Bool(bool),
        Str(String),
    }

    match BoolOrString::deserialize(deserializer)? {
        BoolOrString::Bool(b) => Ok(b),
        BoolOrString::Str(s) => match s.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected 'true' or 'false', got '{other}'"
            ))),
        },
    }
}

fn default_true() -> bool {
    true
}

/// Complete fine-tuning specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinetuneSpec {
    /// Base model location
    #[serde(default)]
    pub model: ModelSpec,

    /// 4-bit quantization of the frozen weights
    #[serde(default)]
    pub quantization: QuantSpec,

    /// LoRA adapters (PEFT field names `r`, `lora_alpha` and `lora_dropout` are accepted)
    #[serde(default)]
    pub lora: LoRAConfig,

    /// Datasets and tokenization lengths
    pub data: DataSpec,

    /// Optimizer, schedule and loop settings
    #[serde(default)]
    pub training: TrainingSpec,

    /// Decoding used by validation and test; `max_new_tokens` comes from `data.max_gen_length`
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl FinetuneSpec {
    /// Generation settings with the length taken from the data section
    pub fn generation_config(&self) -> GenerationConfig {
        self.generation.clone().with_max_new_tokens(self.data.max_gen_length)
    }
}

/// Where the base model comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// HuggingFace repository id, `org/name`
    pub repo_id: String,
    pub revision: String,
    /// Hub cache; the platform cache when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Access token; `HF_TOKEN` or `~/.huggingface/token` when unset
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Model directory on disk, used instead of the hub
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            repo_id: "meta-llama/Llama-3.2-1B-Instruct".to_string(),
            revision: "main".to_string(),
            cache_dir: None,
            token: None,
            local_path: None,
        }
    }
}

impl ModelSpec {
    /// Human-readable source, for logs and adapter metadata
    pub fn display_name(&self) -> String {
        match &self.local_path {
            Some(path) => path.display().to_string(),
            None => self.repo_id.clone(),
        }
    }
}

/// bitsandbytes-style quantization settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantSpec {
    #[serde(deserialize_with = "deserialize_bool_lenient")]
    pub load_in_4bit: bool,
    /// Only `nf4` is supported
    pub quant_type: String,
    #[serde(deserialize_with = "deserialize_bool_lenient")]
    pub double_quant: bool,
    pub compute_dtype: ComputeDtype,
    pub blocksize: usize,
}

impl Default for QuantSpec {
    fn default() -> Self {
        Self {
            load_in_4bit: true,
            quant_type: "nf4".to_string(),
            double_quant: true,
            compute_dtype: ComputeDtype::F16,
            blocksize: 64,
        }
    }
}

impl QuantSpec {
    /// NF4 settings, or `None` when the weights stay dense
    pub fn nf4_config(&self) -> Result<Option<Nf4Config>> {
        if !self.load_in_4bit {
            return Ok(None);
        }
        if self.quant_type != "nf4" {
            return Err(Error::ConfigError(format!(
                "unsupported quant_type '{}' (only nf4 is available)",
                self.quant_type
            )));
        }
        if self.blocksize == 0 {
            return Err(Error::ConfigError("quantization blocksize must be positive".into()));
        }
        Ok(Some(Nf4Config {
            blocksize: self.blocksize,
            double_quant: self.double_quant,
            compute_dtype: self.compute_dtype,
        }))
    }
}

/// Data configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSpec {
    /// Training JSONL with `input` and `answer` fields
    pub train: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<PathBuf>,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Token length prompts and pairs are padded and truncated to
    #[serde(default = "default_max_input_length")]
    pub max_input_length: usize,

    /// New tokens generated during validation and test
    #[serde(default = "default_max_gen_length")]
    pub max_gen_length: usize,

    /// Shuffle the training set every epoch
    #[serde(default = "default_true", deserialize_with = "deserialize_bool_lenient")]
    pub shuffle: bool,
}

fn default_batch_size() -> usize {
    8
}

fn default_max_input_length() -> usize {
    256
}

fn default_max_gen_length() -> usize {
    32
}

/// Training hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSpec {
    /// Peak learning rate
    pub lr: f32,
    /// Decoupled AdamW weight decay
    pub weight_decay: f32,
    /// `cosine` or unset for a constant rate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lr_scheduler: Option<String>,
    /// Floor of the cosine decay
    pub lr_decay_min_lr: f32,
    /// Rate at step 0 of the warmup; negative means `lr`
    pub lr_warmup_start_lr: f32,
    /// Checkpoints and `metrics.jsonl` go here
    pub output_dir: PathBuf,
    /// Stop after this many validations without improvement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_stopping_patience: Option<usize>,
    /// Loop limits, accumulation, clipping, validation cadence and seed
    #[serde(flatten)]
    pub trainer: TrainerConfig,
}

impl Default for TrainingSpec {
    fn default() -> Self {
        Self {
            lr: 1e-4,
            weight_decay: 0.0,
            lr_scheduler: None,
            lr_decay_min_lr: 1e-6,
            lr_warmup_start_lr: -1.0,
            output_dir: PathBuf::from("runs/afinar"),
            early_stopping_patience: None,
            trainer: TrainerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "data:\n  train: train.jsonl\n";

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let spec: FinetuneSpec = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(spec.model, ModelSpec::default());
        assert_eq!(spec.quantization, QuantSpec::default());
        assert_eq!(spec.lora, LoRAConfig::default());
        assert_eq!(spec.lora.target_modules.len(), 7);
        assert_eq!(spec.data.batch_size, 8);
        assert_eq!(spec.training.trainer.max_epochs, Some(1));
        assert_eq!(spec.generation_config().max_new_tokens, 32);
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
model:
  repo_id: org/tiny
  local_path: /models/tiny
quantization:
  double_quant: "false"
  compute_dtype: f32
  blocksize: 32
lora:
  r: 8
  lora_alpha: 16
  target_modules: [q_proj, v_proj]
data:
  train: train.jsonl
  val: val.jsonl
  batch_size: 4
  max_gen_length: 8
training:
  lr: 0.0002
  lr_scheduler: cosine
  max_steps: 100
  accumulate_grad_batches: 2
  gradient_clip_val: 1.0
  seed: 7
generation:
  num_beams: 3
"#;
        let spec: FinetuneSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.model.display_name(), "/models/tiny");
        assert_eq!(spec.lora.rank, 8);
        assert_eq!(spec.lora.alpha, 16.0);
        assert_eq!(spec.training.lr_scheduler.as_deref(), Some("cosine"));
        assert_eq!(spec.training.trainer.max_steps, Some(100));
        assert_eq!(spec.training.trainer.accumulate_grad_batches, 2);
        assert_eq!(spec.training.trainer.seed, 7);
        assert_eq!(spec.generation_config().num_beams, 3);
        assert_eq!(spec.generation_config().max_new_tokens, 8);

        let nf4 = spec.quantization.nf4_config().unwrap().unwrap();
        assert!(!nf4.double_quant);
        assert_eq!(nf4.blocksize, 32);
        assert_eq!(nf4.compute_dtype, ComputeDtype::F32);
    }

    #[test]
    fn test_quant_type_must_be_nf4() {
        let quant = QuantSpec { quant_type: "fp4".into(), ..Default::default() };
        assert!(matches!(quant.nf4_config(), Err(Error::ConfigError(_))));
        let dense = QuantSpec { load_in_4bit: false, quant_type: "fp4".into(), ..Default::default() };
        assert_eq!(dense.nf4_config().unwrap(), None);
    }

    #[test]
    fn test_token_is_not_serialized() {
        let mut spec: FinetuneSpec = serde_yaml::from_str(MINIMAL).unwrap();
        spec.model.token = Some("hf_secret".into());
        let yaml = serde_yaml::to_string(&spec).unwrap();
        assert!(!yaml.contains("hf_secret"));
    }
}
