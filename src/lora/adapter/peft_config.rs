//! PEFT-compatible adapter_config.json generation
//!
//! Generates adapter configuration files compatible with HuggingFace PEFT library,
//! enabling direct loading in `transformers` and `peft` Python packages.

use crate::lora::{LoRAConfig, LoraBias};
use serde::{Deserialize, Serialize};

/// PEFT adapter configuration matching the HuggingFace PEFT schema
///
/// This struct serializes to `adapter_config.json` format that can be loaded by
/// `peft.PeftModel.from_pretrained()`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PeftAdapterConfig {
    /// PEFT method type (always "LORA" for LoRA adapters)
    pub peft_type: String,
    /// LoRA rank
    pub r: usize,
    /// LoRA alpha scaling parameter
    pub lora_alpha: f32,
    /// Target module names for LoRA adaptation
    pub target_modules: Vec<String>,
    /// LoRA dropout rate
    pub lora_dropout: f32,
    /// Bias handling: "none", "all", or "lora_only"
    pub bias: String,
    /// Base model name or path (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_name_or_path: Option<String>,
    /// Task type (e.g., "CAUSAL_LM")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(default)]
    pub fan_in_fan_out: bool,
    #[serde(default)]
    pub inference_mode: bool,
}

impl PeftAdapterConfig {
    /// Build the PEFT view of a [`LoRAConfig`]
    pub fn from_lora_config(config: &LoRAConfig, base_model: Option<&str>) -> Self {
        Self {
            peft_type: "LORA".to_string(),
            r: config.rank,
            lora_alpha: config.alpha,
            // BTreeSet iteration is already sorted
            target_modules: config.target_modules.iter().cloned().collect(),
            lora_dropout: config.dropout,
            bias: config.bias.as_str().to_string(),
            base_model_name_or_path: base_model.map(String::from),
            task_type: Some(config.task_type.clone()),
            fan_in_fan_out: false,
            inference_mode: true,
        }
    }

    /// Convert back, rejecting anything that is not a plain LoRA adapter
    pub fn to_lora_config(&self) -> Result<LoRAConfig, String> {
        if self.peft_type != "LORA" {
            return Err(format!("unsupported peft_type '{}'", self.peft_type));
        }
        if self.fan_in_fan_out {
            return Err("fan_in_fan_out adapters are not supported".to_string());
        }
        let bias = match self.bias.as_str() {
            "none" => LoraBias::None,
            "all" => LoraBias::All,
            "lora_only" => LoraBias::LoraOnly,
            other => return Err(format!("unknown bias mode '{other}'")),
        };
        Ok(LoRAConfig {
            rank: self.r,
            alpha: self.lora_alpha,
            dropout: self.lora_dropout,
            bias,
            task_type: self.task_type.clone().unwrap_or_else(|| "CAUSAL_LM".to_string()),
            target_modules: self.target_modules.iter().cloned().collect(),
        })
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
