//! LoRA configuration: rank, scaling and which modules get adapters

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Projection names adapted by default in a Llama decoder block
pub const LLAMA_PROJECTIONS: [&str; 7] =
    ["up_proj", "down_proj", "gate_proj", "k_proj", "q_proj", "v_proj", "o_proj"];

/// Bias handling, as named in PEFT's `adapter_config.json`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoraBias {
    #[default]
    None,
    All,
    LoraOnly,
}

impl LoraBias {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoraBias::None => "none",
            LoraBias::All => "all",
            LoraBias::LoraOnly => "lora_only",
        }
    }
}

/// LoRA hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoRAConfig {
    /// Rank of the low-rank update
    #[serde(alias = "r")]
    pub rank: usize,
    /// Scaling numerator: updates are scaled by `alpha / rank`
    #[serde(alias = "lora_alpha")]
    pub alpha: f32,
    /// Dropout applied to the adapter input during training
    #[serde(alias = "lora_dropout")]
    pub dropout: f32,
    pub bias: LoraBias,
    pub task_type: String,
    /// Module name suffixes that receive an adapter
    pub target_modules: BTreeSet<String>,
}

impl Default for LoRAConfig {
    fn default() -> Self {
        Self {
            rank: 16,
            alpha: 32.0,
            dropout: 0.05,
            bias: LoraBias::None,
            task_type: "CAUSAL_LM".to_string(),
            target_modules: LLAMA_PROJECTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl LoRAConfig {
    /// Config with the given rank and alpha and no targets
    pub fn new(rank: usize, alpha: f32) -> Self {
        Self { rank, alpha, target_modules: BTreeSet::new(), ..Default::default() }
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    /// Add target module names
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_modules.extend(targets.into_iter().map(Into::into));
        self
    }

    /// Target every projection of a Llama block
    pub fn target_all_projections(self) -> Self {
        self.with_targets(LLAMA_PROJECTIONS)
    }

    /// Target q, k, v and o
    pub fn target_attention_projections(self) -> Self {
        self.with_targets(["q_proj", "k_proj", "v_proj", "o_proj"])
    }

    /// Whether the module at `path` (e.g. `model.layers.0.self_attn.q_proj`)
    /// should receive an adapter
    pub fn should_apply(&self, path: &str) -> bool {
        self.target_modules
            .iter()
            .any(|t| path == t || path.ends_with(&format!(".{t}")))
    }

    /// `alpha / rank`
    pub fn scale(&self) -> f32 {
        self.alpha / self.rank as f32
    }
}
