//! Base model, tokenizer and adapter setup
//!
//! ```text
//! hub / local dir -> config.json + tokenizer + safetensors
//!   -> LlamaForCausalLM (decoder projections in NF4)
//!   -> LoRA adapters on target_modules, everything else frozen
//! ```

use crate::cli::logging::{log, LogLevel};
use crate::config::{FinetuneSpec, ModelSpec, QuantSpec};
use crate::error::Result;
use crate::generate::{GenerationDefaults, StopTokens};
use crate::hub::{FetchOptions, HfModelFetcher, ModelArtifact};
use crate::lora::LoRAConfig;
use crate::tokenizer::HfTokenizer;
use crate::transformer::{LlamaConfig, LlamaForCausalLM, WeightStore};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// What to load and how to adapt it
#[derive(Debug, Clone)]
pub struct LoadSpec {
    pub model: ModelSpec,
    pub quantization: QuantSpec,
    /// Fresh adapters to inject; `None` leaves the model unadapted
    pub lora: Option<LoRAConfig>,
    /// Seed for adapter initialization
    pub seed: u64,
}

impl LoadSpec {
    pub fn from_spec(spec: &FinetuneSpec) -> Self {
        Self {
            model: spec.model.clone(),
            quantization: spec.quantization.clone(),
            lora: Some(spec.lora.clone()),
            seed: spec.training.trainer.seed,
        }
    }

    /// Same model and quantization, no fresh adapters
    pub fn without_lora(mut self) -> Self {
        self.lora = None;
        self
    }
}

/// Everything the fine-tuning module needs from the loader
pub struct LoadedLlm {
    pub tokenizer: HfTokenizer,
    pub model: LlamaForCausalLM,
    pub stop: StopTokens,
    pub artifact: ModelArtifact,
}

/// Local files of the configured model, downloading them when needed
pub fn resolve_artifact(model: &ModelSpec) -> Result<ModelArtifact> {
    if let Some(dir) = &model.local_path {
        return ModelArtifact::from_dir(dir);
    }
    let mut options = FetchOptions::new().revision(model.revision.clone());
    if let Some(dir) = &model.cache_dir {
        options = options.cache_dir(dir.clone());
    }
    if let Some(token) = &model.token {
        options = options.token(token.clone());
    }
    HfModelFetcher::new().download_model(&model.repo_id, options)
}

/// Load tokenizer and model, quantize the decoder and inject adapters
pub fn load_llm(spec: &LoadSpec, level: LogLevel) -> Result<LoadedLlm> {
    let quant = spec.quantization.nf4_config()?;
    log(level, LogLevel::Normal, &format!("Loading {}", spec.model.display_name()));
    let artifact = resolve_artifact(&spec.model)?;

    let tokenizer = HfTokenizer::from_file(&artifact.tokenizer, artifact.tokenizer_config.as_deref())?;
    let config = LlamaConfig::from_file(&artifact.config)?;
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "  {} layers, hidden {}, heads {}/{}, vocab {}",
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads,
            config.num_kv_heads(),
            config.vocab_size
        ),
    );

    let store = WeightStore::open(&artifact.weights)?;
    let mut model = LlamaForCausalLM::from_weights(config, &store, quant)?;
    drop(store);
    if quant.is_some() {
        log(level, LogLevel::Verbose, "  Decoder projections quantized to NF4");
    }

    if let Some(lora) = &spec.lora {
        let mut rng = StdRng::seed_from_u64(spec.seed);
        let adapted = model.apply_lora(lora, &mut rng)?;
        log(
            level,
            LogLevel::Verbose,
            &format!("  LoRA r={} alpha={} on {adapted} modules", lora.rank, lora.alpha),
        );
        let counts = model.parameter_counts();
        log(
            level,
            LogLevel::Normal,
            &format!(
                "trainable params: {} || all params: {} || trainable%: {:.4}",
                counts.trainable,
                counts.total,
                counts.trainable_percent()
            ),
        );
    }

    let defaults = artifact
        .generation_config
        .as_ref()
        .map(GenerationDefaults::from_file)
        .transpose()?;
    let stop = StopTokens::resolve(defaults.as_ref(), model.config(), tokenizer.eos_id(), tokenizer.pad_id());
    log(level, LogLevel::Verbose, &format!("  EOS ids {:?}, pad id {}", stop.eos_ids, stop.pad_id));

    Ok(LoadedLlm { tokenizer, model, stop, artifact })
}
