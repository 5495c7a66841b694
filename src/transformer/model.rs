//! Llama causal language model with NF4 base weights and LoRA adapters

use crate::autograd::{select_rows, Context};
use crate::error::{Error, Result};
use crate::lora::{load_peft, AdapterError, LoRAConfig, LoRALayer, PeftAdapterBundle};
use crate::quant::Nf4Config;
use crate::Tensor;
use rand::Rng;
use std::path::Path;
use std::rc::Rc;

use super::attention::AttentionInput;
use super::block::DecoderLayer;
use super::cache::KvCache;
use super::config::LlamaConfig;
use super::embedding::Embedding;
use super::linear::Linear;
use super::norm::RmsNorm;
use super::rope::RotaryEmbedding;
use super::weights::WeightStore;

/// Trainable and total parameter counts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterCounts {
    pub trainable: usize,
    pub total: usize,
}

impl ParameterCounts {
    pub fn trainable_percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * self.trainable as f64 / self.total as f64
    }
}

/// Position ids for the last `seq` columns of each mask row
///
/// `cumsum(mask) - 1` with padding positions set to 1.
pub fn position_ids(mask: &[u32], batch: usize, seq: usize) -> Vec<usize> {
    let total = mask.len() / batch;
    let mut out = Vec::with_capacity(batch * seq);
    for row in mask.chunks(total) {
        let mut cumsum = 0usize;
        let positions: Vec<usize> = row
            .iter()
            .map(|&m| {
                cumsum += m as usize;
                if m == 0 {
                    1
                } else {
                    cumsum - 1
                }
            })
            .collect();
        out.extend_from_slice(&positions[total - seq..]);
    }
    out
}

/// `LlamaForCausalLM`: embeddings, decoder stack, final norm and `lm_head`
pub struct LlamaForCausalLM {
    config: LlamaConfig,
    embed_tokens: Embedding,
    layers: Vec<DecoderLayer>,
    norm: RmsNorm,
    lm_head: Linear,
    tied: bool,
    rotary: RotaryEmbedding,
    lora_config: Option<LoRAConfig>,
}

impl LlamaForCausalLM {
    /// Build the model from checkpoint tensors
    ///
    /// With `quant`, every decoder projection is stored as NF4. Embeddings,
    /// norms and `lm_head` stay dense. `lm_head` reuses the embedding table
    /// when the config ties them or the checkpoint has no `lm_head.weight`.
    pub fn from_weights(
        config: LlamaConfig,
        store: &WeightStore,
        quant: Option<Nf4Config>,
    ) -> Result<Self> {
        config.validate()?;
        let (vocab, h) = (config.vocab_size, config.hidden_size);

        let embed: Rc<[f32]> = Rc::from(store.load("model.embed_tokens.weight", &[vocab, h])?);
        let layers = (0..config.num_hidden_layers)
            .map(|i| DecoderLayer::from_store(&config, store, i, quant))
            .collect::<Result<Vec<_>>>()?;
        let norm = RmsNorm::new(store.load("model.norm.weight", &[h])?, config.rms_norm_eps);

        let tied = config.tie_word_embeddings || !store.contains("lm_head.weight");
        let lm_head = if tied {
            Linear::dense("lm_head", Rc::clone(&embed), vocab, h)
        } else {
            Linear::dense("lm_head", Rc::from(store.load("lm_head.weight", &[vocab, h])?), vocab, h)
        };

        Ok(Self {
            rotary: RotaryEmbedding::new(&config),
            embed_tokens: Embedding::new(embed, vocab, h),
            layers,
            norm,
            lm_head,
            tied,
            config,
            lora_config: None,
        })
    }

    pub fn config(&self) -> &LlamaConfig {
        &self.config
    }

    pub fn lora_config(&self) -> Option<&LoRAConfig> {
        self.lora_config.as_ref()
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Whether `lm_head` shares the embedding table
    pub fn is_tied(&self) -> bool {
        self.tied
    }

    /// Every projection, decoder blocks first, `lm_head` last
    pub fn linears(&self) -> Vec<&Linear> {
        let mut out: Vec<&Linear> = self.layers.iter().flat_map(DecoderLayer::linears).collect();
        out.push(&self.lm_head);
        out
    }

    pub fn linears_mut(&mut self) -> Vec<&mut Linear> {
        let mut out: Vec<&mut Linear> =
            self.layers.iter_mut().flat_map(DecoderLayer::linears_mut).collect();
        out.push(&mut self.lm_head);
        out
    }

    /// Attach fresh adapters to every projection named in `target_modules`
    ///
    /// Returns how many modules were adapted. A target that matches no
    /// module is a configuration error.
    pub fn apply_lora<R: Rng>(&mut self, config: &LoRAConfig, rng: &mut R) -> Result<usize> {
        if config.rank == 0 {
            return Err(Error::ConfigError("LoRA rank must be positive".to_string()));
        }
        let paths: Vec<String> = self.linears().iter().map(|l| l.path().to_string()).collect();
        let unmatched: Vec<&str> = config
            .target_modules
            .iter()
            .filter(|t| !paths.iter().any(|p| p == *t || p.ends_with(&format!(".{t}"))))
            .map(String::as_str)
            .collect();
        if !unmatched.is_empty() || config.target_modules.is_empty() {
            return Err(Error::ConfigError(format!(
                "LoRA target modules match nothing in the model: {unmatched:?}"
            )));
        }

        let mut adapted = 0;
        for linear in self.linears_mut() {
            if config.should_apply(linear.path()) {
                let layer = LoRALayer::new(
                    linear.d_out(),
                    linear.d_in(),
                    config.rank,
                    config.alpha,
                    config.dropout,
                    rng,
                );
                linear.attach_lora(layer);
                adapted += 1;
            }
        }
        self.lora_config = Some(config.clone());
        Ok(adapted)
    }

    /// The LoRA matrices, the only tensors that receive gradients
    pub fn trainable_parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.linears_mut()
            .into_iter()
            .filter_map(Linear::lora_mut)
            .flat_map(LoRALayer::trainable_params)
            .collect()
    }

    pub fn parameter_counts(&self) -> ParameterCounts {
        let h = self.config.hidden_size;
        let mut total = self.embed_tokens.vocab_size() * h + self.norm.hidden_size();
        let mut trainable = 0;
        for layer in &self.layers {
            total += layer.input_layernorm.hidden_size() + layer.post_attention_layernorm.hidden_size();
        }
        for linear in self.linears() {
            if !(self.tied && linear.path() == "lm_head") {
                total += linear.d_in() * linear.d_out();
            }
            if let Some(lora) = linear.lora() {
                trainable += lora.num_params();
            }
        }
        ParameterCounts { trainable, total: total + trainable }
    }

    /// Final hidden states before the last norm, `batch·seq × hidden`
    ///
    /// `attention_mask` covers the cached positions plus the new ones
    /// (`batch × (past + seq)`); `input_ids` holds only the new `batch × seq`.
    pub fn forward_hidden(
        &self,
        input_ids: &[u32],
        attention_mask: &[u32],
        batch: usize,
        seq: usize,
        mut cache: Option<&mut KvCache>,
        ctx: &mut Context,
    ) -> Result<Tensor> {
        let past = cache.as_ref().map_or(0, |c| c.seq_len());
        if input_ids.len() != batch * seq {
            return Err(Error::ShapeMismatch {
                name: "input_ids".to_string(),
                expected: vec![batch, seq],
                actual: vec![input_ids.len()],
            });
        }
        if attention_mask.len() != batch * (past + seq) {
            return Err(Error::ShapeMismatch {
                name: "attention_mask".to_string(),
                expected: vec![batch, past + seq],
                actual: vec![attention_mask.len()],
            });
        }

        let positions = position_ids(attention_mask, batch, seq);
        let rotary = self.rotary.tables(&positions);
        let key_mask: Rc<[bool]> = attention_mask.iter().map(|&m| m != 0).collect();
        let input = AttentionInput { batch, seq, rotary: &rotary, key_mask };

        let mut hidden = self.embed_tokens.forward(input_ids)?;
        for (i, layer) in self.layers.iter().enumerate() {
            let layer_cache = cache.as_deref_mut().map(|c| c.layer_mut(i));
            hidden = layer.forward(&hidden, &input, layer_cache, ctx);
        }
        Ok(hidden)
    }

    /// Logits (`rows.len() × vocab`) for selected rows of `forward_hidden`
    pub fn logits_for_rows(&self, hidden: &Tensor, rows: &[usize], ctx: &mut Context) -> Tensor {
        let selected = select_rows(hidden, rows, self.config.hidden_size);
        let normed = self.norm.forward(&selected);
        self.lm_head.forward(&normed, rows.len(), ctx)
    }

    /// Write the adapters in PEFT layout
    pub fn save_adapter(&self, dir: impl AsRef<Path>, base_model: Option<&str>) -> Result<()> {
        let config = self
            .lora_config
            .clone()
            .ok_or_else(|| Error::ConfigError("model has no LoRA adapters to save".to_string()))?;
        let mut bundle = PeftAdapterBundle::new(config);
        if let Some(name) = base_model {
            bundle = bundle.with_base_model(name);
        }
        for linear in self.linears() {
            if let Some(lora) = linear.lora() {
                bundle.add_adapter(linear.path(), lora);
            }
        }
        bundle.save_peft(dir)?;
        Ok(())
    }

    /// Load PEFT adapter weights, attaching adapters first if the model has none
    ///
    /// Returns the number of modules whose weights were replaced.
    pub fn load_adapter<R: Rng>(&mut self, dir: impl AsRef<Path>, rng: &mut R) -> Result<usize> {
        let loaded = load_peft(dir)?;
        if self.lora_config.is_none() {
            let config = loaded.config.to_lora_config().map_err(AdapterError::Validation)?;
            self.apply_lora(&config, rng)?;
        }

        let mut replaced = 0;
        for linear in self.linears_mut() {
            let path = linear.path().to_string();
            let Some(lora) = linear.lora_mut() else {
                continue;
            };
            let weights =
                loaded.weights.get(&path).ok_or_else(|| AdapterError::MissingModule(path.clone()))?;
            lora.set_weights(weights.lora_a.clone(), weights.lora_b.clone())?;
            replaced += 1;
        }
        if replaced != loaded.weights.len() {
            return Err(AdapterError::PeftFormatError(format!(
                "adapter holds {} modules but the model has {replaced} adapted projections",
                loaded.weights.len()
            ))
            .into());
        }
        Ok(replaced)
    }
}
