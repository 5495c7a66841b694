//! Llama-family causal language model over the autograd engine
//!
//! The decoder runs on flat row-major tensors. Frozen projections can be held
//! in NF4 and carry optional LoRA adapters; only the adapters take gradients.
//!
//! ## Components
//!
//! - `LlamaConfig`: HuggingFace `config.json`
//! - `WeightStore`: SafeTensors checkpoint access (single file or sharded)
//! - `Linear`: frozen projection with an optional `LoRALayer`
//! - `DecoderLayer`: attention + SwiGLU MLP with pre-norm residuals
//! - `KvCache`: per-layer key/value cache for incremental decoding
//! - `LlamaForCausalLM`: the full model
//!
//! ## Example
//!
//! ```ignore
//! use afinar::transformer::{find_safetensors_files, LlamaConfig, LlamaForCausalLM, WeightStore};
//!
//! let config = LlamaConfig::from_file(dir.join("config.json"))?;
//! let store = WeightStore::open(&find_safetensors_files(dir)?)?;
//! let model = LlamaForCausalLM::from_weights(config, &store, Some(Nf4Config::default()))?;
//! ```

mod attention;
mod block;
mod cache;
mod config;
mod embedding;
mod feedforward;
mod linear;
mod model;
mod norm;
mod rope;
mod weights;

pub use attention::{AttentionInput, SelfAttention};
pub use block::DecoderLayer;
pub use cache::{KvCache, LayerCache};
pub use config::{LlamaConfig, RopeScaling, TokenIds};
pub use embedding::Embedding;
pub use feedforward::Mlp;
pub use linear::{frozen_linear, FrozenWeight, Linear};
pub use model::{position_ids, LlamaForCausalLM, ParameterCounts};
pub use norm::RmsNorm;
pub use rope::RotaryEmbedding;
pub use weights::{find_safetensors_files, shard_names, WeightStore, INDEX_FILE, SINGLE_FILE};

pub(crate) use weights::tensor_to_f32_vec;
#[cfg(test)]
pub(crate) use weights::{tiny_checkpoint, tiny_store};
