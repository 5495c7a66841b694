//! LoRA (Low-Rank Adaptation) implementation
//!
//! LoRA enables parameter-efficient fine-tuning of large pretrained models
//! by adding trainable low-rank decomposition matrices to frozen weights.

mod adapter;
mod config;
mod layer;

pub use adapter::{
    load_peft, AdapterError, AdapterWeights, LoadedPeftAdapter, PeftAdapterBundle,
    PeftAdapterConfig, ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE,
};
pub use config::{LoRAConfig, LoraBias, LLAMA_PROJECTIONS};
pub use layer::LoRALayer;
