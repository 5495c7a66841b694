//! LoRA adapter serialization and deserialization
//!
//! Adapters are saved independently of the base model in the PEFT layout
//! (`adapter_config.json` + `adapter_model.safetensors`), so they load in the
//! HuggingFace ecosystem and back into this crate.

mod error;
pub(crate) mod peft_config;
pub(crate) mod peft_export;

pub use error::AdapterError;
pub use peft_config::PeftAdapterConfig;
pub use peft_export::{
    load_peft, AdapterWeights, LoadedPeftAdapter, PeftAdapterBundle, ADAPTER_CONFIG_FILE,
    ADAPTER_WEIGHTS_FILE,
};
