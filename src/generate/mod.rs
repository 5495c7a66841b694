//! Text generation for evaluation
//!
//! Decoding runs on any [`CausalLm`]; [`crate::transformer::LlamaForCausalLM`]
//! implements it on top of its key/value cache.

mod config;
mod processors;
mod search;

pub use config::{DecodingMode, GenerationConfig, GenerationDefaults, StopTokens};
pub use processors::{apply_min_new_tokens, apply_repetition_penalty};
pub use search::{generate, CausalLm};
