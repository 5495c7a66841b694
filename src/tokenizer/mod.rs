//! Tokenization for fine-tuning batches
//!
//! Wraps a HuggingFace `tokenizer.json` so prompts and answers can be
//! encoded as left-padded pairs with token type ids.

mod hf;

pub use hf::{EncodedBatch, HfTokenizer};

#[cfg(test)]
pub(crate) use hf::word_level_json;
