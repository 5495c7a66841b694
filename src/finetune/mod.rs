//! QLoRA fine-tuning for numeric-answer tasks
//!
//! Trains LoRA adapters on a 4-bit Llama so that, given an `input` prompt,
//! the model continues with an answer such as `<42>`.
//!
//! # Pipeline
//!
//! ```text
//! load:     hub -> tokenizer + LlamaForCausalLM (NF4) -> LoRA on q/k/v/o/gate/up/down
//! train:    (input, answer) pair -> labels masked to answer tokens -> shifted CE loss
//! validate: input -> generate -> last <x> in the text vs first <y> in the answer -> MAE
//! ```
//!
//! # References
//!
//! - Hu et al. (2021) "LoRA: Low-Rank Adaptation of Large Language Models"
//! - Dettmers et al. (2023) "QLoRA: Efficient Finetuning of Quantized LLMs"

mod loader;
mod module;
mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use loader::{load_llm, resolve_artifact, LoadSpec, LoadedLlm};
pub use module::{FineTuneModule, FineTuneSettings};
pub use pipeline::{run_finetune, run_test, FinetuneOutcome, MONITOR};
