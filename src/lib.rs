//! QLoRA fine-tuning of Llama causal language models on numeric question answering.
//!
//! Each example is an `(input, answer)` pair whose answer carries a bracketed
//! number such as `<4.5>`. The base model is loaded with its decoder
//! projections quantized to NF4, LoRA adapters are trained with next-token
//! cross-entropy on the answer span, and validation generates answers and
//! scores them with mean absolute error.
//!
//! # Layout
//!
//! - [`autograd`]: reverse-mode tensors the model and adapters train through
//! - [`transformer`]: Llama decoder, safetensors loading, KV cache
//! - [`quant`]: NF4 and 8-bit blockwise quantization of frozen weights
//! - [`lora`]: adapters, injection and PEFT-compatible save/load
//! - [`optim`]: AdamW, gradient clipping and warmup-cosine schedule
//! - [`tokenizer`]: HuggingFace tokenizer with left padding
//! - [`generate`]: greedy, sampling and beam search decoding
//! - [`eval`]: answer extraction and MAE collection
//! - [`train`]: datasets, batches, trainer loop, callbacks and metric logging
//! - [`hub`]: HuggingFace Hub downloads
//! - [`finetune`]: the fine-tuning module and end-to-end runs
//! - [`config`] and [`cli`]: YAML experiments and the `afinar` command
//!
//! # Example
//!
//! ```no_run
//! use afinar::cli::LogLevel;
//! use afinar::config::load_config;
//! use afinar::finetune::run_finetune;
//!
//! let spec = load_config("finetune.yaml")?;
//! let outcome = run_finetune(&spec, LogLevel::Normal)?;
//! println!("best adapter: {:?}", outcome.best_adapter);
//! # Ok::<(), afinar::Error>(())
//! ```

pub mod autograd;
pub mod cli;
pub mod config;
pub mod error;
pub mod eval;
pub mod finetune;
pub mod generate;
pub mod hub;
pub mod lora;
pub mod optim;
pub mod quant;
pub mod tokenizer;
pub mod train;
pub mod transformer;

pub use autograd::Tensor;
pub use error::{Error, Result};
