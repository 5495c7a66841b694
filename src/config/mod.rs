//! Declarative configuration
//!
//! A fine-tuning run is described by one YAML file with `model`,
//! `quantization`, `lora`, `data`, `training` and `generation` sections.
//!
//! ```yaml
//! model:
//!   repo_id: meta-llama/Llama-3.2-1B-Instruct
//! data:
//!   train: data/train.jsonl
//!   val: data/val.jsonl
//!   batch_size: 8
//! training:
//!   lr: 0.0001
//!   lr_scheduler: cosine
//!   max_steps: 2000
//! ```

mod cli;
mod loader;
mod schema;
mod validate;

pub use cli::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TestArgs, TrainArgs,
    ValidateArgs,
};
pub use loader::load_config;
pub use schema::{DataSpec, FinetuneSpec, ModelSpec, QuantSpec, TrainingSpec};
pub use validate::{validate_config, validate_paths, ValidationError};
