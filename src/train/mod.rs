//! High-level training loop
//!
//! This module provides a Lightning-style training framework with:
//! - `(input, answer)` JSONL datasets and shuffling data loaders
//! - Causal-LM label construction over left-padded batches
//! - A [`TrainingModule`] trait for the model side of the loop
//! - A [`Trainer`] with gradient accumulation, clipping and validation scheduling
//! - Step and epoch metric logging to `metrics.jsonl`
//! - Checkpoint and early-stopping callbacks
//!
//! # Example
//!
//! ```no_run
//! use afinar::cli::logging::LogLevel;
//! use afinar::train::{DataLoader, JsonlDataset, MetricLogger, Trainer, TrainerConfig};
//!
//! # fn run(module: &mut dyn afinar::train::TrainingModule) -> afinar::Result<()> {
//! let train = DataLoader::new(JsonlDataset::from_file("train.jsonl")?, 8, true);
//! let val = DataLoader::new(JsonlDataset::from_file("val.jsonl")?, 8, false);
//! let logger = MetricLogger::new(LogLevel::Normal).with_output_dir("runs/demo")?;
//!
//! let mut trainer = Trainer::new(TrainerConfig::default(), logger)?;
//! let result = trainer.fit(module, &train, Some(&val))?;
//! println!("{} steps, final loss {:?}", result.global_step, result.final_loss);
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod callback;
mod data;
mod logger;
mod module;
mod trainer;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{build_labels, shift_targets, Batch, ShiftedTargets, IGNORE_INDEX};
pub use callback::{
    CallbackAction, CallbackContext, CallbackManager, EarlyStopping, ModelCheckpoint, MonitorMode,
    TrainerCallback,
};
pub use data::{DataLoader, Example, JsonlDataset};
pub use logger::{LogOptions, MetricLogger, Stage};
pub use module::{Optimizers, StepContext, TrainingModule};
pub use trainer::{TrainResult, Trainer, TrainerConfig};
