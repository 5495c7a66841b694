//! Trainer abstraction for training loops
//!
//! This module provides a high-level `Trainer` that orchestrates:
//! - Training steps with gradient accumulation and clipping
//! - Epoch and step limits
//! - Step- or epoch-based validation
//! - Test runs
//! - Callbacks

mod config;
mod core;
mod result;

pub use config::TrainerConfig;
pub use core::Trainer;
pub use result::TrainResult;
