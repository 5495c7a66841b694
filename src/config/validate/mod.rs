//! Configuration validation
//!
//! Validates fine-tuning specifications for correctness before execution.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{validate_config, validate_paths};
