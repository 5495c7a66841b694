//! Error types for afinar
//!
//! Every fallible library operation returns [`Result`]. Messages name the
//! offending file, field or step so the CLI can print them unchanged.

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading, training, generating or evaluating
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Filesystem error with the path that failed
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse failure
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parse or write failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// SafeTensors read or write failure
    #[error("SafeTensors error: {0}")]
    SafeTensors(String),

    /// HuggingFace Hub failure
    #[error("HuggingFace Hub error: {0}\n  → Check HF_TOKEN and network access")]
    Hub(String),

    /// Tokenizer load, encode or decode failure
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// A weight the architecture requires is absent from the checkpoint
    #[error("Missing weight: {0}")]
    MissingWeight(String),

    /// Tensor shape does not match what the layer expects
    #[error("Shape mismatch for {name}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Loss became NaN or infinite
    #[error("Non-finite loss at step {step}: {value}")]
    NonFiniteLoss { step: usize, value: f32 },

    /// Reference answer without a parseable `<number>`
    #[error("Label has no parseable <number>: {0:?}")]
    InvalidLabel(String),

    /// Invalid decoding parameters or decoding failure
    #[error("Generation error: {0}")]
    Generation(String),

    /// LoRA adapter save/load failure
    #[error(transparent)]
    Adapter(#[from] crate::lora::AdapterError),
}

impl Error {
    /// Attach a path to an IO error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = Error::io(
            "/tmp/missing.yaml",
            std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.yaml"));
        assert!(msg.contains("not found"));
    }

    #[test]
    fn test_non_finite_loss_message() {
        let err = Error::NonFiniteLoss { step: 7, value: f32::NAN };
        assert!(err.to_string().contains("step 7"));
    }
}
