//! Validation error types
//!
//! Defines all validation error variants for fine-tuning specifications.

/// Validation error type
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Model directory does not exist: {0}")]
    ModelPathNotFound(String),

    #[error("Invalid repository id: {0} (expected 'org/name')")]
    InvalidRepoId(String),

    #[error("Training data path does not exist: {0}")]
    TrainDataNotFound(String),

    #[error("Validation data path does not exist: {0}")]
    ValDataNotFound(String),

    #[error("Test data path does not exist: {0}")]
    TestDataNotFound(String),

    #[error("Invalid learning rate: {0} (must be > 0.0 and <= 1.0)")]
    InvalidLearningRate(f32),

    #[error("Invalid weight decay: {0} (must be >= 0.0)")]
    InvalidWeightDecay(f32),

    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid max_input_length: {0} (must be > 0)")]
    InvalidInputLength(usize),

    #[error("Invalid max_gen_length: {0} (must be > 0)")]
    InvalidGenLength(usize),

    #[error("Invalid LoRA rank: {0} (must be > 0 and <= 1024)")]
    InvalidLoRARank(usize),

    #[error("Invalid LoRA alpha: {0} (must be > 0.0)")]
    InvalidLoRAAlpha(f32),

    #[error("Invalid LoRA dropout: {0} (must be in [0.0, 1.0))")]
    InvalidLoRADropout(f32),

    #[error("LoRA target modules cannot be empty")]
    EmptyLoRATargets,

    #[error("Invalid quant_type: {0} (must be nf4)")]
    InvalidQuantType(String),

    #[error("Invalid quantization blocksize: {0} (must be a positive multiple of 2)")]
    InvalidBlocksize(usize),

    #[error("Invalid LR scheduler: {0} (must be cosine or unset)")]
    InvalidLRScheduler(String),

    #[error("Invalid trainer settings: {0}")]
    InvalidTrainer(String),

    #[error("Invalid generation settings: {0}")]
    InvalidGeneration(String),
}
