//! Configuration validation logic
//!
//! Validates fine-tuning specifications for correctness before execution.

use super::error::ValidationError;
use crate::config::schema::FinetuneSpec;
use crate::error::Error;

/// Validate the values of a fine-tuning specification
///
/// Checks:
/// - Numeric values are in valid ranges
/// - Enums match allowed values
/// - Trainer and generation settings are consistent
pub fn validate_config(spec: &FinetuneSpec) -> Result<(), ValidationError> {
    if spec.model.local_path.is_none() {
        let valid = spec
            .model
            .repo_id
            .split_once('/')
            .is_some_and(|(org, name)| !org.is_empty() && !name.is_empty() && !name.contains('/'));
        if !valid {
            return Err(ValidationError::InvalidRepoId(spec.model.repo_id.clone()));
        }
    }

    let data = &spec.data;
    if data.batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(data.batch_size));
    }
    if data.max_input_length == 0 {
        return Err(ValidationError::InvalidInputLength(data.max_input_length));
    }
    if data.max_gen_length == 0 {
        return Err(ValidationError::InvalidGenLength(data.max_gen_length));
    }

    let training = &spec.training;
    if !(training.lr > 0.0 && training.lr <= 1.0) {
        return Err(ValidationError::InvalidLearningRate(training.lr));
    }
    if !(training.weight_decay >= 0.0) {
        return Err(ValidationError::InvalidWeightDecay(training.weight_decay));
    }
    if let Some(scheduler) = &training.lr_scheduler {
        if scheduler != "cosine" {
            return Err(ValidationError::InvalidLRScheduler(scheduler.clone()));
        }
    }
    training.trainer.validate().map_err(|e| ValidationError::InvalidTrainer(detail(e)))?;

    let lora = &spec.lora;
    if lora.rank == 0 || lora.rank > 1024 {
        return Err(ValidationError::InvalidLoRARank(lora.rank));
    }
    if !(lora.alpha > 0.0) {
        return Err(ValidationError::InvalidLoRAAlpha(lora.alpha));
    }
    if !(0.0..1.0).contains(&lora.dropout) {
        return Err(ValidationError::InvalidLoRADropout(lora.dropout));
    }
    if lora.target_modules.is_empty() {
        return Err(ValidationError::EmptyLoRATargets);
    }

    let quant = &spec.quantization;
    if quant.load_in_4bit {
        if quant.quant_type != "nf4" {
            return Err(ValidationError::InvalidQuantType(quant.quant_type.clone()));
        }
        // Two codes share a byte
        if quant.blocksize == 0 || quant.blocksize % 2 != 0 {
            return Err(ValidationError::InvalidBlocksize(quant.blocksize));
        }
    }

    spec.generation_config()
        .validate()
        .map_err(|e| ValidationError::InvalidGeneration(detail(e)))?;

    Ok(())
}

/// Check that every configured file and directory exists
pub fn validate_paths(spec: &FinetuneSpec) -> Result<(), ValidationError> {
    if let Some(dir) = &spec.model.local_path {
        if !dir.is_dir() {
            return Err(ValidationError::ModelPathNotFound(dir.display().to_string()));
        }
    }
    if !spec.data.train.exists() {
        return Err(ValidationError::TrainDataNotFound(spec.data.train.display().to_string()));
    }
    if let Some(val) = spec.data.val.as_ref().filter(|p| !p.exists()) {
        return Err(ValidationError::ValDataNotFound(val.display().to_string()));
    }
    if let Some(test) = spec.data.test.as_ref().filter(|p| !p.exists()) {
        return Err(ValidationError::TestDataNotFound(test.display().to_string()));
    }
    Ok(())
}

fn detail(error: Error) -> String {
    match error {
        Error::ConfigError(msg) | Error::Generation(msg) => msg,
        other => other.to_string(),
    }
}
