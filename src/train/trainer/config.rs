//! Trainer configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Loop limits and optimization settings for [`Trainer`](super::Trainer)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Epoch limit; training also stops at `max_steps`
    pub max_epochs: Option<usize>,
    /// Optimizer-step limit
    pub max_steps: Option<usize>,
    /// Batches whose gradients are summed before each optimizer step
    pub accumulate_grad_batches: usize,
    /// Global gradient norm limit
    pub gradient_clip_val: Option<f32>,
    /// Validate every N optimizer steps instead of at epoch ends
    pub val_check_interval: Option<usize>,
    /// Validate at the end of every N-th epoch
    pub check_val_every_n_epoch: usize,
    /// Validation batches per run
    pub limit_val_batches: Option<usize>,
    /// Print the progress line every N optimizer steps
    pub log_every_n_steps: usize,
    /// Seed for the shuffling RNG
    pub seed: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_epochs: Some(1),
            max_steps: None,
            accumulate_grad_batches: 1,
            gradient_clip_val: None,
            val_check_interval: None,
            check_val_every_n_epoch: 1,
            limit_val_batches: None,
            log_every_n_steps: 50,
            seed: 42,
        }
    }
}

impl TrainerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_epochs.is_none() && self.max_steps.is_none() {
            return Err(Error::ConfigError("set max_epochs or max_steps".into()));
        }
        if self.max_epochs == Some(0) || self.max_steps == Some(0) {
            return Err(Error::ConfigError("max_epochs and max_steps must be positive".into()));
        }
        if self.accumulate_grad_batches == 0 {
            return Err(Error::ConfigError("accumulate_grad_batches must be at least 1".into()));
        }
        if self.check_val_every_n_epoch == 0 || self.val_check_interval == Some(0) {
            return Err(Error::ConfigError("validation intervals must be positive".into()));
        }
        if let Some(clip) = self.gradient_clip_val {
            if !(clip > 0.0) {
                return Err(Error::ConfigError(format!("gradient_clip_val must be positive, got {clip}")));
            }
        }
        Ok(())
    }

    /// Optimizer steps in one epoch of `num_batches` batches
    pub fn steps_per_epoch(&self, num_batches: usize) -> usize {
        num_batches.div_ceil(self.accumulate_grad_batches.max(1))
    }

    /// Planned optimizer steps: `max_steps` when set, else every epoch in full
    pub fn total_steps(&self, num_batches: usize) -> usize {
        match (self.max_steps, self.max_epochs) {
            (Some(steps), Some(epochs)) => steps.min(epochs * self.steps_per_epoch(num_batches)),
            (Some(steps), None) => steps,
            (None, Some(epochs)) => epochs * self.steps_per_epoch(num_batches),
            (None, None) => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_steps() {
        let config = TrainerConfig { max_epochs: Some(3), accumulate_grad_batches: 2, ..Default::default() };
        assert_eq!(config.steps_per_epoch(5), 3);
        assert_eq!(config.total_steps(5), 9);

        let config = TrainerConfig { max_epochs: None, max_steps: Some(7), ..Default::default() };
        assert_eq!(config.total_steps(100), 7);
        let config = TrainerConfig { max_epochs: Some(1), max_steps: Some(7), ..Default::default() };
        assert_eq!(config.total_steps(4), 4);
    }

    #[test]
    fn test_validate() {
        assert!(TrainerConfig::default().validate().is_ok());
        let bad = TrainerConfig { max_epochs: None, ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = TrainerConfig { accumulate_grad_batches: 0, ..Default::default() };
        assert!(bad.validate().is_err());
        let bad = TrainerConfig { gradient_clip_val: Some(-1.0), ..Default::default() };
        assert!(bad.validate().is_err());
    }
}
