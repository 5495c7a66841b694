//! Core traits and types for the callback system
//!
//! This module provides the foundational types for training callbacks:
//! - `CallbackContext` - State passed to callbacks
//! - `CallbackAction` - Actions a callback can request
//! - `TrainerCallback` - The trait all callbacks implement

use crate::error::Result;
use crate::train::TrainingModule;
use std::collections::BTreeMap;

/// Context passed to callbacks with current training state
#[derive(Clone, Debug, Default)]
pub struct CallbackContext {
    /// Current epoch (0-indexed)
    pub epoch: usize,
    /// Optimizer steps taken so far
    pub global_step: usize,
    /// Optimizer steps planned for the run
    pub max_steps: usize,
    /// Latest logged step values and epoch means
    pub metrics: BTreeMap<String, f64>,
    /// Training duration in seconds
    pub elapsed_secs: f64,
}

impl CallbackContext {
    /// A finite logged value
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().filter(|v| v.is_finite())
    }
}

/// Action to take after a callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackAction {
    /// Continue training normally
    Continue,
    /// Stop training (early stopping)
    Stop,
}

/// Trait for training callbacks
///
/// All methods have default no-op implementations. Hooks that may write
/// checkpoints receive the module being trained.
pub trait TrainerCallback {
    /// Called before training starts
    fn on_train_begin(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called after training ends
    fn on_train_end(&mut self, _ctx: &CallbackContext, _module: &dyn TrainingModule) -> Result<()> {
        Ok(())
    }

    /// Called after each training epoch
    fn on_train_epoch_end(&mut self, _ctx: &CallbackContext) -> CallbackAction {
        CallbackAction::Continue
    }

    /// Called once validation metrics are reduced
    fn on_validation_end(
        &mut self,
        _ctx: &CallbackContext,
        _module: &dyn TrainingModule,
    ) -> Result<CallbackAction> {
        Ok(CallbackAction::Continue)
    }

    /// Get callback name for logging
    fn name(&self) -> &'static str {
        "TrainerCallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_ignores_non_finite() {
        let mut ctx = CallbackContext::default();
        ctx.metrics.insert("metric".into(), f64::NAN);
        ctx.metrics.insert("loss_epoch".into(), 0.5);
        assert_eq!(ctx.metric("metric"), None);
        assert_eq!(ctx.metric("loss_epoch"), Some(0.5));
        assert_eq!(ctx.metric("missing"), None);
    }

    #[test]
    fn test_default_trainer_callback_impl() {
        struct MinimalCallback;
        impl TrainerCallback for MinimalCallback {}

        let mut cb = MinimalCallback;
        let ctx = CallbackContext::default();
        assert_eq!(cb.on_train_begin(&ctx), CallbackAction::Continue);
        assert_eq!(cb.on_train_epoch_end(&ctx), CallbackAction::Continue);
        assert_eq!(cb.name(), "TrainerCallback");
    }
}
