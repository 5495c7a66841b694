//! Callback manager for dispatching events to multiple callbacks

use super::traits::{CallbackAction, CallbackContext, TrainerCallback};
use crate::error::Result;
use crate::train::TrainingModule;

/// Manages multiple callbacks and dispatches events
#[derive(Default)]
pub struct CallbackManager {
    callbacks: Vec<Box<dyn TrainerCallback>>,
}

impl CallbackManager {
    /// Create new callback manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a callback
    pub fn add<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.push(Box::new(callback));
    }

    /// Check if no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Get number of callbacks
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.callbacks.iter().map(|cb| cb.name()).collect()
    }

    /// Fire train begin event
    pub fn on_train_begin(&mut self, ctx: &CallbackContext) -> CallbackAction {
        for cb in &mut self.callbacks {
            if cb.on_train_begin(ctx) == CallbackAction::Stop {
                return CallbackAction::Stop;
            }
        }
        CallbackAction::Continue
    }

    /// Fire train end event on every callback
    pub fn on_train_end(&mut self, ctx: &CallbackContext, module: &dyn TrainingModule) -> Result<()> {
        for cb in &mut self.callbacks {
            cb.on_train_end(ctx, module)?;
        }
        Ok(())
    }

    /// Fire epoch end event
    pub fn on_train_epoch_end(&mut self, ctx: &CallbackContext) -> CallbackAction {
        let mut action = CallbackAction::Continue;
        for cb in &mut self.callbacks {
            if cb.on_train_epoch_end(ctx) == CallbackAction::Stop {
                action = CallbackAction::Stop;
            }
        }
        action
    }

    /// Fire validation end event
    ///
    /// Every callback sees the event, so a checkpoint is still written on the
    /// validation that triggers a stop.
    pub fn on_validation_end(
        &mut self,
        ctx: &CallbackContext,
        module: &dyn TrainingModule,
    ) -> Result<CallbackAction> {
        let mut action = CallbackAction::Continue;
        for cb in &mut self.callbacks {
            if cb.on_validation_end(ctx, module)? == CallbackAction::Stop {
                action = CallbackAction::Stop;
            }
        }
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::logging::LogLevel;
    use crate::train::callback::{EarlyStopping, ModelCheckpoint, MonitorMode};
    use crate::train::testing::RecordingModule;
    use tempfile::TempDir;

    #[test]
    fn test_stop_still_reaches_later_callbacks() {
        let tmp = TempDir::new().unwrap();
        let mut manager = CallbackManager::new();
        manager.add(EarlyStopping::new("metric", MonitorMode::Min, 1).with_log_level(LogLevel::Quiet));
        manager.add(ModelCheckpoint::new(tmp.path()).with_log_level(LogLevel::Quiet));
        assert_eq!(manager.names(), vec!["EarlyStopping", "ModelCheckpoint"]);

        let module = RecordingModule::default();
        let mut ctx = CallbackContext::default();
        ctx.metrics.insert("metric".into(), 1.0);
        assert_eq!(manager.on_validation_end(&ctx, &module).unwrap(), CallbackAction::Continue);
        ctx.metrics.insert("metric".into(), 1.0);
        assert_eq!(manager.on_validation_end(&ctx, &module).unwrap(), CallbackAction::Stop);
        assert_eq!(module.saved().len(), 1);
    }

    #[test]
    fn test_empty_manager() {
        let manager = CallbackManager::default();
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }
}
