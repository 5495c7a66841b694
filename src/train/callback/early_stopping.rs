//! Early stopping callback to halt training when the monitored metric plateaus

use super::monitor::{Monitor, MonitorMode};
use super::traits::{CallbackAction, CallbackContext, TrainerCallback};
use crate::cli::logging::{log, LogLevel};
use crate::error::Result;
use crate::train::TrainingModule;

/// Stops training after `patience` validations without improvement
///
/// # Example
///
/// ```rust
/// use afinar::train::callback::{EarlyStopping, MonitorMode};
///
/// // Stop if `metric` does not drop by 0.01 for 3 validations
/// let early_stop = EarlyStopping::new("metric", MonitorMode::Min, 3).with_min_delta(0.01);
/// ```
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    monitor: Monitor,
    /// Validations to wait for improvement
    patience: usize,
    /// Validations without improvement
    pub(crate) wait: usize,
    level: LogLevel,
}

impl EarlyStopping {
    pub fn new(metric: &str, mode: MonitorMode, patience: usize) -> Self {
        Self { monitor: Monitor::new(metric, mode), patience, wait: 0, level: LogLevel::Normal }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.monitor = self.monitor.with_min_delta(min_delta);
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }
}

impl TrainerCallback for EarlyStopping {
    fn on_validation_end(
        &mut self,
        ctx: &CallbackContext,
        _module: &dyn TrainingModule,
    ) -> Result<CallbackAction> {
        // Missing or NaN values count as no improvement
        let improved = ctx.metric(self.monitor.name()).is_some_and(|v| self.monitor.update(v));
        if improved {
            self.wait = 0;
            return Ok(CallbackAction::Continue);
        }

        self.wait += 1;
        if self.wait >= self.patience {
            log(
                self.level,
                LogLevel::Normal,
                &format!(
                    "Early stopping: no improvement in {} for {} validations (best: {:?})",
                    self.monitor.name(),
                    self.patience,
                    self.monitor.best()
                ),
            );
            Ok(CallbackAction::Stop)
        } else {
            Ok(CallbackAction::Continue)
        }
    }

    fn name(&self) -> &'static str {
        "EarlyStopping"
    }
}
