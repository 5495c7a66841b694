//! Checkpoint callback that saves the module on its best validation score

use std::path::{Path, PathBuf};

use super::monitor::{Monitor, MonitorMode};
use super::traits::{CallbackAction, CallbackContext, TrainerCallback};
use crate::cli::logging::{log, LogLevel};
use crate::error::Result;
use crate::train::TrainingModule;

/// Saves `dir/best` whenever the monitored metric improves and `dir/last`
/// when training ends
pub struct ModelCheckpoint {
    dirpath: PathBuf,
    monitor: Monitor,
    save_last: bool,
    level: LogLevel,
    best_epoch: Option<usize>,
}

impl ModelCheckpoint {
    /// Monitor `metric` in min mode
    pub fn new(dirpath: impl Into<PathBuf>) -> Self {
        Self {
            dirpath: dirpath.into(),
            monitor: Monitor::new("metric", MonitorMode::Min),
            save_last: true,
            level: LogLevel::Normal,
            best_epoch: None,
        }
    }

    pub fn monitor(mut self, name: &str, mode: MonitorMode) -> Self {
        self.monitor = Monitor::new(name, mode);
        self
    }

    pub fn save_last(mut self, save: bool) -> Self {
        self.save_last = save;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn best_path(&self) -> PathBuf {
        self.dirpath.join("best")
    }

    pub fn last_path(&self) -> PathBuf {
        self.dirpath.join("last")
    }

    pub fn best_score(&self) -> Option<f64> {
        self.monitor.best()
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    fn save(&self, module: &dyn TrainingModule, path: &Path) -> Result<()> {
        module.save_checkpoint(path)?;
        log(self.level, LogLevel::Verbose, &format!("  Saved checkpoint to {}", path.display()));
        Ok(())
    }
}

impl TrainerCallback for ModelCheckpoint {
    fn on_validation_end(
        &mut self,
        ctx: &CallbackContext,
        module: &dyn TrainingModule,
    ) -> Result<CallbackAction> {
        if let Some(value) = ctx.metric(self.monitor.name()) {
            if self.monitor.update(value) {
                self.best_epoch = Some(ctx.epoch);
                self.save(module, &self.best_path())?;
                log(
                    self.level,
                    LogLevel::Normal,
                    &format!("  New best {} = {value:.4} at epoch {}", self.monitor.name(), ctx.epoch),
                );
            }
        }
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &CallbackContext, module: &dyn TrainingModule) -> Result<()> {
        if self.save_last {
            self.save(module, &self.last_path())?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ModelCheckpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::train::testing::RecordingModule;
    use tempfile::TempDir;

    fn ctx(epoch: usize, metric: f64) -> CallbackContext {
        let mut ctx = CallbackContext { epoch, ..Default::default() };
        ctx.metrics.insert("metric".into(), metric);
        ctx
    }

    #[test]
    fn test_saves_best_only_on_improvement() {
        let tmp = TempDir::new().unwrap();
        let module = RecordingModule::default();
        let mut cb = ModelCheckpoint::new(tmp.path()).with_log_level(LogLevel::Quiet);

        cb.on_validation_end(&ctx(0, 2.0), &module).unwrap();
        cb.on_validation_end(&ctx(1, 3.0), &module).unwrap();
        cb.on_validation_end(&ctx(2, 1.0), &module).unwrap();

        assert_eq!(module.saved(), vec![cb.best_path(), cb.best_path()]);
        assert_eq!(cb.best_score(), Some(1.0));
        assert_eq!(cb.best_epoch(), Some(2));
    }

    #[test]
    fn test_nan_metric_never_becomes_best() {
        let tmp = TempDir::new().unwrap();
        let module = RecordingModule::default();
        let mut cb = ModelCheckpoint::new(tmp.path()).with_log_level(LogLevel::Quiet);
        cb.on_validation_end(&ctx(0, f64::NAN), &module).unwrap();
        assert!(module.saved().is_empty());
        assert_eq!(cb.best_score(), None);
    }

    #[test]
    fn test_train_end_saves_last() {
        let tmp = TempDir::new().unwrap();
        let module = RecordingModule::default();
        let mut cb = ModelCheckpoint::new(tmp.path()).with_log_level(LogLevel::Quiet);
        cb.on_train_end(&CallbackContext::default(), &module).unwrap();
        assert_eq!(module.saved(), vec![tmp.path().join("last")]);

        let module = RecordingModule::default();
        let mut cb = ModelCheckpoint::new(tmp.path()).save_last(false);
        cb.on_train_end(&CallbackContext::default(), &module).unwrap();
        assert!(module.saved().is_empty());
    }
}
