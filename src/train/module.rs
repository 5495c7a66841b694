//! The model-side half of the training loop

use super::batch::Batch;
use super::logger::{LogOptions, MetricLogger};
use crate::error::Result;
use crate::optim::{LRScheduler, Optimizer};
use crate::Tensor;
use std::path::Path;

/// Optimizer plus an optional schedule stepped by the module
pub struct Optimizers {
    pub optimizer: Box<dyn Optimizer>,
    pub scheduler: Option<Box<dyn LRScheduler>>,
}

impl Optimizers {
    pub fn new(optimizer: Box<dyn Optimizer>) -> Self {
        Self { optimizer, scheduler: None }
    }

    pub fn with_scheduler(mut self, scheduler: Box<dyn LRScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }
}

/// Trainer state handed to `training_step`
pub struct StepContext<'a> {
    pub global_step: usize,
    pub epoch: usize,
    pub max_steps: usize,
    pub(crate) optimizers: &'a mut Optimizers,
    pub(crate) logger: &'a mut MetricLogger,
}

impl<'a> StepContext<'a> {
    pub fn new(
        global_step: usize,
        epoch: usize,
        max_steps: usize,
        optimizers: &'a mut Optimizers,
        logger: &'a mut MetricLogger,
    ) -> Self {
        Self { global_step, epoch, max_steps, optimizers, logger }
    }

    /// Advance the schedule to the current step and apply its rate
    ///
    /// Without a scheduler the optimizer's rate is returned unchanged.
    pub fn step_scheduler(&mut self) -> f32 {
        if let Some(scheduler) = self.optimizers.scheduler.as_mut() {
            let lr = scheduler.step(self.global_step, self.epoch, self.max_steps);
            self.optimizers.optimizer.set_lr(lr);
        }
        self.optimizers.optimizer.lr()
    }

    pub fn lr(&self) -> f32 {
        self.optimizers.optimizer.lr()
    }

    pub fn log(&mut self, name: &str, value: f64, options: LogOptions) -> Result<()> {
        self.logger.log(name, value, options)
    }
}

/// Hooks the [`Trainer`](super::Trainer) calls on a model
pub trait TrainingModule {
    /// Build the optimizer for a run of `max_steps` optimizer steps
    fn configure_optimizers(&mut self, max_steps: usize) -> Result<Optimizers>;

    /// Loss of one batch; the trainer runs backward and the optimizer
    fn training_step(
        &mut self,
        batch: &Batch,
        batch_idx: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<Tensor>;

    fn on_validation_epoch_start(&mut self) {}

    fn validation_step(
        &mut self,
        batch: &Batch,
        batch_idx: usize,
        logger: &mut MetricLogger,
    ) -> Result<()>;

    fn on_validation_epoch_end(&mut self, _logger: &mut MetricLogger) -> Result<()> {
        Ok(())
    }

    fn on_test_epoch_start(&mut self) {}

    fn test_step(&mut self, batch: &Batch, batch_idx: usize, logger: &mut MetricLogger)
        -> Result<()>;

    fn on_test_epoch_end(&mut self, _logger: &mut MetricLogger) -> Result<()> {
        Ok(())
    }

    /// Tensors updated by the optimizer
    fn trainable_parameters_mut(&mut self) -> Vec<&mut Tensor>;

    /// Persist whatever is needed to restore the trained state
    fn save_checkpoint(&self, dir: &Path) -> Result<()>;
}
