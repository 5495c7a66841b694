//! Small [`TrainingModule`] used by the trainer and callback tests

use super::batch::Batch;
use super::logger::{LogOptions, MetricLogger};
use super::module::{Optimizers, StepContext, TrainingModule};
use crate::autograd::{add, mul, sum};
use crate::error::Result;
use crate::optim::{AdamW, LinearWarmupCosineLR};
use crate::Tensor;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

/// Fits one scalar `w` to `target` with loss `(w - target)²`
///
/// Validation logs `metric = |w - target|`; every checkpoint path and hook
/// call is recorded.
pub(crate) struct RecordingModule {
    pub param: Tensor,
    pub target: f32,
    pub lr: f32,
    pub use_scheduler: bool,
    /// Return a NaN loss from this training step
    pub nan_at: Option<usize>,
    pub events: Vec<String>,
    pub max_steps_seen: Option<usize>,
    pub(crate) saved: RefCell<Vec<PathBuf>>,
}

impl Default for RecordingModule {
    fn default() -> Self {
        Self {
            param: Tensor::from_vec(vec![0.0], true),
            target: 3.0,
            lr: 0.1,
            use_scheduler: false,
            nan_at: None,
            events: Vec::new(),
            max_steps_seen: None,
            saved: RefCell::new(Vec::new()),
        }
    }
}

impl RecordingModule {
    pub fn saved(&self) -> Vec<PathBuf> {
        self.saved.borrow().clone()
    }

    pub fn value(&self) -> f32 {
        self.param.as_slice()[0]
    }

    fn distance(&self) -> f64 {
        f64::from((self.value() - self.target).abs())
    }
}

impl TrainingModule for RecordingModule {
    fn configure_optimizers(&mut self, max_steps: usize) -> Result<Optimizers> {
        self.max_steps_seen = Some(max_steps);
        let optimizers = Optimizers::new(Box::new(AdamW::with_weight_decay(self.lr, 0.0)));
        Ok(if self.use_scheduler {
            let warmup = LinearWarmupCosineLR::warmup_steps_for(max_steps);
            optimizers.with_scheduler(Box::new(LinearWarmupCosineLR::new(max_steps, 0.0, self.lr, warmup, -1.0)))
        } else {
            optimizers
        })
    }

    fn training_step(&mut self, batch: &Batch, _batch_idx: usize, ctx: &mut StepContext<'_>) -> Result<Tensor> {
        let lr = ctx.step_scheduler();
        self.events.push(format!("train:{}", ctx.global_step));
        let offset = Tensor::from_vec(vec![-self.target], false);
        let diff = add(&self.param, &offset);
        let mut loss = sum(&mul(&diff, &diff));
        if self.nan_at == Some(ctx.global_step) {
            loss = Tensor::from_vec(vec![f32::NAN], true);
        }
        let options = LogOptions::step_and_epoch(batch.size());
        ctx.log("loss", f64::from(loss.as_slice()[0]), options)?;
        ctx.log("lr", f64::from(lr), options)?;
        Ok(loss)
    }

    fn on_validation_epoch_start(&mut self) {
        self.events.push("val_start".into());
    }

    fn validation_step(&mut self, batch: &Batch, _batch_idx: usize, logger: &mut MetricLogger) -> Result<()> {
        self.events.push("val_step".into());
        logger.log("metric", self.distance(), LogOptions { batch_size: batch.size(), ..LogOptions::epoch_prog_bar() })
    }

    fn on_validation_epoch_end(&mut self, _logger: &mut MetricLogger) -> Result<()> {
        self.events.push("val_end".into());
        Ok(())
    }

    fn test_step(&mut self, batch: &Batch, _batch_idx: usize, logger: &mut MetricLogger) -> Result<()> {
        self.events.push("test_step".into());
        logger.log("metric", self.distance(), LogOptions { batch_size: batch.size(), ..LogOptions::epoch_prog_bar() })
    }

    fn trainable_parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.param]
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        self.saved.borrow_mut().push(dir.to_path_buf());
        Ok(())
    }
}
