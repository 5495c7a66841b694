//! Linear warmup followed by cosine decay over the whole run

use super::LRScheduler;
use std::f32::consts::PI;

/// Linear warmup + cosine learning rate schedule
///
/// - `cur_step < warmup_steps`: `min(init, ws + (init - ws) · cur_step / max(warmup_steps, 1))`
/// - otherwise: `(init - min) · 0.5 · (1 + cos(π · cur_step / max_step)) + min`
///
/// The cosine phase is measured from step 0, not from the end of warmup.
#[derive(Debug, Clone)]
pub struct LinearWarmupCosineLR {
    max_step: usize,
    min_lr: f32,
    init_lr: f32,
    warmup_steps: usize,
    warmup_start_lr: f32,
    current_lr: f32,
}

impl LinearWarmupCosineLR {
    /// A negative `warmup_start_lr` means "start at `init_lr`"
    pub fn new(
        max_step: usize,
        min_lr: f32,
        init_lr: f32,
        warmup_steps: usize,
        warmup_start_lr: f32,
    ) -> Self {
        let warmup_start_lr = if warmup_start_lr >= 0.0 { warmup_start_lr } else { init_lr };
        Self { max_step, min_lr, init_lr, warmup_steps, warmup_start_lr, current_lr: init_lr }
    }

    /// Warmup length used for a run of `max_steps` optimizer steps
    pub fn warmup_steps_for(max_steps: usize) -> usize {
        max_steps / 20
    }

    pub fn warmup_steps(&self) -> usize {
        self.warmup_steps
    }

    fn lr_at(&self, cur_step: usize, max_step: usize) -> f32 {
        if cur_step < self.warmup_steps {
            let progress = cur_step as f32 / self.warmup_steps.max(1) as f32;
            let lr = self.warmup_start_lr + (self.init_lr - self.warmup_start_lr) * progress;
            lr.min(self.init_lr)
        } else {
            let progress = cur_step as f32 / max_step.max(1) as f32;
            (self.init_lr - self.min_lr) * 0.5 * (1.0 + (PI * progress).cos()) + self.min_lr
        }
    }
}

impl LRScheduler for LinearWarmupCosineLR {
    fn step(&mut self, cur_step: usize, _cur_epoch: usize, max_steps: usize) -> f32 {
        let max_step = if max_steps > 0 { max_steps } else { self.max_step };
        self.current_lr = self.lr_at(cur_step, max_step);
        self.current_lr
    }

    fn get_lr(&self) -> f32 {
        self.current_lr
    }
}
