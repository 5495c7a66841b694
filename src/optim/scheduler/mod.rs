//! Learning rate schedulers

mod linear_warmup_cosine;

pub use linear_warmup_cosine::LinearWarmupCosineLR;

/// Learning rate scheduler driven by the training loop's step counter
pub trait LRScheduler {
    /// Compute the learning rate for `cur_step` and return it
    fn step(&mut self, cur_step: usize, cur_epoch: usize, max_steps: usize) -> f32;

    /// Learning rate computed by the last `step`
    fn get_lr(&self) -> f32;
}
