//! Training result types

use std::collections::BTreeMap;

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainResult {
    /// Epochs started
    pub epochs: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    /// Loss of the last training batch
    pub final_loss: Option<f32>,
    /// Whether a callback stopped training
    pub stopped_early: bool,
    /// Latest logged values
    pub metrics: BTreeMap<String, f64>,
    /// Total training time in seconds
    pub elapsed_secs: f64,
}
