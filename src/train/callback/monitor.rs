//! Tracking the best value of a monitored metric

use serde::{Deserialize, Serialize};

/// Whether lower or higher values are better
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    #[default]
    Min,
    Max,
}

/// Best-so-far tracker for one metric name
#[derive(Clone, Debug)]
pub struct Monitor {
    name: String,
    mode: MonitorMode,
    min_delta: f64,
    best: Option<f64>,
}

impl Monitor {
    pub fn new(name: impl Into<String>, mode: MonitorMode) -> Self {
        Self { name: name.into(), mode, min_delta: 0.0, best: None }
    }

    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta.abs();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Record `value`, returning whether it beats the best by more than `min_delta`
    pub fn update(&mut self, value: f64) -> bool {
        let improved = match (self.best, self.mode) {
            (None, _) => true,
            (Some(best), MonitorMode::Min) => value < best - self.min_delta,
            (Some(best), MonitorMode::Max) => value > best + self.min_delta,
        };
        if improved {
            self.best = Some(value);
        }
        improved
    }
}
