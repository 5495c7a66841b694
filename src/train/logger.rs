//! Step and epoch metric logging
//!
//! Values logged with `on_epoch` are averaged over the epoch weighted by
//! batch size. With both `on_step` and `on_epoch`, the step value is stored as
//! `{name}_step` and the epoch mean as `{name}_epoch`; otherwise the plain name
//! is used.

use crate::cli::logging::{log, LogLevel};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Loop that produced a metric
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Train,
    Val,
    Test,
}

/// How a logged value is aggregated and shown
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogOptions {
    pub on_step: bool,
    pub on_epoch: bool,
    pub prog_bar: bool,
    pub batch_size: usize,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { on_step: false, on_epoch: true, prog_bar: false, batch_size: 1 }
    }
}

impl LogOptions {
    /// Logged every step and averaged per epoch, shown in the progress line
    pub fn step_and_epoch(batch_size: usize) -> Self {
        Self { on_step: true, on_epoch: true, prog_bar: true, batch_size }
    }

    /// Epoch-level value shown in the progress line
    pub fn epoch_prog_bar() -> Self {
        Self { prog_bar: true, ..Self::default() }
    }
}

#[derive(Serialize)]
struct MetricRecord<'a> {
    stage: Stage,
    epoch: usize,
    global_step: usize,
    name: &'a str,
    value: f64,
}

/// Collects logged values, writes `metrics.jsonl` and prints progress
pub struct MetricLogger {
    level: LogLevel,
    path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
    stage: Stage,
    epoch: usize,
    global_step: usize,
    /// `(sum of value·weight, sum of weight)` per stage and name
    epoch_sums: BTreeMap<(Stage, String), (f64, f64)>,
    /// Latest step values and epoch means, read by callbacks
    callback_metrics: BTreeMap<String, f64>,
    prog_bar: BTreeSet<String>,
}

impl MetricLogger {
    /// Logger that only prints
    pub fn new(level: LogLevel) -> Self {
        Self {
            level,
            path: None,
            writer: None,
            stage: Stage::Train,
            epoch: 0,
            global_step: 0,
            epoch_sums: BTreeMap::new(),
            callback_metrics: BTreeMap::new(),
            prog_bar: BTreeSet::new(),
        }
    }

    /// Also append every record to `dir/metrics.jsonl`
    pub fn with_output_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = dir.join("metrics.jsonl");
        let file = File::create(&path).map_err(|e| Error::io(&path, e))?;
        self.writer = Some(BufWriter::new(file));
        self.path = Some(path);
        Ok(self)
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn metrics_path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Position used to tag subsequent records
    pub fn set_position(&mut self, stage: Stage, epoch: usize, global_step: usize) {
        self.stage = stage;
        self.epoch = epoch;
        self.global_step = global_step;
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn log(&mut self, name: &str, value: f64, options: LogOptions) -> Result<()> {
        let both = options.on_step && options.on_epoch;
        if options.on_step {
            let key = if both { format!("{name}_step") } else { name.to_string() };
            self.write_record(&key, value)?;
            if options.prog_bar {
                self.prog_bar.insert(key.clone());
            }
            self.callback_metrics.insert(key, value);
        }
        if options.on_epoch {
            let key = if both { format!("{name}_epoch") } else { name.to_string() };
            let weight = options.batch_size.max(1) as f64;
            let entry = self.epoch_sums.entry((self.stage, key.clone())).or_insert((0.0, 0.0));
            entry.0 += value * weight;
            entry.1 += weight;
            if options.prog_bar {
                self.prog_bar.insert(key);
            }
        }
        Ok(())
    }

    /// Reduce the epoch values of `stage` to weighted means and record them
    pub fn end_epoch(&mut self, stage: Stage) -> Result<BTreeMap<String, f64>> {
        let keys: Vec<(Stage, String)> =
            self.epoch_sums.keys().filter(|(s, _)| *s == stage).cloned().collect();
        let saved_stage = std::mem::replace(&mut self.stage, stage);
        let mut means = BTreeMap::new();
        for key in keys {
            if let Some((sum, weight)) = self.epoch_sums.remove(&key) {
                let mean = if weight > 0.0 { sum / weight } else { f64::NAN };
                self.write_record(&key.1, mean)?;
                self.callback_metrics.insert(key.1.clone(), mean);
                means.insert(key.1, mean);
            }
        }
        self.stage = saved_stage;
        self.flush()?;
        Ok(means)
    }

    /// Latest value of a step metric or epoch mean
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.callback_metrics.get(name).copied()
    }

    pub fn callback_metrics(&self) -> &BTreeMap<String, f64> {
        &self.callback_metrics
    }

    /// `epoch 0 step 12 | loss_step 1.2345 | lr 1.000e-4`
    pub fn progress_line(&self) -> String {
        let mut line = format!("epoch {} step {}", self.epoch, self.global_step);
        for name in &self.prog_bar {
            if let Some(value) = self.callback_metrics.get(name) {
                if value.abs() < 1e-3 && *value != 0.0 {
                    line.push_str(&format!(" | {name} {value:.3e}"));
                } else {
                    line.push_str(&format!(" | {name} {value:.4}"));
                }
            }
        }
        line
    }

    pub fn print_progress(&self) {
        log(self.level, LogLevel::Normal, &self.progress_line());
    }

    pub fn flush(&mut self) -> Result<()> {
        if let (Some(writer), Some(path)) = (self.writer.as_mut(), self.path.as_ref()) {
            writer.flush().map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }

    fn write_record(&mut self, name: &str, value: f64) -> Result<()> {
        let (Some(writer), Some(path)) = (self.writer.as_mut(), self.path.as_ref()) else {
            return Ok(());
        };
        let record = MetricRecord {
            stage: self.stage,
            epoch: self.epoch,
            global_step: self.global_step,
            name,
            value,
        };
        serde_json::to_writer(&mut *writer, &record)?;
        writer.write_all(b"\n").map_err(|e| Error::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use tempfile::TempDir;

    #[test]
    fn test_epoch_mean_is_weighted_by_batch_size() {
        let mut logger = MetricLogger::new(LogLevel::Quiet);
        logger.log("loss", 1.0, LogOptions::step_and_epoch(3)).unwrap();
        logger.log("loss", 3.0, LogOptions::step_and_epoch(1)).unwrap();
        assert_eq!(logger.metric("loss_step"), Some(3.0));

        let means = logger.end_epoch(Stage::Train).unwrap();
        assert_abs_diff_eq!(means["loss_epoch"], 1.5);
        assert_abs_diff_eq!(logger.metric("loss_epoch").unwrap(), 1.5);
    }

    #[test]
    fn test_stages_reduce_independently() {
        let mut logger = MetricLogger::new(LogLevel::Quiet);
        logger.log("loss", 2.0, LogOptions::step_and_epoch(1)).unwrap();
        logger.set_position(Stage::Val, 0, 1);
        logger.log("metric", 0.5, LogOptions::epoch_prog_bar()).unwrap();

        let val = logger.end_epoch(Stage::Val).unwrap();
        assert_eq!(val.keys().collect::<Vec<_>>(), vec!["metric"]);
        let train = logger.end_epoch(Stage::Train).unwrap();
        assert_eq!(train.keys().collect::<Vec<_>>(), vec!["loss_epoch"]);
    }

    #[test]
    fn test_progress_line_shows_prog_bar_metrics() {
        let mut logger = MetricLogger::new(LogLevel::Quiet);
        logger.set_position(Stage::Train, 1, 20);
        logger.log("loss", 0.25, LogOptions::step_and_epoch(2)).unwrap();
        logger.log("lr", 1e-4, LogOptions::step_and_epoch(2)).unwrap();
        logger.log("hidden", 9.0, LogOptions { on_step: true, on_epoch: false, ..Default::default() }).unwrap();
        let line = logger.progress_line();
        assert!(line.starts_with("epoch 1 step 20"));
        assert!(line.contains("loss_step 0.2500"));
        assert!(line.contains("lr_step 1.000e-4"));
        assert!(!line.contains("hidden"));
    }

    #[test]
    fn test_records_written_as_jsonl() {
        let tmp = TempDir::new().unwrap();
        let mut logger = MetricLogger::new(LogLevel::Quiet).with_output_dir(tmp.path()).unwrap();
        logger.log("loss", 1.0, LogOptions::step_and_epoch(1)).unwrap();
        logger.end_epoch(Stage::Train).unwrap();

        let text = std::fs::read_to_string(tmp.path().join("metrics.jsonl")).unwrap();
        let rows: Vec<serde_json::Value> = text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "loss_step");
        assert_eq!(rows[1]["name"], "loss_epoch");
        assert_eq!(rows[1]["stage"], "train");
    }
}
