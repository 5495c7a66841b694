//! End-to-end runs driven by a [`FinetuneSpec`]

use super::loader::{load_llm, LoadSpec};
use super::module::{FineTuneModule, FineTuneSettings};
use crate::cli::logging::{log, LogLevel};
use crate::config::{validate_paths, FinetuneSpec};
use crate::error::{Error, Result};
use crate::train::{
    DataLoader, EarlyStopping, JsonlDataset, MetricLogger, ModelCheckpoint, MonitorMode,
    TrainResult, Trainer,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metric monitored by checkpointing and early stopping
pub const MONITOR: &str = "metric";

/// Outcome of [`run_finetune`]
#[derive(Debug, Clone)]
pub struct FinetuneOutcome {
    pub train: TrainResult,
    /// Adapter of the best validation epoch, if any validation ran
    pub best_adapter: Option<PathBuf>,
    pub last_adapter: PathBuf,
    /// Test metrics when the spec names a test set
    pub test_metrics: Option<BTreeMap<String, f64>>,
}

fn loader(path: &Path, batch_size: usize, shuffle: bool) -> Result<DataLoader> {
    Ok(DataLoader::new(JsonlDataset::from_file(path)?, batch_size, shuffle))
}

fn check_paths(spec: &FinetuneSpec) -> Result<()> {
    validate_paths(spec).map_err(|e| Error::ConfigError(e.to_string()))
}

/// Fine-tune adapters, checkpoint them and score the test set when configured
pub fn run_finetune(spec: &FinetuneSpec, level: LogLevel) -> Result<FinetuneOutcome> {
    check_paths(spec)?;
    let data = &spec.data;
    let train = loader(&data.train, data.batch_size, data.shuffle)?;
    let val = data.val.as_deref().map(|p| loader(p, data.batch_size, false)).transpose()?;
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Loaded {} training examples{}",
            train.dataset().len(),
            val.as_ref().map_or(String::new(), |v| format!(", {} validation", v.dataset().len()))
        ),
    );

    let output_dir = &spec.training.output_dir;
    std::fs::create_dir_all(output_dir).map_err(|e| Error::io(output_dir, e))?;
    let resolved = output_dir.join("config.yaml");
    std::fs::write(&resolved, serde_yaml::to_string(spec)?).map_err(|e| Error::io(&resolved, e))?;

    let loaded = load_llm(&LoadSpec::from_spec(spec), level)?;
    let mut module = FineTuneModule::new(loaded, FineTuneSettings::from_spec(spec, level));

    let logger = MetricLogger::new(level).with_output_dir(output_dir)?;
    let mut trainer = Trainer::new(spec.training.trainer.clone(), logger)?;
    let checkpoint =
        ModelCheckpoint::new(output_dir).monitor(MONITOR, MonitorMode::Min).with_log_level(level);
    let (best_path, last_path) = (checkpoint.best_path(), checkpoint.last_path());
    trainer.add_callback(checkpoint);
    if let Some(patience) = spec.training.early_stopping_patience {
        trainer.add_callback(
            EarlyStopping::new(MONITOR, MonitorMode::Min, patience).with_log_level(level),
        );
    }

    let result = trainer.fit(&mut module, &train, val.as_ref())?;
    log(
        level,
        LogLevel::Normal,
        &format!(
            "Training finished: {} epochs, {} steps, {:.1}s{}",
            result.epochs,
            result.global_step,
            result.elapsed_secs,
            if result.stopped_early { " (stopped early)" } else { "" }
        ),
    );

    let test_metrics = match &data.test {
        Some(path) => {
            let test = loader(path, data.batch_size, false)?;
            let metrics = trainer.test(&mut module, &test)?;
            log_metrics(level, "Test", &metrics);
            Some(metrics)
        }
        None => None,
    };

    Ok(FinetuneOutcome {
        train: result,
        best_adapter: best_path.exists().then_some(best_path),
        last_adapter: last_path,
        test_metrics,
    })
}

/// Score saved adapters on a test set without training
///
/// `data` overrides `spec.data.test`. Metrics and predictions go to
/// `output_dir/test`.
pub fn run_test(
    spec: &FinetuneSpec,
    adapter_dir: &Path,
    data: Option<&Path>,
    level: LogLevel,
) -> Result<BTreeMap<String, f64>> {
    let path = data
        .or(spec.data.test.as_deref())
        .ok_or_else(|| Error::ConfigError("no test data: set data.test or pass --data".into()))?;
    let test = loader(path, spec.data.batch_size, false)?;

    let mut loaded = load_llm(&LoadSpec::from_spec(spec).without_lora(), level)?;
    let mut rng = StdRng::seed_from_u64(spec.training.trainer.seed);
    let replaced = loaded.model.load_adapter(adapter_dir, &mut rng)?;
    log(
        level,
        LogLevel::Normal,
        &format!("Loaded adapters for {replaced} modules from {}", adapter_dir.display()),
    );

    let mut settings = FineTuneSettings::from_spec(spec, level);
    let test_dir = spec.training.output_dir.join("test");
    settings.output_dir = Some(test_dir.clone());
    let mut module = FineTuneModule::new(loaded, settings);
    let logger = MetricLogger::new(level).with_output_dir(&test_dir)?;
    let mut trainer = Trainer::new(spec.training.trainer.clone(), logger)?;
    let metrics = trainer.test(&mut module, &test)?;
    log_metrics(level, "Test", &metrics);
    Ok(metrics)
}

fn log_metrics(level: LogLevel, stage: &str, metrics: &BTreeMap<String, f64>) {
    for (name, value) in metrics {
        log(level, LogLevel::Normal, &format!("{stage} {name}: {value:.4}"));
    }
}
