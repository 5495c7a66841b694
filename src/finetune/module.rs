//! The fine-tuning [`TrainingModule`]: answer-only causal-LM loss for
//! training, generate-then-score for validation and test

use super::loader::LoadedLlm;
use crate::autograd::{cross_entropy, Context};
use crate::cli::logging::{log, LogLevel};
use crate::config::FinetuneSpec;
use crate::error::{Error, Result};
use crate::eval::{EvalCollector, EvalReport};
use crate::generate::{generate, GenerationConfig, StopTokens};
use crate::optim::{AdamW, LinearWarmupCosineLR};
use crate::tokenizer::HfTokenizer;
use crate::train::{
    build_labels, shift_targets, Batch, LogOptions, MetricLogger, Optimizers, StepContext,
    TrainingModule,
};
use crate::transformer::LlamaForCausalLM;
use crate::Tensor;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

const VAL_PREDICTIONS: &str = "val_predictions.jsonl";
const TEST_PREDICTIONS: &str = "test_predictions.jsonl";

/// Hyperparameters of [`FineTuneModule`]
#[derive(Debug, Clone)]
pub struct FineTuneSettings {
    pub max_input_length: usize,
    pub lr: f32,
    pub weight_decay: f32,
    /// `None` for a constant rate, `"cosine"` for linear warmup then cosine decay
    pub lr_scheduler: Option<String>,
    pub lr_decay_min_lr: f32,
    pub lr_warmup_start_lr: f32,
    pub generation: GenerationConfig,
    /// Recorded as `base_model_name_or_path` in saved adapters
    pub base_model: String,
    /// Where prediction dumps are written
    pub output_dir: Option<PathBuf>,
    pub seed: u64,
    pub level: LogLevel,
}

impl FineTuneSettings {
    pub fn from_spec(spec: &FinetuneSpec, level: LogLevel) -> Self {
        let training = &spec.training;
        Self {
            max_input_length: spec.data.max_input_length,
            lr: training.lr,
            weight_decay: training.weight_decay,
            lr_scheduler: training.lr_scheduler.clone(),
            lr_decay_min_lr: training.lr_decay_min_lr,
            lr_warmup_start_lr: training.lr_warmup_start_lr,
            generation: spec.generation_config(),
            base_model: spec.model.display_name(),
            output_dir: Some(training.output_dir.clone()),
            seed: training.trainer.seed,
            level,
        }
    }
}

/// QLoRA fine-tuning of a causal LM on `(input, <answer>)` pairs
pub struct FineTuneModule {
    model: LlamaForCausalLM,
    tokenizer: HfTokenizer,
    stop: StopTokens,
    settings: FineTuneSettings,
    /// Training-mode context, drives adapter dropout
    ctx: Context,
    /// Drives multinomial sampling
    gen_rng: StdRng,
    val: EvalCollector,
    test: EvalCollector,
    last_report: Option<EvalReport>,
}

impl FineTuneModule {
    pub fn new(loaded: LoadedLlm, settings: FineTuneSettings) -> Self {
        Self {
            ctx: Context::new(settings.seed),
            gen_rng: StdRng::seed_from_u64(settings.seed.wrapping_add(1)),
            model: loaded.model,
            tokenizer: loaded.tokenizer,
            stop: loaded.stop,
            settings,
            val: EvalCollector::new(),
            test: EvalCollector::new(),
            last_report: None,
        }
    }

    pub fn model(&self) -> &LlamaForCausalLM {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut LlamaForCausalLM {
        &mut self.model
    }

    pub fn tokenizer(&self) -> &HfTokenizer {
        &self.tokenizer
    }

    pub fn settings(&self) -> &FineTuneSettings {
        &self.settings
    }

    /// Report of the most recent validation or test epoch
    pub fn last_report(&self) -> Option<&EvalReport> {
        self.last_report.as_ref()
    }

    /// Mean next-token cross-entropy over the answer tokens of a batch
    ///
    /// A batch without answer tokens yields a NaN loss.
    pub fn forward(&mut self, batch: &Batch) -> Result<Tensor> {
        let encoded = self.tokenizer.encode_pairs(&batch.pairs(), self.settings.max_input_length)?;
        let labels = build_labels(&encoded, self.tokenizer.pad_id());
        let shifted = shift_targets(&labels, encoded.batch, encoded.seq);
        if shifted.is_empty() {
            return Ok(Tensor::from_vec(vec![f32::NAN], false));
        }

        let hidden = self.model.forward_hidden(
            &encoded.input_ids,
            &encoded.attention_mask,
            encoded.batch,
            encoded.seq,
            None,
            &mut self.ctx,
        )?;
        let logits = self.model.logits_for_rows(&hidden, &shifted.rows, &mut self.ctx);
        Ok(cross_entropy(&logits, &shifted.targets, self.model.config().vocab_size))
    }

    /// Decode a continuation for every prompt of the batch
    ///
    /// Texts include the prompt. With several return sequences per prompt
    /// the first one is kept.
    pub fn generate(&mut self, batch: &Batch) -> Result<Vec<String>> {
        let prompts = self.tokenizer.encode_prompts(&batch.prompts(), self.settings.max_input_length)?;
        let config = &self.settings.generation;
        let sequences = generate(&self.model, &prompts, config, &self.stop, &mut self.gen_rng)?;
        let texts = self.tokenizer.batch_decode(&sequences)?;
        let per_prompt = texts.len() / batch.size().max(1);
        Ok(texts.into_iter().step_by(per_prompt.max(1)).collect())
    }

    fn collect(&mut self, batch: &Batch, test: bool) -> Result<()> {
        let texts = self.generate(batch)?;
        let collector = if test { &mut self.test } else { &mut self.val };
        for ((input, answer), text) in batch.inputs.iter().zip(&batch.answers).zip(texts) {
            collector.push(input.as_str(), text, answer.as_str());
        }
        Ok(())
    }

    fn finish_eval(&mut self, logger: &mut MetricLogger, test: bool) -> Result<()> {
        let (collector, file) =
            if test { (&self.test, TEST_PREDICTIONS) } else { (&self.val, VAL_PREDICTIONS) };
        let report = collector.compute()?;
        if let Some(dir) = &self.settings.output_dir {
            std::fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
            collector.write_jsonl(dir.join(file))?;
        }
        log(self.settings.level, LogLevel::Verbose, &format!("  {report}"));
        logger.log("metric", report.mae, LogOptions::epoch_prog_bar())?;
        self.last_report = Some(report);
        Ok(())
    }
}

impl TrainingModule for FineTuneModule {
    fn configure_optimizers(&mut self, max_steps: usize) -> Result<Optimizers> {
        let s = &self.settings;
        let optimizer = Box::new(AdamW::with_weight_decay(s.lr, s.weight_decay));
        let optimizers = Optimizers::new(optimizer);
        match s.lr_scheduler.as_deref() {
            None => Ok(optimizers),
            Some("cosine") => {
                let warmup_steps = LinearWarmupCosineLR::warmup_steps_for(max_steps);
                log(s.level, LogLevel::Normal, &format!("max_step: {max_steps}"));
                log(s.level, LogLevel::Normal, &format!("warmup_steps: {warmup_steps}"));
                let scheduler = LinearWarmupCosineLR::new(
                    max_steps,
                    s.lr_decay_min_lr,
                    s.lr,
                    warmup_steps,
                    s.lr_warmup_start_lr,
                );
                Ok(optimizers.with_scheduler(Box::new(scheduler)))
            }
            Some(other) => Err(Error::ConfigError(format!("Invalid lr_scheduler type: {other}"))),
        }
    }

    fn training_step(
        &mut self,
        batch: &Batch,
        _batch_idx: usize,
        ctx: &mut StepContext<'_>,
    ) -> Result<Tensor> {
        let lr = ctx.step_scheduler();
        let loss = self.forward(batch)?;
        let value = loss.as_slice().first().copied().unwrap_or(f32::NAN);

        let options = LogOptions::step_and_epoch(batch.size());
        ctx.log("loss", f64::from(value), options)?;
        ctx.log("lr", f64::from(lr), options)?;
        ctx.log("global_step_num", ctx.global_step as f64, options)?;
        Ok(loss)
    }

    fn on_validation_epoch_start(&mut self) {
        self.val.reset();
    }

    fn validation_step(&mut self, batch: &Batch, _batch_idx: usize, _logger: &mut MetricLogger) -> Result<()> {
        self.collect(batch, false)
    }

    fn on_validation_epoch_end(&mut self, logger: &mut MetricLogger) -> Result<()> {
        self.finish_eval(logger, false)
    }

    fn on_test_epoch_start(&mut self) {
        self.test.reset();
    }

    fn test_step(&mut self, batch: &Batch, _batch_idx: usize, _logger: &mut MetricLogger) -> Result<()> {
        self.collect(batch, true)
    }

    fn on_test_epoch_end(&mut self, logger: &mut MetricLogger) -> Result<()> {
        self.finish_eval(logger, true)
    }

    fn trainable_parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.model.trainable_parameters_mut()
    }

    fn save_checkpoint(&self, dir: &Path) -> Result<()> {
        self.model.save_adapter(dir, Some(&self.settings.base_model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autograd::backward;
    use crate::finetune::testing::{tiny_model_dir, tiny_spec};
    use crate::finetune::{load_llm, LoadSpec};
    use crate::lora::{LoRAConfig, ADAPTER_CONFIG_FILE, ADAPTER_WEIGHTS_FILE};
    use crate::train::Stage;
    use tempfile::TempDir;

    fn module(out: Option<&Path>) -> (TempDir, FineTuneModule) {
        let dir = tiny_model_dir();
        let mut spec = LoadSpec::from_spec(&tiny_spec(dir.path()));
        spec.lora = Some(LoRAConfig::new(2, 4.0).target_all_projections());
        let loaded = load_llm(&spec, LogLevel::Quiet).unwrap();
        let mut settings = FineTuneSettings::from_spec(&tiny_spec(dir.path()), LogLevel::Quiet);
        settings.output_dir = out.map(Path::to_path_buf);
        (dir, FineTuneModule::new(loaded, settings))
    }

    fn batch() -> Batch {
        Batch::new(
            vec!["what is two plus three".into(), "two plus two".into()],
            vec!["<5>".into(), "<4>".into()],
        )
    }

    #[test]
    fn test_forward_loss_reaches_adapters_only() {
        let (_dir, mut module) = module(None);
        let mut loss = module.forward(&batch()).unwrap();
        let value = loss.as_slice()[0];
        assert!(value.is_finite() && value > 0.0, "loss {value}");

        backward(&mut loss, None);
        let params = module.trainable_parameters_mut();
        assert!(!params.is_empty());
        let touched = params
            .iter()
            .filter(|p| p.grad().is_some_and(|g| g.iter().any(|v| *v != 0.0)))
            .count();
        assert!(touched > 0);
    }

    #[test]
    fn test_batch_without_answer_tokens_is_nan() {
        let (_dir, mut module) = module(None);
        let loss = module.forward(&Batch::new(vec!["two plus three".into()], vec![String::new()])).unwrap();
        assert!(loss.as_slice()[0].is_nan());
    }

    #[test]
    fn test_training_step_logs_loss_lr_and_step() {
        let (_dir, mut module) = module(None);
        let mut optimizers = module.configure_optimizers(100).unwrap();
        let mut logger = MetricLogger::new(LogLevel::Quiet);
        let mut ctx = StepContext::new(7, 0, 100, &mut optimizers, &mut logger);
        module.training_step(&batch(), 0, &mut ctx).unwrap();

        assert!(logger.metric("loss_step").is_some_and(f64::is_finite));
        assert_eq!(logger.metric("global_step_num_step"), Some(7.0));
        let lr = logger.metric("lr_step").unwrap();
        assert!((lr - 2e-4).abs() < 1e-9, "lr {lr}");
        let epoch = logger.end_epoch(Stage::Train).unwrap();
        assert!(epoch.contains_key("loss_epoch"));
    }

    #[test]
    fn test_configure_optimizers_schedule() {
        let (_dir, mut module) = module(None);
        let mut optimizers = module.configure_optimizers(100).unwrap();
        assert!(optimizers.scheduler.is_none());

        module.settings.lr_scheduler = Some("cosine".into());
        module.settings.lr_warmup_start_lr = 0.0;
        optimizers = module.configure_optimizers(100).unwrap();
        let scheduler = optimizers.scheduler.as_mut().unwrap();
        assert_eq!(scheduler.step(0, 0, 100), 0.0);

        module.settings.lr_scheduler = Some("step".into());
        assert!(matches!(module.configure_optimizers(100), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_validation_logs_metric_and_writes_predictions() {
        let out = TempDir::new().unwrap();
        let (_dir, mut module) = module(Some(out.path()));
        let mut logger = MetricLogger::new(LogLevel::Quiet);
        logger.set_position(Stage::Val, 0, 0);

        module.on_validation_epoch_start();
        module.validation_step(&batch(), 0, &mut logger).unwrap();
        module.on_validation_epoch_end(&mut logger).unwrap();
        let metrics = logger.end_epoch(Stage::Val).unwrap();

        let report = module.last_report().unwrap();
        assert_eq!(report.count, 2);
        assert!(metrics["metric"].is_finite());
        assert_eq!(metrics["metric"], report.mae);

        let dump = std::fs::read_to_string(out.path().join(VAL_PREDICTIONS)).unwrap();
        assert_eq!(dump.lines().count(), 2);
        assert!(dump.contains("\"label\":\"<5>\""));
    }

    #[test]
    fn test_generated_text_starts_with_prompt() {
        let (_dir, mut module) = module(None);
        let texts = module.generate(&batch()).unwrap();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].starts_with("what is two plus three"), "{}", texts[0]);
    }

    #[test]
    fn test_save_checkpoint_writes_peft_files() {
        let (_dir, module) = module(None);
        let out = TempDir::new().unwrap();
        module.save_checkpoint(&out.path().join("best")).unwrap();
        assert!(out.path().join("best").join(ADAPTER_CONFIG_FILE).exists());
        assert!(out.path().join("best").join(ADAPTER_WEIGHTS_FILE).exists());
    }
}
