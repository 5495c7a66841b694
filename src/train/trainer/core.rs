//! The fit, validate and test loops

use super::config::TrainerConfig;
use super::result::TrainResult;
use crate::autograd::backward;
use crate::cli::logging::{log, LogLevel};
use crate::error::{Error, Result};
use crate::optim::clip_grad_norm;
use crate::train::callback::{CallbackAction, CallbackContext, CallbackManager, TrainerCallback};
use crate::train::data::DataLoader;
use crate::train::logger::{MetricLogger, Stage};
use crate::train::module::{Optimizers, StepContext, TrainingModule};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::time::Instant;

/// High-level trainer that orchestrates the training loop
///
/// The module computes losses and logs values; the trainer owns backward,
/// gradient accumulation and clipping, optimizer steps, validation
/// scheduling and callbacks.
pub struct Trainer {
    config: TrainerConfig,
    logger: MetricLogger,
    callbacks: CallbackManager,
    global_step: usize,
    current_epoch: usize,
    max_steps: usize,
    rng: StdRng,
    start_time: Option<Instant>,
}

impl Trainer {
    pub fn new(config: TrainerConfig, logger: MetricLogger) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            logger,
            callbacks: CallbackManager::new(),
            global_step: 0,
            current_epoch: 0,
            max_steps: 0,
            start_time: None,
        })
    }

    /// Add a callback to the trainer
    pub fn add_callback<C: TrainerCallback + 'static>(&mut self, callback: C) {
        self.callbacks.add(callback);
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn logger(&self) -> &MetricLogger {
        &self.logger
    }

    pub fn logger_mut(&mut self) -> &mut MetricLogger {
        &mut self.logger
    }

    pub fn global_step(&self) -> usize {
        self.global_step
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    fn level(&self) -> LogLevel {
        self.logger.level()
    }

    fn context(&self) -> CallbackContext {
        CallbackContext {
            epoch: self.current_epoch,
            global_step: self.global_step,
            max_steps: self.max_steps,
            metrics: self.logger.callback_metrics().clone(),
            elapsed_secs: self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64()),
        }
    }

    /// Train until `max_steps` or `max_epochs`, validating on `val` when given
    ///
    /// A non-finite training loss aborts with [`Error::NonFiniteLoss`].
    pub fn fit(
        &mut self,
        module: &mut dyn TrainingModule,
        train: &DataLoader,
        val: Option<&DataLoader>,
    ) -> Result<TrainResult> {
        let num_batches = train.num_batches();
        if num_batches == 0 {
            return Err(Error::ConfigError("training dataset is empty".into()));
        }
        self.start_time = Some(Instant::now());
        self.max_steps = self.config.total_steps(num_batches);
        let mut optimizers = module.configure_optimizers(self.max_steps)?;

        log(
            self.level(),
            LogLevel::Normal,
            &format!(
                "Training for {} optimizer steps ({num_batches} batches per epoch, accumulation {})",
                self.max_steps, self.config.accumulate_grad_batches
            ),
        );

        let ctx = self.context();
        let mut stopped_early = self.callbacks.on_train_begin(&ctx) == CallbackAction::Stop;
        let mut final_loss = None;
        let mut epochs = 0;

        while !stopped_early
            && self.global_step < self.max_steps
            && self.config.max_epochs.is_none_or(|max| self.current_epoch < max)
        {
            epochs += 1;
            let (loss, stop) = self.train_epoch(module, &mut optimizers, train, val)?;
            final_loss = loss.or(final_loss);
            stopped_early = stop;

            self.logger.set_position(Stage::Train, self.current_epoch, self.global_step);
            self.logger.end_epoch(Stage::Train)?;
            let ctx = self.context();
            if self.callbacks.on_train_epoch_end(&ctx) == CallbackAction::Stop {
                stopped_early = true;
            }

            let epoch_val = self.config.val_check_interval.is_none()
                && (self.current_epoch + 1) % self.config.check_val_every_n_epoch == 0;
            if let (false, true, Some(val)) = (stopped_early, epoch_val, val) {
                stopped_early = self.validate_and_notify(module, val)? == CallbackAction::Stop;
            }
            self.current_epoch += 1;
        }
        // Report the epoch that ran last
        self.current_epoch = self.current_epoch.saturating_sub(1);

        let ctx = self.context();
        self.callbacks.on_train_end(&ctx, &*module)?;
        self.logger.flush()?;

        Ok(TrainResult {
            epochs,
            global_step: self.global_step,
            final_loss,
            stopped_early,
            metrics: self.logger.callback_metrics().clone(),
            elapsed_secs: self.start_time.map_or(0.0, |t| t.elapsed().as_secs_f64()),
        })
    }

    /// One pass over the training batches; returns the last loss and whether to stop
    fn train_epoch(
        &mut self,
        module: &mut dyn TrainingModule,
        optimizers: &mut Optimizers,
        train: &DataLoader,
        val: Option<&DataLoader>,
    ) -> Result<(Option<f32>, bool)> {
        let accumulate = self.config.accumulate_grad_batches;
        let batches = train.batches(Some(&mut self.rng));
        let num_batches = batches.len();
        let mut last_loss = None;

        for (batch_idx, batch) in batches.iter().enumerate() {
            self.logger.set_position(Stage::Train, self.current_epoch, self.global_step);
            let mut ctx = StepContext::new(
                self.global_step,
                self.current_epoch,
                self.max_steps,
                optimizers,
                &mut self.logger,
            );
            let mut loss = module.training_step(batch, batch_idx, &mut ctx)?;

            let value = loss.as_slice().first().copied().unwrap_or(f32::NAN);
            if !value.is_finite() {
                return Err(Error::NonFiniteLoss { step: self.global_step, value });
            }
            last_loss = Some(value);
            backward(&mut loss, Some(Array1::from_elem(1, 1.0 / accumulate as f32)));
            drop(loss);

            let boundary = (batch_idx + 1) % accumulate == 0 || batch_idx + 1 == num_batches;
            if !boundary {
                continue;
            }
            let mut params = module.trainable_parameters_mut();
            if let Some(max_norm) = self.config.gradient_clip_val {
                clip_grad_norm(&mut params, max_norm);
            }
            optimizers.optimizer.step(&mut params);
            optimizers.optimizer.zero_grad(&mut params);
            self.global_step += 1;

            if self.global_step % self.config.log_every_n_steps.max(1) == 0 {
                self.logger.set_position(Stage::Train, self.current_epoch, self.global_step);
                self.logger.print_progress();
            }

            if let (Some(every), Some(val)) = (self.config.val_check_interval, val) {
                if self.global_step % every == 0
                    && self.validate_and_notify(module, val)? == CallbackAction::Stop
                {
                    return Ok((last_loss, true));
                }
            }
            if self.global_step >= self.max_steps {
                break;
            }
        }
        Ok((last_loss, false))
    }

    fn validate_and_notify(
        &mut self,
        module: &mut dyn TrainingModule,
        val: &DataLoader,
    ) -> Result<CallbackAction> {
        let metrics = self.run_validation(module, val)?;
        let summary: Vec<String> = metrics.iter().map(|(k, v)| format!("{k}={v:.4}")).collect();
        log(
            self.level(),
            LogLevel::Normal,
            &format!("Validation epoch {} step {}: {}", self.current_epoch, self.global_step, summary.join(" ")),
        );
        let ctx = self.context();
        self.callbacks.on_validation_end(&ctx, &*module)
    }

    fn run_validation(
        &mut self,
        module: &mut dyn TrainingModule,
        val: &DataLoader,
    ) -> Result<BTreeMap<String, f64>> {
        self.logger.set_position(Stage::Val, self.current_epoch, self.global_step);
        module.on_validation_epoch_start();
        let limit = self.config.limit_val_batches.unwrap_or(usize::MAX);
        for (batch_idx, batch) in val.batches(None).iter().take(limit).enumerate() {
            module.validation_step(batch, batch_idx, &mut self.logger)?;
        }
        module.on_validation_epoch_end(&mut self.logger)?;
        let metrics = self.logger.end_epoch(Stage::Val)?;
        self.logger.set_position(Stage::Train, self.current_epoch, self.global_step);
        Ok(metrics)
    }

    /// Run the validation loop once, without callbacks
    pub fn validate(
        &mut self,
        module: &mut dyn TrainingModule,
        val: &DataLoader,
    ) -> Result<BTreeMap<String, f64>> {
        self.run_validation(module, val)
    }

    /// Run the test loop once
    pub fn test(
        &mut self,
        module: &mut dyn TrainingModule,
        test: &DataLoader,
    ) -> Result<BTreeMap<String, f64>> {
        self.logger.set_position(Stage::Test, self.current_epoch, self.global_step);
        module.on_test_epoch_start();
        for (batch_idx, batch) in test.batches(None).iter().enumerate() {
            module.test_step(batch, batch_idx, &mut self.logger)?;
        }
        module.on_test_epoch_end(&mut self.logger)?;
        let metrics = self.logger.end_epoch(Stage::Test)?;
        self.logger.flush()?;
        Ok(metrics)
    }
}
