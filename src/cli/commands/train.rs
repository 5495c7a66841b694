//! Train command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{apply_overrides, load_config, validate_config, validate_paths, TrainArgs};
use crate::finetune::run_finetune;

pub fn run_train(args: TrainArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Afinar: Training from {}", args.config.display()));

    let mut spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| format!("Invalid overrides: {e}"))?;

    if args.dry_run {
        validate_paths(&spec).map_err(|e| format!("Config error: {e}"))?;
        log(level, LogLevel::Normal, "Dry run - config validated successfully");
        log(level, LogLevel::Verbose, &format!("  Model: {}", spec.model.display_name()));
        log(
            level,
            LogLevel::Verbose,
            &format!(
                "  AdamW: lr={} weight_decay={} scheduler={}",
                spec.training.lr,
                spec.training.weight_decay,
                spec.training.lr_scheduler.as_deref().unwrap_or("constant")
            ),
        );
        log(level, LogLevel::Verbose, &format!("  Batch size: {}", spec.data.batch_size));
        return Ok(());
    }

    let outcome = run_finetune(&spec, level).map_err(|e| format!("Training error: {e}"))?;

    if let Some(best) = &outcome.best_adapter {
        log(level, LogLevel::Normal, &format!("Best adapter: {}", best.display()));
    }
    log(level, LogLevel::Normal, &format!("Last adapter: {}", outcome.last_adapter.display()));
    log(level, LogLevel::Normal, "Training complete!");
    Ok(())
}
