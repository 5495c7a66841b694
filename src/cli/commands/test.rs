//! Test command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, TestArgs};
use crate::finetune;

pub fn run_test(args: TestArgs, level: LogLevel) -> Result<(), String> {
    log(
        level,
        LogLevel::Normal,
        &format!("Afinar: Testing adapters from {}", args.adapter.display()),
    );
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    let metrics = finetune::run_test(&spec, &args.adapter, args.data.as_deref(), level)
        .map_err(|e| format!("Test error: {e}"))?;
    if level == LogLevel::Quiet {
        return Ok(());
    }
    if let Some(mae) = metrics.get(finetune::MONITOR) {
        println!("MAE: {mae:.4}");
    }
    Ok(())
}
