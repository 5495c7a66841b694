//! Validate command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, validate_paths, FinetuneSpec, ValidateArgs};

/// Format model information as a string
pub fn format_model_info(spec: &FinetuneSpec) -> String {
    let mut lines = vec![format!("  Model: {}", spec.model.display_name())];
    if spec.model.local_path.is_none() {
        lines.push(format!("  Revision: {}", spec.model.revision));
    }
    let q = &spec.quantization;
    if q.load_in_4bit {
        lines.push(format!(
            "  Quantization: {} (blocksize {}, double quant {}, compute {:?})",
            q.quant_type, q.blocksize, q.double_quant, q.compute_dtype
        ));
    } else {
        lines.push("  Quantization: none".to_string());
    }
    lines.join("\n")
}

/// Format LoRA configuration as a string
pub fn format_lora_info(spec: &FinetuneSpec) -> String {
    let lora = &spec.lora;
    let targets: Vec<&str> = lora.target_modules.iter().map(String::as_str).collect();
    format!(
        "  LoRA:\n    Rank: {}\n    Alpha: {}\n    Dropout: {}\n    Targets: {}",
        lora.rank,
        lora.alpha,
        lora.dropout,
        targets.join(", ")
    )
}

/// Format data configuration as a string
pub fn format_data_info(spec: &FinetuneSpec) -> String {
    let data = &spec.data;
    let mut lines = vec![format!("  Training data: {}", data.train.display())];
    if let Some(val) = &data.val {
        lines.push(format!("  Validation data: {}", val.display()));
    }
    if let Some(test) = &data.test {
        lines.push(format!("  Test data: {}", test.display()));
    }
    lines.push(format!("  Batch size: {}", data.batch_size));
    lines.push(format!("  Max input length: {}", data.max_input_length));
    lines.push(format!("  Max generated tokens: {}", data.max_gen_length));
    lines.join("\n")
}

/// Format optimizer and loop settings as a string
pub fn format_training_info(spec: &FinetuneSpec) -> String {
    let t = &spec.training;
    let mut lines = vec![
        format!("  Learning rate: {}", t.lr),
        format!("  Weight decay: {}", t.weight_decay),
        format!("  Scheduler: {}", t.lr_scheduler.as_deref().unwrap_or("constant")),
    ];
    if let Some(epochs) = t.trainer.max_epochs {
        lines.push(format!("  Max epochs: {epochs}"));
    }
    if let Some(steps) = t.trainer.max_steps {
        lines.push(format!("  Max steps: {steps}"));
    }
    if t.trainer.accumulate_grad_batches > 1 {
        lines.push(format!("  Gradient accumulation: {}", t.trainer.accumulate_grad_batches));
    }
    if let Some(clip) = t.trainer.gradient_clip_val {
        lines.push(format!("  Gradient clipping: {clip}"));
    }
    lines.push(format!("  Output dir: {}", t.output_dir.display()));
    lines.join("\n")
}

/// Print detailed configuration summary
pub fn print_detailed_summary(spec: &FinetuneSpec) {
    println!();
    println!("Configuration Summary:");
    println!("{}", format_model_info(spec));
    println!();
    println!("{}", format_lora_info(spec));
    println!();
    println!("{}", format_data_info(spec));
    println!();
    println!("{}", format_training_info(spec));
}

pub fn run_validate(args: ValidateArgs, level: LogLevel) -> Result<(), String> {
    log(level, LogLevel::Normal, &format!("Validating config: {}", args.config.display()));

    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;
    validate_paths(&spec).map_err(|e| format!("Validation failed: {e}"))?;

    log(level, LogLevel::Normal, "Configuration is valid");

    if args.detailed && level != LogLevel::Quiet {
        print_detailed_summary(&spec);
    }

    Ok(())
}
