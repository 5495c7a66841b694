//! Info command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{load_config, InfoArgs, OutputFormat};

pub fn run_info(args: InfoArgs, level: LogLevel) -> Result<(), String> {
    let spec = load_config(&args.config).map_err(|e| format!("Config error: {e}"))?;

    match args.format {
        OutputFormat::Text => {
            log(level, LogLevel::Normal, "Configuration Info:");
            println!();
            println!("Model: {}", spec.model.display_name());
            println!(
                "LoRA: r={} alpha={} on {} modules",
                spec.lora.rank,
                spec.lora.alpha,
                spec.lora.target_modules.len()
            );
            println!(
                "Quantization: {}",
                if spec.quantization.load_in_4bit { spec.quantization.quant_type.as_str() } else { "none" }
            );
            println!("Learning rate: {}", spec.training.lr);
            println!("Batch size: {}", spec.data.batch_size);
            let generation = spec.generation_config();
            println!(
                "Generation: {:?}, {} new tokens, {} beams",
                generation.mode(),
                generation.max_new_tokens,
                generation.num_beams
            );
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| format!("JSON serialization error: {e}"))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml = serde_yaml::to_string(&spec)
                .map_err(|e| format!("YAML serialization error: {e}"))?;
            println!("{yaml}");
        }
    }

    Ok(())
}
