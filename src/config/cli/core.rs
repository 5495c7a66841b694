//! Core CLI types - Cli, Command, and argument structs

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::FinetuneSpec;

/// Afinar: QLoRA fine-tuning for numeric-answer tasks
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "afinar")]
#[command(version)]
#[command(about = "QLoRA fine-tuning of Llama models on (input, <answer>) pairs, scored by MAE")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Fine-tune adapters from a YAML configuration
    Train(TrainArgs),

    /// Score saved adapters on the test set
    Test(TestArgs),

    /// Validate a configuration file without training
    Validate(ValidateArgs),

    /// Display information about a configuration
    Info(InfoArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override the optimizer-step limit
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Override the epoch limit
    #[arg(short = 'e', long)]
    pub max_epochs: Option<usize>,

    /// Override batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Override learning rate
    #[arg(short, long)]
    pub lr: Option<f32>,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Dry run (validate config but don't train)
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the test command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TestArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Directory holding `adapter_config.json` and `adapter_model.safetensors`
    #[arg(short, long)]
    pub adapter: PathBuf,

    /// Override the test JSONL
    #[arg(long)]
    pub data: Option<PathBuf>,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Show detailed validation report
    #[arg(short, long)]
    pub detailed: bool,
}

/// Output format for the info command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML configuration file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a FinetuneSpec
pub fn apply_overrides(spec: &mut FinetuneSpec, args: &TrainArgs) {
    if let Some(output_dir) = &args.output_dir {
        spec.training.output_dir = output_dir.clone();
    }
    if let Some(max_steps) = args.max_steps {
        spec.training.trainer.max_steps = Some(max_steps);
    }
    if let Some(max_epochs) = args.max_epochs {
        spec.training.trainer.max_epochs = Some(max_epochs);
    }
    if let Some(batch_size) = args.batch_size {
        spec.data.batch_size = batch_size;
    }
    if let Some(lr) = args.lr {
        spec.training.lr = lr;
    }
    if let Some(seed) = args.seed {
        spec.training.trainer.seed = seed;
    }
}
