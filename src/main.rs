//! Afinar CLI
//!
//! QLoRA fine-tuning entry point for the afinar library.
//!
//! # Usage
//!
//! ```bash
//! # Fine-tune from config
//! afinar train finetune.yaml
//!
//! # Train with overrides
//! afinar train finetune.yaml --max-epochs 3 --lr 0.0002 --output-dir runs/exp1
//!
//! # Score saved adapters on the test set
//! afinar test finetune.yaml --adapter runs/exp1/best
//!
//! # Validate config
//! afinar validate finetune.yaml --detailed
//!
//! # Show config info
//! afinar info finetune.yaml --format yaml
//! ```

use afinar::cli::{run_command, Cli};
use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
