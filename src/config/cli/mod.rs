//! CLI argument parsing
//!
//! ```bash
//! afinar train config.yaml
//! afinar train config.yaml --max-steps 500 --output-dir ./runs/exp1
//! afinar test config.yaml --adapter ./runs/exp1/best
//! afinar validate config.yaml --detailed
//! afinar info config.yaml --format json
//! ```

mod core;

pub use core::{
    apply_overrides, parse_args, Cli, Command, InfoArgs, OutputFormat, TestArgs, TrainArgs,
    ValidateArgs,
};
